//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The transport can also be built over any pair of async streams, which is
//! how in-process sessions and tests drive the server.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// One newline-terminated frame read from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 line with its terminator stripped.
    Line(String),
    /// A line that is not valid UTF-8.
    Malformed,
}

/// A line-delimited MCP transport.
///
/// Reads JSON-RPC messages from its input and writes responses to its output.
pub struct StdioTransport {
    /// Buffered reader for incoming messages.
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    /// Sink for outgoing messages.
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::custom(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Creates a transport over arbitrary streams.
    pub fn custom(
        input: impl AsyncRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: BufReader::new(Box::new(input)),
            writer: Box::new(output),
        }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` if the input is closed (EOF). A line that is not valid
    /// UTF-8 is consumed and reported as [`Frame::Malformed`].
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Frame>> {
        let mut buf = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut buf).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        Ok(Some(
            String::from_utf8(buf).map_or(Frame::Malformed, Frame::Line),
        ))
    }

    /// Writes any serialisable message, terminated by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &impl Serialize) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    /// Writes a raw JSON string with newline termination.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse, RequestId};

    #[test]
    fn serialise_response_no_newlines() {
        let response = JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({
                "message": "line one\nline two",
                "nested": {"key": "value"}
            }),
        );

        let json = serde_json::to_string(&response).unwrap();
        assert!(
            !json.contains('\n'),
            "Serialised JSON should not contain newlines"
        );
    }

    #[tokio::test]
    async fn reads_lines_and_strips_terminators() {
        let input = tokio_test::io::Builder::new()
            .read(b"{\"a\":1}\r\n{\"b\":2}\n")
            .build();
        let mut transport = StdioTransport::custom(input, tokio::io::sink());

        assert_eq!(
            transport.read_line().await.unwrap(),
            Some(Frame::Line("{\"a\":1}".to_string()))
        );
        assert_eq!(
            transport.read_line().await.unwrap(),
            Some(Frame::Line("{\"b\":2}".to_string()))
        );
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_malformed_not_fatal() {
        let input = tokio_test::io::Builder::new()
            .read(b"{\"x\":\"\xff\xfe\"}\n{\"ok\":true}\n")
            .build();
        let mut transport = StdioTransport::custom(input, tokio::io::sink());

        assert_eq!(transport.read_line().await.unwrap(), Some(Frame::Malformed));
        assert_eq!(
            transport.read_line().await.unwrap(),
            Some(Frame::Line("{\"ok\":true}".to_string()))
        );
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writes_one_line_per_message() {
        let output = tokio_test::io::Builder::new()
            .write(br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)
            .write(b"\n")
            .build();
        let mut transport = StdioTransport::custom(tokio::io::empty(), output);

        transport
            .write_message(&JsonRpcError::parse_error())
            .await
            .unwrap();
    }
}
