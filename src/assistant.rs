//! The DocAssistant capability set.
//!
//! Tools, resources and prompts for appending to and searching plain-text
//! documents, all backed by one [`DocumentStore`].

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{HandlerError, RegistryError, StoreError};
use crate::mcp::types::{Arguments, PromptArgument, PromptMessage};
use crate::mcp::{CapabilityRegistry, Prompt, Resource, Tool};
use crate::store::{CaseSensitivity, DocumentStore};

/// Builds a registry holding the DocAssistant capabilities.
///
/// # Errors
///
/// Returns an error if two capabilities collide, which indicates a bug in
/// this function.
pub fn doc_assistant_registry(store: Arc<DocumentStore>) -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();

    registry.register_tool(append_tool(Arc::clone(&store)))?;
    registry.register_tool(search_tool(Arc::clone(&store)))?;
    registry.register_resource(list_resource(Arc::clone(&store)))?;
    registry.register_resource(document_resource(store))?;
    registry.register_prompt(append_prompt())?;
    registry.register_prompt(search_prompt())?;

    Ok(registry)
}

fn append_tool(store: Arc<DocumentStore>) -> Tool {
    let schema = json!({
        "type": "object",
        "properties": {
            "filename": {
                "type": "string",
                "description": "Document to append to, e.g. notes.txt"
            },
            "content": {
                "type": "string",
                "description": "Text to append verbatim"
            }
        },
        "required": ["filename", "content"]
    });

    Tool::new("append_to_doc", schema, move |args| {
        let filename = string_arg(args, "filename")?;
        let content = string_arg(args, "content")?;

        store.append(filename, content)?;

        Ok(Value::String(format!("✅ Appended to {filename}.")))
    })
    .with_description("Append text to a document, creating it if needed.")
}

fn search_tool(store: Arc<DocumentStore>) -> Tool {
    let schema = json!({
        "type": "object",
        "properties": {
            "filename": {
                "type": "string",
                "description": "Document to search"
            },
            "keyword": {
                "type": "string",
                "description": "Text to look for"
            },
            "case_sensitive": {
                "type": "boolean",
                "description": "Override the server's default case sensitivity"
            }
        },
        "required": ["filename", "keyword"]
    });

    Tool::new("search_in_doc", schema, move |args| {
        let filename = string_arg(args, "filename")?;
        let keyword = string_arg(args, "keyword")?;
        let case_sensitivity = args
            .get("case_sensitive")
            .and_then(Value::as_bool)
            .map_or(store.case_sensitivity(), CaseSensitivity::from_flag);

        let lines = match store.search(filename, keyword, case_sensitivity) {
            Ok(matches) if matches.is_empty() => {
                vec![format!("No occurrences of '{keyword}' found.")]
            }
            Ok(matches) => matches,
            // A missing document is an answer, not a failure.
            Err(error @ StoreError::NotFound { .. }) => vec![error.to_string()],
            Err(error) => return Err(error.into()),
        };

        Ok(json!(lines))
    })
    .with_description("Find the lines of a document containing a keyword.")
}

fn list_resource(store: Arc<DocumentStore>) -> Resource {
    Resource::new("docs://list", "list_docs", move |_| Ok(json!(store.list()?)))
        .with_description("Names of the available .txt documents.")
        .with_mime_type("application/json")
}

fn document_resource(store: Arc<DocumentStore>) -> Resource {
    Resource::new("docs://{filename}", "get_doc", move |params| {
        let filename = string_arg(params, "filename")?;
        Ok(Value::String(store.read(filename)?))
    })
    .with_description("Full text of one document.")
    .with_mime_type("text/plain")
}

fn append_prompt() -> Prompt {
    Prompt::new("append_prompt", |args| {
        let filename = string_arg(args, "filename")?;
        let content = string_arg(args, "content")?;

        Ok(PromptMessage::user(format!(
            "Please add the following to `{filename}`:\n\n{content}\n\nUse the append_to_doc tool."
        )))
    })
    .with_description("Ask for text to be appended to a document.")
    .with_argument(PromptArgument::required("filename", "Document to append to"))
    .with_argument(PromptArgument::required("content", "Text to append"))
}

fn search_prompt() -> Prompt {
    Prompt::new("search_prompt", |args| {
        let filename = string_arg(args, "filename")?;
        let keyword = string_arg(args, "keyword")?;

        Ok(PromptMessage::user(format!(
            "I'm looking for occurrences of '{keyword}' in `{filename}`.\nUse the search_in_doc tool."
        )))
    })
    .with_description("Ask for a keyword search in a document.")
    .with_argument(PromptArgument::required("filename", "Document to search"))
    .with_argument(PromptArgument::required("keyword", "Text to look for"))
}

fn string_arg<'a>(args: &'a Arguments, name: &str) -> Result<&'a str, HandlerError> {
    match args.get(name) {
        None | Some(Value::Null) => Err(HandlerError::MissingArgument(name.to_string())),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(HandlerError::InvalidArgument {
            name: name.to_string(),
            message: "expected a string".to_string(),
        }),
    }
}
