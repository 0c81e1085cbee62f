//! Plain-text document store.
//!
//! A flat directory of text files. Every operation names a document by a
//! bare file name; names that would escape the directory are rejected.
//! Operations on the same document are serialised through a per-name lock,
//! so concurrent appends never interleave.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;

use crate::error::StoreError;

/// Extension of the documents that [`DocumentStore::list`] reports.
pub const DOCUMENT_EXTENSION: &str = "txt";

/// Whether keyword search distinguishes letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    /// `Hello` does not match `hello`.
    Sensitive,
    /// `Hello` matches `hello`.
    Insensitive,
}

impl CaseSensitivity {
    /// Maps a `case_sensitive` flag to a setting.
    #[must_use]
    pub const fn from_flag(case_sensitive: bool) -> Self {
        if case_sensitive {
            Self::Sensitive
        } else {
            Self::Insensitive
        }
    }

    fn matches(self, line: &str, keyword: &str) -> bool {
        match self {
            Self::Sensitive => line.contains(keyword),
            Self::Insensitive => line.to_lowercase().contains(&keyword.to_lowercase()),
        }
    }
}

/// A directory of text documents.
#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    case_sensitivity: CaseSensitivity,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(
        root: impl Into<PathBuf>,
        case_sensitivity: CaseSensitivity,
    ) -> Result<Self, StoreError> {
        let root = root.into();

        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            filename: root.display().to_string(),
            source,
        })?;

        tracing::debug!(root = %root.display(), ?case_sensitivity, "Document store opened");

        Ok(Self {
            root,
            case_sensitivity,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The directory holding the documents.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Case sensitivity used when a search does not specify one.
    #[must_use]
    pub const fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    /// Lists the `.txt` documents, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let io_error = |source| StoreError::Io {
            filename: self.root.display().to_string(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let path = entry.path();

            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION)
            {
                continue;
            }

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Reads a whole document.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`] for names outside the store
    /// - [`StoreError::NotFound`] if the document does not exist
    /// - [`StoreError::Io`] on any other read failure
    pub fn read(&self, filename: &str) -> Result<String, StoreError> {
        let path = self.resolve(filename)?;

        self.locked(filename, || {
            fs::read_to_string(&path).map_err(|source| Self::classify(filename, source))
        })
    }

    /// Appends `content` to a document, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`] for names outside the store
    /// - [`StoreError::Io`] if the file cannot be opened or written
    pub fn append(&self, filename: &str, content: &str) -> Result<(), StoreError> {
        let path = self.resolve(filename)?;

        let io_error = |source| StoreError::Io {
            filename: filename.to_string(),
            source,
        };

        self.locked(filename, || {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(io_error)?;
            file.write_all(content.as_bytes()).map_err(io_error)?;
            file.flush().map_err(io_error)
        })?;

        tracing::debug!(filename, bytes = content.len(), "Appended to document");
        Ok(())
    }

    /// Finds the lines of a document that contain `keyword`.
    ///
    /// Each match is rendered as `"<line number>: <trimmed line>"`, with line
    /// numbers starting at 1. An empty result means no line matched.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::read`].
    pub fn search(
        &self,
        filename: &str,
        keyword: &str,
        case_sensitivity: CaseSensitivity,
    ) -> Result<Vec<String>, StoreError> {
        let content = self.read(filename)?;

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| case_sensitivity.matches(line, keyword))
            .map(|(index, line)| format!("{}: {}", index + 1, line.trim()))
            .collect())
    }

    /// Maps a document name to its path, rejecting anything that is not a
    /// single plain file name.
    fn resolve(&self, filename: &str) -> Result<PathBuf, StoreError> {
        let invalid = || StoreError::InvalidName {
            filename: filename.to_string(),
        };

        if filename.is_empty() || filename.contains(['/', '\\']) {
            return Err(invalid());
        }

        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(filename)),
            _ => Err(invalid()),
        }
    }

    /// Runs `op` while holding the lock for `filename`. The lock's entry is
    /// dropped again once no other caller holds or waits for it.
    fn locked<T>(&self, filename: &str, op: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(filename.to_string()).or_default())
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(filename);
        }
        result
    }

    fn classify(filename: &str, source: io::Error) -> StoreError {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound {
                filename: filename.to_string(),
            }
        } else {
            StoreError::Io {
                filename: filename.to_string(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = DocumentStore::open(dir.path(), CaseSensitivity::Sensitive).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("documents");

        let store = DocumentStore::open(&root, CaseSensitivity::Sensitive).unwrap();
        assert!(store.root().is_dir());
    }

    #[test]
    fn list_only_reports_text_documents() {
        let (dir, store) = store();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("image.png"), "").unwrap();
        fs::create_dir(dir.path().join("folder.txt")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn append_then_read() {
        let (_dir, store) = store();
        store.append("notes.txt", "first\n").unwrap();
        store.append("notes.txt", "second\n").unwrap();

        assert_eq!(store.read("notes.txt").unwrap(), "first\nsecond\n");
    }

    #[test]
    fn read_missing_document() {
        let (_dir, store) = store();
        let err = store.read("missing.txt").unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(err.to_string(), "Error: missing.txt not found.");
    }

    #[test]
    fn reject_names_outside_the_store() {
        let (_dir, store) = store();

        for name in ["", "..", ".", "../secret.txt", "sub/notes.txt", "a\\b.txt", "/etc/passwd"] {
            let err = store.append(name, "x").unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidName { .. }),
                "expected {name:?} to be rejected"
            );
        }
    }

    #[test]
    fn search_reports_numbered_trimmed_lines() {
        let (_dir, store) = store();
        store
            .append("notes.txt", "Hello world\n  other line\n   Hello again  \n")
            .unwrap();

        let matches = store
            .search("notes.txt", "Hello", CaseSensitivity::Sensitive)
            .unwrap();
        assert_eq!(matches, vec!["1: Hello world", "3: Hello again"]);
    }

    #[test]
    fn search_case_sensitivity() {
        let (_dir, store) = store();
        store.append("notes.txt", "Hello\nhello\nHELLO\n").unwrap();

        let sensitive = store
            .search("notes.txt", "hello", CaseSensitivity::Sensitive)
            .unwrap();
        assert_eq!(sensitive, vec!["2: hello"]);

        let insensitive = store
            .search("notes.txt", "hello", CaseSensitivity::Insensitive)
            .unwrap();
        assert_eq!(insensitive.len(), 3);
    }

    #[test]
    fn search_without_matches_is_empty() {
        let (_dir, store) = store();
        store.append("notes.txt", "abc\n").unwrap();

        let matches = store
            .search("notes.txt", "zzz", CaseSensitivity::Sensitive)
            .unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let (_dir, store) = store();
        let a = "A".repeat(64 * 1024);
        let b = "B".repeat(64 * 1024);

        std::thread::scope(|scope| {
            scope.spawn(|| store.append("shared.txt", &a).unwrap());
            scope.spawn(|| store.append("shared.txt", &b).unwrap());
        });

        let content = store.read("shared.txt").unwrap();
        let ab = format!("{a}{b}");
        let ba = format!("{b}{a}");
        assert!(content == ab || content == ba);
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn file_locks_are_released_after_use() {
        let (_dir, store) = store();
        store.append("notes.txt", "line
").unwrap();
        store.read("notes.txt").unwrap();
        store.search("notes.txt", "line", CaseSensitivity::Sensitive).unwrap();
        for i in 0..100 {
            let _ = store.search(&format!("missing-{i}.txt"), "x", CaseSensitivity::Sensitive);
        }

        assert!(store.locks.lock().unwrap().is_empty());
    }
}
