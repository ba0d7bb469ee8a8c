//! File registry
//!
//! Maps opaque file ids to paths on disk. Fetched structures and job
//! artifacts are registered here; tools refer to files only by id.

use sdk::errors::EngineError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Errors from the file registry
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileError> for EngineError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound(file_id) => EngineError::FileNotFound(file_id),
            FileError::Io(e) => EngineError::Io(e),
        }
    }
}

/// Metadata for a registered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub display_name: String,
    pub size_bytes: u64,
}

/// Collaborator that owns the id-to-path mapping
pub trait FileRegistry: Send + Sync {
    /// Register an existing file and return its new id
    fn register(&self, path: &Path, display_name: &str) -> Result<String, FileError>;

    fn resolve(&self, file_id: &str) -> Result<PathBuf, FileError>;

    fn info(&self, file_id: &str) -> Result<FileInfo, FileError>;
}

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    display_name: String,
}

/// Process-local registry backed by a map
#[derive(Debug, Default)]
pub struct LocalFileRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl LocalFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, file_id: &str) -> Result<Entry, FileError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(file_id)
            .cloned()
            .ok_or_else(|| FileError::NotFound(file_id.to_string()))
    }
}

impl FileRegistry for LocalFileRegistry {
    fn register(&self, path: &Path, display_name: &str) -> Result<String, FileError> {
        if !path.is_file() {
            return Err(FileError::NotFound(path.display().to_string()));
        }

        let file_id = uuid::Uuid::new_v4().to_string();
        let entry = Entry {
            path: path.to_path_buf(),
            display_name: display_name.to_string(),
        };

        // A poisoned lock only means another registration panicked; the map is still usable
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(file_id.clone(), entry);

        debug!("Registered {} as {}", path.display(), file_id);
        Ok(file_id)
    }

    fn resolve(&self, file_id: &str) -> Result<PathBuf, FileError> {
        let entry = self.entry(file_id)?;
        if !entry.path.exists() {
            return Err(FileError::NotFound(file_id.to_string()));
        }
        Ok(entry.path)
    }

    fn info(&self, file_id: &str) -> Result<FileInfo, FileError> {
        let entry = self.entry(file_id)?;
        let metadata = std::fs::metadata(&entry.path)?;
        Ok(FileInfo {
            display_name: entry.display_name,
            size_bytes: metadata.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_resolve_info() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("1ABC.pdb");
        std::fs::write(&path, "ATOM\n").unwrap();

        let registry = LocalFileRegistry::new();
        let id = registry.register(&path, "1ABC.pdb").unwrap();

        assert_eq!(registry.resolve(&id).unwrap(), path);
        let info = registry.info(&id).unwrap();
        assert_eq!(info.display_name, "1ABC.pdb");
        assert_eq!(info.size_bytes, 5);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = LocalFileRegistry::new();
        assert!(matches!(
            registry.resolve("missing"),
            Err(FileError::NotFound(_))
        ));
        assert!(matches!(registry.info("missing"), Err(FileError::NotFound(_))));

        let err: EngineError = FileError::NotFound("missing".to_string()).into();
        assert!(matches!(err, EngineError::FileNotFound(_)));
    }

    #[test]
    fn test_register_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let registry = LocalFileRegistry::new();
        assert!(registry
            .register(&temp.path().join("nope.pdb"), "nope.pdb")
            .is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.pdb");
        std::fs::write(&path, "x").unwrap();

        let registry = LocalFileRegistry::new();
        let a = registry.register(&path, "a.pdb").unwrap();
        let b = registry.register(&path, "a.pdb").unwrap();
        assert_ne!(a, b);
    }
}
