use std::path::{Path, PathBuf};

/// Where the engine keeps its local database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// A redb file. Missing parent directories are created on open.
    File(PathBuf),
    /// Nothing touches the disk; everything is lost on drop.
    InMemory,
}

impl StorageConfig {
    /// Database file, if the storage is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageConfig::File(path) => Some(path),
            StorageConfig::InMemory => None,
        }
    }

    /// Whether watermarks and pending IDs survive a restart.
    pub fn is_persistent(&self) -> bool {
        self.path().is_some()
    }
}
