//! Local media files attached to outgoing messages.

use std::io;
use std::path::{Path, PathBuf};
use tessera_proto::storage::Message;

/// Controls file uploads that belong to pending messages.
pub trait UploadController: Send + Sync {
    fn start_upload(&self, file_id: i64, path: &Path);
    fn cancel_upload(&self, file_id: i64);
}

/// Upload controller for embeddings that upload elsewhere.
#[derive(Debug, Default)]
pub struct NoopUploads;

impl UploadController for NoopUploads {
    fn start_upload(&self, file_id: i64, path: &Path) {
        tracing::debug!(file_id, path = %path.display(), "Upload requested");
    }

    fn cancel_upload(&self, file_id: i64) {
        tracing::debug!(file_id, "Upload cancelled");
    }
}

/// Directory of delivered media, one file per confirmed message.
#[derive(Debug, Clone)]
pub struct MediaCache {
    dir: PathBuf,
}

impl MediaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<team>_<peer>_<type>/<message id>`
    pub fn path_for(&self, message: &Message) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}", message.team_id, message.peer_id, message.peer_type))
            .join(message.id.to_string())
    }

    /// Move `source` into the cache slot for `message`, copying when a rename
    /// is not possible (e.g. across filesystems).
    pub fn adopt(&self, source: &Path, message: &Message) -> io::Result<PathBuf> {
        let target = self.path_for(message);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = std::fs::rename(source, &target) {
            tracing::warn!(error = %e, source = %source.display(), "Move failed, copying");
            std::fs::copy(source, &target)?;
        }
        Ok(target)
    }
}
