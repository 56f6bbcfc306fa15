//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DIFFERENCE_BATCH_LIMIT: i32 = 250;
pub const DEFAULT_UPDATE_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-request network timeout.
    pub request_timeout: Duration,
    /// Maximum updates requested per difference round.
    pub difference_batch_limit: i32,
    /// Where delivered media files are moved to.
    pub media_dir: PathBuf,
    /// The local user; new messages from this sender are matched against the outbox.
    pub self_user_id: i64,
    pub team_id: i64,
    /// Capacity of the client update broadcast channel.
    pub update_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            difference_batch_limit: DEFAULT_DIFFERENCE_BATCH_LIMIT,
            media_dir: std::env::temp_dir().join("tessera-media"),
            self_user_id: 0,
            team_id: 0,
            update_buffer: DEFAULT_UPDATE_BUFFER,
        }
    }
}
