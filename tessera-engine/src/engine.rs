//! SyncEngine - the public entry point
//!
//! Owns the repository, the detector registry and the network sender, and
//! wires the history dispatcher, outbox and update applier around them.

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::EngineError;
use crate::events::ClientUpdate;
use crate::history::HistoryDispatcher;
use crate::media::{NoopUploads, UploadController};
use crate::outbox::Outbox;
use crate::requests::HistoryCall;
use crate::updates::UpdateApplier;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tessera_holes::{DetectorRegistry, HoleStore};
use tessera_model::{MediaCategory, MessageId, PeerRef, StorageConfig, UpdateId};
use tessera_net_types::{NetworkEvent, NetworkSender};
use tessera_proto::storage::{Dialog, PendingMessage};
use tessera_proto::wire::UpdateContainer;
use tessera_storage::{RedbRepository, Repository};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Builder for creating a SyncEngine
pub struct EngineBuilder {
    storage: StorageConfig,
    config: EngineConfig,
    uploads: Option<Arc<dyn UploadController>>,
}

impl EngineBuilder {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            config: EngineConfig::default(),
            uploads: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_self_user(mut self, user_id: i64) -> Self {
        self.config.self_user_id = user_id;
        self
    }

    pub fn with_team(mut self, team_id: i64) -> Self {
        self.config.team_id = team_id;
        self
    }

    /// Directory delivered media files are moved into.
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.media_dir = dir.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_difference_batch_limit(mut self, limit: i32) -> Self {
        self.config.difference_batch_limit = limit;
        self
    }

    /// Upload controller for media messages. Defaults to [`NoopUploads`].
    pub fn with_uploads(mut self, uploads: Arc<dyn UploadController>) -> Self {
        self.uploads = Some(uploads);
        self
    }

    /// Open the configured storage and build the engine.
    pub fn build(self, sender: Arc<dyn NetworkSender>) -> Result<SyncEngine, EngineError> {
        if !self.storage.is_persistent() {
            tracing::warn!("In-memory storage, nothing survives a restart");
        }
        let repo = Arc::new(RedbRepository::open(&self.storage)?);
        self.build_with_repository(repo, sender)
    }

    /// Build on top of an existing repository.
    pub fn build_with_repository<R: Repository + 'static>(
        self,
        repo: Arc<R>,
        sender: Arc<dyn NetworkSender>,
    ) -> Result<SyncEngine, EngineError> {
        let hole_store: Arc<dyn HoleStore> = repo.clone();
        let repo: Arc<dyn Repository> = repo;
        let holes = Arc::new(DetectorRegistry::new(hole_store));

        let lowest_pending = repo.lowest_pending_id()?;
        let ctx = Arc::new(Context::new(repo, holes, sender, self.config));
        let uploads = self.uploads.unwrap_or_else(|| Arc::new(NoopUploads));

        let history = HistoryDispatcher::new(ctx.clone());
        let outbox = Arc::new(Outbox::new(ctx.clone(), uploads, lowest_pending));
        let updates = Arc::new(UpdateApplier::new(ctx.clone(), outbox.clone())?);

        tracing::info!(
            team_id = ctx.config.team_id,
            self_user_id = ctx.config.self_user_id,
            lowest_pending,
            "Sync engine ready"
        );
        Ok(SyncEngine {
            ctx,
            history,
            outbox,
            updates,
        })
    }
}

/// Gap-aware history sync engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct SyncEngine {
    ctx: Arc<Context>,
    history: HistoryDispatcher,
    outbox: Arc<Outbox>,
    updates: Arc<UpdateApplier>,
}

impl SyncEngine {
    // ==================== History ====================

    /// Request a page of history for `peer`.
    ///
    /// `min`/`max` of 0 leave that side open; with both open the page ends at
    /// the dialog's newest message. Pages are newest first. Unknown dialogs
    /// yield an empty page.
    pub fn get_history(
        &self,
        peer: PeerRef,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<HistoryCall, EngineError> {
        self.history.get_history(peer, min, max, limit)
    }

    /// Like [`get_history`](Self::get_history), restricted to one media category.
    pub fn get_media_history(
        &self,
        peer: PeerRef,
        category: MediaCategory,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<HistoryCall, EngineError> {
        self.history.get_media_history(peer, category, min, max, limit)
    }

    /// Human readable bars for one detector, e.g. `[F: 1 - 40][H: 41 - 49]`.
    pub fn print_hole_state(&self, peer: PeerRef, category: MediaCategory) -> Result<String, EngineError> {
        Ok(self.ctx.holes.print(&peer.key(category))?)
    }

    /// Store dialogs from a dialog list and mark each top message as cached.
    pub fn save_dialogs(&self, dialogs: &[Dialog]) -> Result<(), EngineError> {
        for dialog in dialogs {
            self.ctx.repo.save_dialog(dialog)?;
            let top = dialog.top_message_id;
            if top > 0 {
                self.ctx.holes.insert_fill(&dialog.peer().key(MediaCategory::All), top, top)?;
            }
        }
        Ok(())
    }

    // ==================== Outbox ====================

    /// Send a text message. The returned pending message (negative ID) can be
    /// shown right away.
    pub fn send_message(
        &self,
        peer: PeerRef,
        body: &str,
        reply_to: MessageId,
    ) -> Result<PendingMessage, EngineError> {
        self.outbox.send_message(peer, body, reply_to)
    }

    /// Send a file. The upload is started through the upload controller.
    pub fn send_media_message(
        &self,
        peer: PeerRef,
        file_path: impl Into<PathBuf>,
        category: MediaCategory,
        caption: &str,
    ) -> Result<PendingMessage, EngineError> {
        self.outbox
            .send_media_message(peer, file_path.into(), category, caption)
    }

    /// Send a failed pending message again.
    pub fn retry_pending_message(&self, pending_id: MessageId) -> Result<(), EngineError> {
        self.outbox.retry(pending_id)
    }

    /// Discard a pending message and cancel its upload. Returns false if no
    /// such pending message exists.
    pub fn delete_pending_message(&self, pending_id: MessageId) -> Result<bool, EngineError> {
        self.outbox.delete(pending_id)
    }

    // ==================== Updates ====================

    /// Apply a container pushed by the server.
    pub fn apply_updates(&self, container: UpdateContainer) -> Result<(), EngineError> {
        self.updates.apply_container(container)
    }

    /// Fetch missed updates from the server.
    pub async fn resync(&self) -> Result<(), EngineError> {
        self.updates.resync().await
    }

    pub fn watermark(&self) -> Result<UpdateId, EngineError> {
        self.updates.watermark()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<ClientUpdate> {
        self.ctx.subscribe()
    }

    /// Run a difference sync every time the network reconnects.
    pub fn spawn_network_watcher(&self) -> JoinHandle<()> {
        let mut events = self.ctx.sender.network_events();
        let updates = self.updates.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(NetworkEvent::Connected) => {
                        tracing::info!("Network connected, syncing updates");
                        if let Err(e) = updates.resync().await {
                            tracing::warn!(error = %e, "Sync after reconnect failed");
                        }
                    }
                    Ok(NetworkEvent::Disconnected) => {
                        tracing::info!("Network disconnected");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Network events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ==================== Accessors ====================

    pub fn repository(&self) -> Arc<dyn Repository> {
        self.ctx.repo.clone()
    }

    pub fn holes(&self) -> Arc<DetectorRegistry> {
        self.ctx.holes.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Network-bound history requests still waiting for a response.
    pub fn inflight_requests(&self) -> usize {
        self.history.inflight()
    }
}
