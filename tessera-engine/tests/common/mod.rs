// Each integration test compiles as a separate binary that includes this module via `mod common;`.
// Not every test binary uses every helper, so Rust emits spurious dead_code warnings.
#![allow(dead_code)]
//! Shared test utilities for tessera-engine integration tests.

use prost::Message as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tessera_engine::{
    ClientUpdate, Dialog, EngineBuilder, Group, MediaCategory, Message, MessageId, PeerRef,
    PendingMessage, StorageConfig, SyncEngine, UploadController, User,
};
use tessera_holes::{HoleStore, HoleStoreError};
use tessera_model::{DetectorKey, PEER_TYPE_USER};
use tessera_net_sim::{channel, SimRequest, SimServer};
use tessera_proto::kind;
use tessera_proto::wire::{MessagesMany, UpdateContainer, UpdateEnvelope, UpdateNewMessage};
use tessera_storage::{
    DialogStore, MessageStore, PendingStore, RedbRepository, StorageError, SystemStore,
};
use tokio::sync::broadcast;

pub const SELF_USER: i64 = 1;
pub const OTHER_USER: i64 = 2;
pub const WAIT: Duration = Duration::from_secs(2);

pub fn peer() -> PeerRef {
    PeerRef::new(0, 42, PEER_TYPE_USER)
}

/// An engine on in-memory storage wired to a simulated server.
pub struct TestEngine {
    pub engine: SyncEngine,
    pub server: SimServer,
    pub updates: broadcast::Receiver<ClientUpdate>,
    pub media_dir: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_builder(|b| b)
    }

    pub fn with_builder(configure: impl FnOnce(EngineBuilder) -> EngineBuilder) -> Self {
        Self::assemble(configure, None)
    }

    /// Same as [`TestEngine::with_builder`], on top of `repo`.
    pub fn with_repository(
        repo: Arc<FlakyRepo>,
        configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
    ) -> Self {
        Self::assemble(configure, Some(repo))
    }

    fn assemble(
        configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
        repo: Option<Arc<FlakyRepo>>,
    ) -> Self {
        let media_dir = tempfile::tempdir().expect("media dir");
        let (sender, server) = channel();
        let builder = EngineBuilder::new(StorageConfig::InMemory)
            .with_self_user(SELF_USER)
            .with_media_dir(media_dir.path());
        let builder = configure(builder);
        let engine = match repo {
            Some(repo) => builder.build_with_repository(repo, Arc::new(sender)),
            None => builder.build(Arc::new(sender)),
        }
        .expect("build engine");
        let updates = engine.subscribe_updates();
        Self {
            engine,
            server,
            updates,
            media_dir,
        }
    }

    /// Store a dialog without touching the hole detector.
    pub fn add_dialog(&self, peer: PeerRef, top: i64) {
        self.engine
            .repository()
            .save_dialog(&Dialog::for_peer(peer, top))
            .expect("save dialog");
    }

    pub async fn next_request(&mut self) -> SimRequest {
        tokio::time::timeout(WAIT, self.server.next_request())
            .await
            .expect("request timed out")
            .expect("sender dropped")
    }

    pub async fn next_update(&mut self) -> ClientUpdate {
        tokio::time::timeout(WAIT, self.updates.recv())
            .await
            .expect("update timed out")
            .expect("update channel closed")
    }

    /// True if no client update arrives within a short grace period.
    pub async fn no_update(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(100), self.updates.recv())
            .await
            .is_err()
    }
}

pub fn message(peer: PeerRef, id: i64, sender_id: i64) -> Message {
    Message {
        id,
        team_id: peer.team_id,
        peer_id: peer.peer_id,
        peer_type: peer.peer_type,
        sender_id,
        body: format!("message {id}"),
        created_on: 1_700_000_000 + id,
        ..Default::default()
    }
}

pub fn messages(peer: PeerRef, ids: &[i64]) -> Vec<Message> {
    ids.iter().map(|&id| message(peer, id, OTHER_USER)).collect()
}

pub fn messages_many(messages: Vec<Message>) -> Vec<u8> {
    MessagesMany {
        messages,
        ..Default::default()
    }
    .encode_to_vec()
}

/// Answer a history request with the given messages.
pub fn respond_history(request: SimRequest, messages: Vec<Message>) {
    request.respond(kind::MESSAGES_MANY, messages_many(messages));
}

pub fn new_message_update(update_id: i64, message: Message, random_id: i64) -> UpdateEnvelope {
    UpdateEnvelope {
        kind: kind::UPDATE_NEW_MESSAGE,
        update_id,
        payload: UpdateNewMessage {
            message: Some(message),
            sender: None,
            random_id,
        }
        .encode_to_vec(),
        timestamp: 0,
    }
}

pub fn container(updates: Vec<UpdateEnvelope>) -> UpdateContainer {
    let sequenced = updates.iter().map(|u| u.update_id).filter(|&id| id > 0);
    let min_update_id = sequenced.clone().min().unwrap_or(0);
    let max_update_id = sequenced.max().unwrap_or(0);
    UpdateContainer {
        updates,
        min_update_id,
        max_update_id,
        ..Default::default()
    }
}

/// Poll `check` until it holds or the wait runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Upload controller that records what it was asked to do.
#[derive(Default)]
pub struct RecordingUploads {
    pub started: Mutex<Vec<i64>>,
    pub cancelled: Mutex<Vec<i64>>,
}

impl UploadController for RecordingUploads {
    fn start_upload(&self, file_id: i64, _path: &Path) {
        self.started.lock().unwrap().push(file_id);
    }

    fn cancel_upload(&self, file_id: i64) {
        self.cancelled.lock().unwrap().push(file_id);
    }
}

/// In-memory repository with knobs for slow lookups and failing writes.
pub struct FlakyRepo {
    inner: RedbRepository,
    /// Sleep this long when `get_message` finds nothing.
    pub miss_delay: Mutex<Option<Duration>>,
    /// Set once a delayed lookup has started sleeping.
    pub stalled: AtomicBool,
    pub fail_pending_saves: AtomicBool,
}

impl FlakyRepo {
    pub fn new() -> Self {
        Self {
            inner: RedbRepository::in_memory().expect("in-memory repository"),
            miss_delay: Mutex::new(None),
            stalled: AtomicBool::new(false),
            fail_pending_saves: AtomicBool::new(false),
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }
}

impl MessageStore for FlakyRepo {
    fn save_messages(&self, messages: &[Message]) -> Result<(), StorageError> {
        self.inner.save_messages(messages)
    }

    fn get_message(&self, peer: PeerRef, id: MessageId) -> Result<Option<Message>, StorageError> {
        let found = self.inner.get_message(peer, id)?;
        let delay = *self.miss_delay.lock().unwrap();
        if let (None, Some(delay)) = (&found, delay) {
            self.stalled.store(true, Ordering::SeqCst);
            std::thread::sleep(delay);
        }
        Ok(found)
    }

    fn delete_messages(&self, peer: PeerRef, ids: &[MessageId]) -> Result<(), StorageError> {
        self.inner.delete_messages(peer, ids)
    }

    fn message_history(
        &self,
        peer: PeerRef,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<Vec<Message>, StorageError> {
        self.inner.message_history(peer, min, max, limit)
    }

    fn media_history(
        &self,
        peer: PeerRef,
        category: MediaCategory,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<Vec<Message>, StorageError> {
        self.inner.media_history(peer, category, min, max, limit)
    }

    fn save_users(&self, users: &[User]) -> Result<(), StorageError> {
        self.inner.save_users(users)
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        self.inner.get_user(id)
    }

    fn save_groups(&self, groups: &[Group]) -> Result<(), StorageError> {
        self.inner.save_groups(groups)
    }

    fn get_group(&self, id: i64) -> Result<Option<Group>, StorageError> {
        self.inner.get_group(id)
    }
}

impl DialogStore for FlakyRepo {
    fn dialog(&self, peer: PeerRef) -> Result<Option<Dialog>, StorageError> {
        self.inner.dialog(peer)
    }

    fn save_dialog(&self, dialog: &Dialog) -> Result<(), StorageError> {
        self.inner.save_dialog(dialog)
    }

    fn list_dialogs(&self) -> Result<Vec<Dialog>, StorageError> {
        self.inner.list_dialogs()
    }
}

impl PendingStore for FlakyRepo {
    fn save_pending(&self, pending: &PendingMessage) -> Result<(), StorageError> {
        if self.fail_pending_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.save_pending(pending)
    }

    fn get_pending(&self, id: MessageId) -> Result<Option<PendingMessage>, StorageError> {
        self.inner.get_pending(id)
    }

    fn get_pending_by_random_id(&self, random_id: i64) -> Result<Option<PendingMessage>, StorageError> {
        self.inner.get_pending_by_random_id(random_id)
    }

    fn get_pending_by_real_id(&self, real_id: MessageId) -> Result<Option<PendingMessage>, StorageError> {
        self.inner.get_pending_by_real_id(real_id)
    }

    fn save_pending_real_id(
        &self,
        random_id: i64,
        real_id: MessageId,
    ) -> Result<Option<PendingMessage>, StorageError> {
        self.inner.save_pending_real_id(random_id, real_id)
    }

    fn delete_pending(&self, id: MessageId) -> Result<Option<PendingMessage>, StorageError> {
        self.inner.delete_pending(id)
    }

    fn pending_by_peer(&self, peer: PeerRef) -> Result<Vec<PendingMessage>, StorageError> {
        self.inner.pending_by_peer(peer)
    }

    fn lowest_pending_id(&self) -> Result<MessageId, StorageError> {
        self.inner.lowest_pending_id()
    }
}

impl SystemStore for FlakyRepo {
    fn system_int(&self, key: &str) -> Result<Option<i64>, StorageError> {
        self.inner.system_int(key)
    }

    fn set_system_int(&self, key: &str, value: i64) -> Result<(), StorageError> {
        self.inner.set_system_int(key, value)
    }
}

impl HoleStore for FlakyRepo {
    fn load_holes(&self, key: &DetectorKey) -> Result<Vec<u8>, HoleStoreError> {
        self.inner.load_holes(key)
    }

    fn save_holes(&self, key: &DetectorKey, bars: &[u8]) -> Result<(), HoleStoreError> {
        self.inner.save_holes(key, bars)
    }
}
