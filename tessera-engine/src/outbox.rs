//! Outbox Reconciler
//!
//! Outgoing messages are stored as pending rows under negative IDs and shown
//! right away. Two server signals retire a row, and they can arrive in either
//! order:
//!
//! - the ID confirmation (`MessagesSent` or `UpdateMessageId`), mapping the
//!   row's correlation ID to the real message ID;
//! - the new-message update carrying the real message itself.
//!
//! Whichever arrives second deletes the row and tells the client to drop the
//! negative ID. Both paths run under one lock so neither can miss the other.

use crate::context::{decode_response, now_unix, Context};
use crate::error::EngineError;
use crate::events::ClientUpdate;
use crate::media::{MediaCache, UploadController};
use prost::Message as _;
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tessera_model::{MediaCategory, MessageId, PeerRef};
use tessera_net_types::Envelope;
use tessera_proto::kind;
use tessera_proto::storage::{Message, PendingMessage};
use tessera_proto::wire::{MessagesSent, SendMessage};

pub(crate) struct Outbox {
    ctx: Arc<Context>,
    uploads: Arc<dyn UploadController>,
    media: MediaCache,
    /// Last pending ID handed out; the next one is one lower.
    last_pending_id: AtomicI64,
    /// Held while matching a server signal against the pending rows.
    reconcile: Mutex<()>,
}

impl Outbox {
    pub fn new(
        ctx: Arc<Context>,
        uploads: Arc<dyn UploadController>,
        lowest_pending_id: MessageId,
    ) -> Self {
        let media = MediaCache::new(ctx.config.media_dir.clone());
        Self {
            ctx,
            uploads,
            media,
            last_pending_id: AtomicI64::new(lowest_pending_id.min(0)),
            reconcile: Mutex::new(()),
        }
    }

    fn next_pending_id(&self) -> MessageId {
        self.last_pending_id.fetch_sub(1, Ordering::SeqCst) - 1
    }

    // ==================== Local actions ====================

    /// Store a pending text message and send it in the background.
    pub fn send_message(
        self: &Arc<Self>,
        peer: PeerRef,
        body: &str,
        reply_to: MessageId,
    ) -> Result<PendingMessage, EngineError> {
        if body.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let pending = self.create_pending(peer, body.to_string(), reply_to, None)?;
        self.dispatch(pending.clone());
        Ok(pending)
    }

    /// Store a pending media message, start its upload and send it.
    pub fn send_media_message(
        self: &Arc<Self>,
        peer: PeerRef,
        file_path: PathBuf,
        category: MediaCategory,
        caption: &str,
    ) -> Result<PendingMessage, EngineError> {
        let file_id = rand::thread_rng().gen_range(1..i64::MAX);
        let pending = self.create_pending(
            peer,
            caption.to_string(),
            0,
            Some((file_id, file_path.clone(), category)),
        )?;
        self.uploads.start_upload(file_id, &file_path);
        self.dispatch(pending.clone());
        Ok(pending)
    }

    /// Re-send a pending message with its original request.
    pub fn retry(self: &Arc<Self>, pending_id: MessageId) -> Result<(), EngineError> {
        let pending = self
            .ctx
            .repo
            .get_pending(pending_id)?
            .ok_or(EngineError::UnknownPending(pending_id))?;
        self.dispatch(pending);
        Ok(())
    }

    /// Drop a pending message locally and abort its upload. Nothing is sent.
    pub fn delete(&self, pending_id: MessageId) -> Result<bool, EngineError> {
        let Some(pending) = self.ctx.repo.get_pending(pending_id)? else {
            return Ok(false);
        };
        if pending.has_file() {
            self.uploads.cancel_upload(pending.file_id);
        }
        self.ctx.repo.delete_pending(pending_id)?;
        Ok(true)
    }

    fn create_pending(
        &self,
        peer: PeerRef,
        body: String,
        reply_to: MessageId,
        file: Option<(i64, PathBuf, MediaCategory)>,
    ) -> Result<PendingMessage, EngineError> {
        let random_id = rand::thread_rng().gen_range(1..i64::MAX);
        let (file_id, file_path, category) = match file {
            Some((id, path, category)) => (id, path.to_string_lossy().into_owned(), category),
            None => (0, String::new(), MediaCategory::All),
        };
        let request = SendMessage {
            peer: Some(peer.into()),
            body: body.clone(),
            random_id,
            reply_to,
            file_id,
        };
        let pending = PendingMessage {
            id: self.next_pending_id(),
            team_id: peer.team_id,
            peer_id: peer.peer_id,
            peer_type: peer.peer_type,
            sender_id: self.ctx.config.self_user_id,
            random_id,
            real_id: 0,
            body,
            request: request.encode_to_vec(),
            file_id,
            file_path,
            created_on: now_unix(),
            media_category: category.as_i32(),
            reply_to,
        };
        self.ctx.repo.save_pending(&pending)?;
        Ok(pending)
    }

    fn dispatch(self: &Arc<Self>, pending: PendingMessage) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.send_pending(&pending).await {
                tracing::warn!(pending_id = pending.id, error = %e, "Send failed, keeping pending message");
                this.ctx.emit(ClientUpdate::PendingFailed {
                    pending_id: pending.id,
                    reason: e.to_string(),
                });
            }
        });
    }

    async fn send_pending(&self, pending: &PendingMessage) -> Result<(), EngineError> {
        let envelope = Envelope::new(kind::SEND_MESSAGE, self.ctx.next_request_id(), pending.request.clone());
        let response = self.ctx.sender.send(envelope, self.ctx.config.request_timeout).await?;
        let sent: MessagesSent = decode_response(&response, kind::MESSAGES_SENT)?;
        self.on_id_confirmed(sent.random_id, sent.message_id)
    }

    // ==================== Server signals ====================

    /// The server assigned `real_id` to the message sent with `random_id`.
    pub fn on_id_confirmed(&self, random_id: i64, real_id: MessageId) -> Result<(), EngineError> {
        let _guard = self.reconcile.lock().map_err(|_| EngineError::LockPoisoned)?;
        let Some(pending) = self.ctx.repo.get_pending_by_random_id(random_id)? else {
            tracing::debug!(random_id, real_id, "No pending message for confirmation");
            return Ok(());
        };

        match self.ctx.repo.get_message(pending.peer(), real_id)? {
            Some(message) => {
                tracing::info!(pending_id = pending.id, real_id, "Confirmation after new message");
                self.retire(&pending, &message)
            }
            None => {
                tracing::debug!(pending_id = pending.id, real_id, "Confirmation before new message");
                self.ctx.repo.save_pending_real_id(random_id, real_id)?;
                Ok(())
            }
        }
    }

    /// A message from the local user was stored. `random_id` is 0 when the
    /// update did not carry the correlation ID.
    pub fn on_new_message(&self, message: &Message, random_id: i64) -> Result<(), EngineError> {
        let _guard = self.reconcile.lock().map_err(|_| EngineError::LockPoisoned)?;
        let mut pending = self.ctx.repo.get_pending_by_real_id(message.id)?;
        if pending.is_none() && random_id != 0 {
            pending = self.ctx.repo.get_pending_by_random_id(random_id)?;
        }
        match pending {
            Some(pending) => self.retire(&pending, message),
            None => Ok(()),
        }
    }

    /// Replace a pending row with its confirmed message.
    fn retire(&self, pending: &PendingMessage, message: &Message) -> Result<(), EngineError> {
        if pending.has_file() && !pending.file_path.is_empty() {
            let source = PathBuf::from(&pending.file_path);
            if let Err(e) = self.media.adopt(&source, message) {
                tracing::error!(pending_id = pending.id, error = %e, "Could not keep uploaded file");
            }
        }
        self.ctx.repo.delete_pending(pending.id)?;
        self.ctx.emit(ClientUpdate::MessagesDeleted {
            peer: pending.peer(),
            ids: vec![pending.id],
        });
        self.ctx.emit(ClientUpdate::PendingDelivered {
            pending_id: pending.id,
            message: message.clone(),
        });
        Ok(())
    }
}
