//! Update Applier
//!
//! Applies pushed update containers in sequence order and keeps the update
//! watermark. A container that starts past `watermark + 1` means updates were
//! lost: its sequenced updates are dropped and a difference sync fetches the
//! missing range from the server instead.

use crate::context::{decode_response, Context};
use crate::error::EngineError;
use crate::events::ClientUpdate;
use crate::outbox::Outbox;
use prost::Message as _;
use std::sync::{Arc, Mutex};
use tessera_holes::{GapCheck, UpdateGapDetector};
use tessera_model::{MediaCategory, PeerRef, UpdateId};
use tessera_proto::kind;
use tessera_proto::storage::{Dialog, Group, User};
use tessera_proto::wire::{
    GetDifference, UpdateContainer, UpdateDifference, UpdateEnvelope, UpdateMessageId,
    UpdateMessagesDeleted, UpdateNewMessage,
};

pub(crate) struct UpdateApplier {
    ctx: Arc<Context>,
    outbox: Arc<Outbox>,
    gap: Mutex<UpdateGapDetector>,
    /// Held for the duration of a difference sync.
    syncing: tokio::sync::Mutex<()>,
}

impl UpdateApplier {
    pub fn new(ctx: Arc<Context>, outbox: Arc<Outbox>) -> Result<Self, EngineError> {
        let watermark = ctx
            .repo
            .system_int(&watermark_key(ctx.config.team_id))?
            .unwrap_or_default();
        tracing::debug!(watermark, "Loaded update watermark");
        Ok(Self {
            ctx,
            outbox,
            gap: Mutex::new(UpdateGapDetector::new(watermark)),
            syncing: tokio::sync::Mutex::new(()),
        })
    }

    pub fn watermark(&self) -> Result<UpdateId, EngineError> {
        let gap = self.gap.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(gap.watermark())
    }

    pub fn apply_container(self: &Arc<Self>, container: UpdateContainer) -> Result<(), EngineError> {
        self.save_entities(&container.users, &container.groups)?;

        let check = {
            let gap = self.gap.lock().map_err(|_| EngineError::LockPoisoned)?;
            gap.check(container.min_update_id)
        };

        match check {
            GapCheck::InSync => self.apply_batch(container.updates),
            GapCheck::OutOfSync { from, to } => {
                tracing::warn!(from, to, "Update gap detected, starting difference sync");
                self.ctx.emit(ClientUpdate::OutOfSync { from, to });

                let unsequenced = container.updates.into_iter().filter(|u| u.update_id == 0).collect();
                self.apply_batch(unsequenced)?;

                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.resync().await {
                        tracing::warn!(error = %e, "Difference sync failed");
                    }
                });
                Ok(())
            }
        }
    }

    /// Fetch and apply everything after the watermark. Returns immediately if
    /// another sync is already running.
    pub async fn resync(&self) -> Result<(), EngineError> {
        let Ok(_guard) = self.syncing.try_lock() else {
            tracing::debug!("Difference sync already running");
            return Ok(());
        };

        let batch_limit = self.ctx.config.difference_batch_limit.max(1) as i64;
        let mut limit = batch_limit;
        loop {
            let start = self.watermark()?;
            let request = GetDifference {
                from: start + 1,
                limit: limit as i32,
            };
            let response = self.ctx.request(kind::GET_DIFFERENCE, &request).await?;
            let diff: UpdateDifference = decode_response(&response, kind::UPDATE_DIFFERENCE)?;
            tracing::info!(
                from = request.from,
                count = diff.updates.len(),
                current = diff.current_update_id,
                more = diff.more,
                "Applying difference"
            );

            self.save_entities(&diff.users, &diff.groups)?;
            self.apply_batch(diff.updates)?;
            {
                let mut gap = self.gap.lock().map_err(|_| EngineError::LockPoisoned)?;
                gap.advance_to(diff.max_update_id);
            }
            let reached = self.persist_watermark()?;

            if !diff.more || reached >= diff.current_update_id {
                break;
            }
            if reached <= start {
                let missing: String = {
                    let gap = self.gap.lock().map_err(|_| EngineError::LockPoisoned)?;
                    gap.missing().iter().map(ToString::to_string).collect()
                };
                tracing::warn!(watermark = reached, missing = %missing, "Difference sync made no progress");
                break;
            }
            limit = (diff.current_update_id - reached).clamp(1, batch_limit);
        }

        let update_id = self.watermark()?;
        tracing::info!(update_id, "Difference sync finished");
        self.ctx.emit(ClientUpdate::Synced { update_id });
        Ok(())
    }

    /// Apply updates in ID order, skipping sequenced ones already applied.
    fn apply_batch(&self, mut updates: Vec<UpdateEnvelope>) -> Result<(), EngineError> {
        if updates.is_empty() {
            return Ok(());
        }
        updates.sort_by_key(|u| u.update_id);

        for update in &updates {
            let id = update.update_id;
            if self.gap.lock().map_err(|_| EngineError::LockPoisoned)?.is_applied(id) {
                tracing::debug!(update_id = id, "Skipping applied update");
                continue;
            }
            match self.apply_one(update) {
                Ok(()) => {}
                Err(EngineError::Decode(e)) => {
                    tracing::error!(update_id = id, kind = kind::name(update.kind), error = %e, "Malformed update dropped");
                }
                Err(e) => return Err(e),
            }
            self.gap.lock().map_err(|_| EngineError::LockPoisoned)?.record(id);
        }

        self.persist_watermark()?;
        Ok(())
    }

    fn apply_one(&self, update: &UpdateEnvelope) -> Result<(), EngineError> {
        tracing::debug!(update_id = update.update_id, kind = kind::name(update.kind), "Applying update");
        match update.kind {
            kind::UPDATE_NEW_MESSAGE => {
                let update = UpdateNewMessage::decode(update.payload.as_slice())?;
                self.apply_new_message(update)
            }
            kind::UPDATE_MESSAGE_ID => {
                let update = UpdateMessageId::decode(update.payload.as_slice())?;
                self.outbox.on_id_confirmed(update.random_id, update.message_id)
            }
            kind::UPDATE_MESSAGES_DELETED => {
                let update = UpdateMessagesDeleted::decode(update.payload.as_slice())?;
                let peer = PeerRef::from(update.peer.unwrap_or_default());
                self.ctx.repo.delete_messages(peer, &update.message_ids)?;
                self.ctx.emit(ClientUpdate::MessagesDeleted {
                    peer,
                    ids: update.message_ids,
                });
                Ok(())
            }
            other => {
                tracing::debug!(kind = other, "Ignoring update");
                Ok(())
            }
        }
    }

    fn apply_new_message(&self, update: UpdateNewMessage) -> Result<(), EngineError> {
        let Some(message) = update.message else {
            return Ok(());
        };
        if let Some(sender) = update.sender {
            self.ctx.repo.save_users(&[sender])?;
        }

        let peer = message.peer();
        let from_self = message.sender_id == self.ctx.config.self_user_id;
        let key = peer.key(MediaCategory::All);
        match self.ctx.repo.dialog(peer)? {
            Some(mut dialog) => {
                let previous_top = dialog.top_message_id;
                if message.id > previous_top {
                    dialog.top_message_id = message.id;
                }
                if !from_self {
                    dialog.unread_count += 1;
                }
                self.ctx.repo.save_dialog(&dialog)?;
                // Nothing is missing between the old top and the new message.
                let from = if previous_top > 0 && previous_top < message.id {
                    previous_top
                } else {
                    message.id
                };
                self.ctx.holes.insert_fill(&key, from, message.id)?;
            }
            None => {
                let mut dialog = Dialog::for_peer(peer, message.id);
                if !from_self {
                    dialog.unread_count = 1;
                }
                self.ctx.repo.save_dialog(&dialog)?;
                self.ctx.holes.insert_fill(&key, message.id, message.id)?;
            }
        }

        self.ctx.repo.save_messages(std::slice::from_ref(&message))?;
        self.ctx.emit(ClientUpdate::NewMessage(message.clone()));

        if from_self {
            self.outbox.on_new_message(&message, update.random_id)?;
        }
        Ok(())
    }

    fn save_entities(&self, users: &[User], groups: &[Group]) -> Result<(), EngineError> {
        self.ctx.repo.save_users(users)?;
        self.ctx.repo.save_groups(groups)?;
        Ok(())
    }

    fn persist_watermark(&self) -> Result<UpdateId, EngineError> {
        let watermark = self.watermark()?;
        self.ctx
            .repo
            .set_system_int(&watermark_key(self.ctx.config.team_id), watermark)?;
        Ok(watermark)
    }
}

fn watermark_key(team_id: i64) -> String {
    format!("update_id.{team_id}")
}
