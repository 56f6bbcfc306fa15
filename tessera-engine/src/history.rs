//! History Dispatcher
//!
//! Decides per request whether the local cache can answer. The answer comes
//! from the conversation's hole detector:
//!
//! - `max` only (or neither, with `max` taken from the dialog's top message):
//!   the filled run ending at `max`.
//! - `min` only: the filled run starting at `min`.
//! - both: the whole range must sit inside one filled run.
//!
//! Anything else goes to the network. When the page comes back its range is
//! marked filled, the messages are stored, and pending messages are spliced
//! in front when the page ends at the newest message.

use crate::context::{decode_response, Context};
use crate::error::EngineError;
use crate::requests::{HistoryCall, HistoryPage, Inflight};
use prost::Message as _;
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_model::{DetectorKey, MediaCategory, MessageId, PeerRef};
use tessera_net_types::Envelope;
use tessera_proto::kind;
use tessera_proto::storage::{Message, PendingMessage};
use tessera_proto::wire::{GetHistory, GetMediaHistory, MessagesMany};

/// Shape of a history request once the implicit bounds are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Window {
    Below { max: MessageId },
    Above { min: MessageId },
    Between { min: MessageId, max: MessageId },
}

impl Window {
    pub fn classify(min: MessageId, max: MessageId, top: MessageId) -> Self {
        match (min, max) {
            (0, 0) => Window::Below { max: top },
            (0, max) => Window::Below { max },
            (min, 0) => Window::Above { min },
            (min, max) => Window::Between { min, max },
        }
    }

    /// `(min_id, max_id)` as sent to the server.
    pub fn request_bounds(&self) -> (MessageId, MessageId) {
        match *self {
            Window::Below { max } => (0, max),
            Window::Above { min } => (min, 0),
            Window::Between { min, max } => (min, max),
        }
    }

    /// Range to mark filled after a network page. `page` is newest first.
    pub fn fill_range(&self, page: &[Message], limit: i32) -> Option<(MessageId, MessageId)> {
        let newest = page.first().map(|m| m.id);
        let oldest = page.last().map(|m| m.id);
        match *self {
            Window::Below { max } => Some((oldest?, max.max(newest?))),
            Window::Above { min } => Some((min, newest?)),
            Window::Between { min, max } if is_short(page, limit) => Some((min, max)),
            Window::Between { max, .. } => Some((oldest?, max)),
        }
    }

    /// A short page below `max` means the server has nothing older.
    pub fn reached_oldest(&self, page: &[Message], limit: i32) -> bool {
        matches!(self, Window::Below { .. }) && !page.is_empty() && is_short(page, limit)
    }

    /// Whether the page ends at the conversation's newest message.
    pub fn reaches_top(&self, page: &[Message], limit: i32, top: MessageId) -> bool {
        match *self {
            Window::Below { max } | Window::Between { max, .. } => max >= top,
            Window::Above { .. } => is_short(page, limit) || page.first().is_some_and(|m| m.id >= top),
        }
    }
}

fn is_short(page: &[Message], limit: i32) -> bool {
    limit > 0 && page.len() < limit as usize
}

/// What to do with a network page once it arrives.
struct Completion {
    peer: PeerRef,
    key: DetectorKey,
    window: Window,
    limit: i32,
    top: MessageId,
    splice_pending: bool,
}

impl Completion {
    fn apply(&self, ctx: &Context, response: &Envelope) -> Result<HistoryPage, EngineError> {
        let mut res: MessagesMany = decode_response(response, kind::MESSAGES_MANY)?;
        res.messages.sort_by(|a, b| b.id.cmp(&a.id));

        ctx.repo.save_messages(&res.messages)?;
        ctx.repo.save_users(&res.users)?;
        ctx.repo.save_groups(&res.groups)?;

        if let Some((min, max)) = self.window.fill_range(&res.messages, self.limit) {
            ctx.holes.insert_fill(&self.key, min, max)?;
        }
        if self.window.reached_oldest(&res.messages, self.limit) {
            ctx.holes.set_lower_filled(&self.key)?;
        }

        let mut page = HistoryPage {
            messages: res.messages,
            users: res.users,
            groups: res.groups,
        };
        if self.splice_pending && self.window.reaches_top(&page.messages, self.limit, self.top) {
            splice_pending(ctx, self.peer, &mut page)?;
        }
        Ok(page)
    }
}

fn splice_pending(ctx: &Context, peer: PeerRef, page: &mut HistoryPage) -> Result<(), EngineError> {
    let pending = ctx.repo.pending_by_peer(peer)?;
    if !pending.is_empty() {
        let mut merged: Vec<Message> = pending.iter().map(PendingMessage::to_message).collect();
        merged.append(&mut page.messages);
        page.messages = merged;
    }
    Ok(())
}

pub(crate) struct HistoryDispatcher {
    ctx: Arc<Context>,
    inflight: Arc<Inflight>,
}

impl HistoryDispatcher {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            inflight: Arc::new(Inflight::default()),
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    pub fn get_history(
        &self,
        peer: PeerRef,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<HistoryCall, EngineError> {
        let Some(dialog) = self.ctx.repo.dialog(peer)? else {
            return Ok(HistoryCall::ready(Ok(HistoryPage::default())));
        };

        if !self.ctx.sender.is_connected() {
            let messages = self.ctx.repo.message_history(peer, min, max, limit)?;
            let mut page = self.local_page(peer, messages)?;
            splice_pending(&self.ctx, peer, &mut page)?;
            return Ok(HistoryCall::ready(Ok(page)));
        }

        let top = dialog.top_message_id;
        let window = Window::classify(min, max, top);
        let key = peer.key(MediaCategory::All);

        if let Some((lo, hi)) = self.cached_range(&key, window)? {
            let messages = self.ctx.repo.message_history(peer, lo, hi, limit)?;
            let mut page = self.local_page(peer, messages)?;
            if window.reaches_top(&page.messages, limit, top) {
                splice_pending(&self.ctx, peer, &mut page)?;
            }
            return Ok(HistoryCall::ready(Ok(page)));
        }

        let holes = self.ctx.holes.print(&key)?;
        tracing::info!(peer = %peer, ?window, top, holes = %holes, "History hole detected");
        let (min_id, max_id) = window.request_bounds();
        let request = GetHistory {
            peer: Some(peer.into()),
            min_id,
            max_id,
            limit,
        };
        let completion = Completion {
            peer,
            key,
            window,
            limit,
            top,
            splice_pending: true,
        };
        Ok(self.forward(kind::GET_HISTORY, request.encode_to_vec(), completion))
    }

    pub fn get_media_history(
        &self,
        peer: PeerRef,
        category: MediaCategory,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<HistoryCall, EngineError> {
        let Some(dialog) = self.ctx.repo.dialog(peer)? else {
            return Ok(HistoryCall::ready(Ok(HistoryPage::default())));
        };

        let top = dialog.top_message_id;
        let window = Window::classify(min, max, top);
        let key = peer.key(category);

        if let Some((lo, hi)) = self.cached_range(&key, window)? {
            let messages = self.ctx.repo.media_history(peer, category, lo, hi, limit)?;
            return Ok(HistoryCall::ready(self.local_page(peer, messages)));
        }

        let holes = self.ctx.holes.print(&key)?;
        tracing::info!(peer = %peer, %category, ?window, holes = %holes, "Media history hole detected");
        let (min_id, max_id) = window.request_bounds();
        let request = GetMediaHistory {
            peer: Some(peer.into()),
            min_id,
            max_id,
            limit,
            category: category.as_i32(),
        };
        let completion = Completion {
            peer,
            key,
            window,
            limit,
            top,
            splice_pending: false,
        };
        Ok(self.forward(kind::GET_MEDIA_HISTORY, request.encode_to_vec(), completion))
    }

    /// Repository bounds to serve `window` from, or `None` on a hole.
    fn cached_range(
        &self,
        key: &DetectorKey,
        window: Window,
    ) -> Result<Option<(MessageId, MessageId)>, EngineError> {
        let holes = &self.ctx.holes;
        let range = match window {
            Window::Below { max } => holes.lower_filled(key, max)?.map(|bar| (bar.min, bar.max)),
            Window::Above { min } => holes.upper_filled(key, min)?.map(|bar| (bar.min, 0)),
            Window::Between { min, max } => holes.is_range_filled(key, min, max)?.then_some((min, max)),
        };
        Ok(range)
    }

    /// Attach the known senders (and the group, for group chats) to a cached page.
    fn local_page(&self, peer: PeerRef, messages: Vec<Message>) -> Result<HistoryPage, EngineError> {
        let sender_ids: BTreeSet<i64> = messages.iter().map(|m| m.sender_id).collect();
        let mut users = Vec::with_capacity(sender_ids.len());
        for id in sender_ids {
            if let Some(user) = self.ctx.repo.get_user(id)? {
                users.push(user);
            }
        }
        let mut groups = Vec::new();
        if peer.is_group() {
            groups.extend(self.ctx.repo.get_group(peer.peer_id)?);
        }
        Ok(HistoryPage { messages, users, groups })
    }

    fn forward(&self, kind: u32, payload: Vec<u8>, completion: Completion) -> HistoryCall {
        let request_id = self.ctx.next_request_id();
        let call = self.inflight.register(request_id);
        let ctx = self.ctx.clone();
        let inflight = self.inflight.clone();

        tokio::spawn(async move {
            let envelope = Envelope::new(kind, request_id, payload);
            let result = match ctx.sender.send(envelope, ctx.config.request_timeout).await {
                Ok(response) => completion.apply(&ctx, &response),
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(page) => {
                    inflight.complete(request_id, Ok(page));
                }
                Err(EngineError::Decode(e)) => {
                    tracing::error!(request_id, error = %e, "Malformed history response");
                    inflight.abandon(request_id);
                }
                Err(e) => {
                    tracing::warn!(request_id, error = %e, "History request failed");
                    inflight.complete(request_id, Err(e));
                }
            }
        });
        call
    }
}
