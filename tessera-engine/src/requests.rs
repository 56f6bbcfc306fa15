//! In-flight history requests
//!
//! Every history request that goes to the network gets a completion slot
//! keyed by its request ID. The response task takes the slot to deliver the
//! page; cancelling or timing out removes it first, so a late response finds
//! nothing to deliver to and is dropped.

use crate::error::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tessera_proto::storage::{Group, Message, User};
use tokio::sync::oneshot;

pub type RequestId = u64;

/// One page of history, newest message first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub users: Vec<User>,
    pub groups: Vec<Group>,
}

impl HistoryPage {
    pub fn ids(&self) -> Vec<i64> {
        self.messages.iter().map(|m| m.id).collect()
    }
}

type Slot = oneshot::Sender<Result<HistoryPage, EngineError>>;

#[derive(Default)]
pub(crate) struct Inflight {
    slots: Mutex<HashMap<RequestId, Slot>>,
}

impl Inflight {
    pub fn register(self: &Arc<Self>, request_id: RequestId) -> HistoryCall {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(request_id, tx);
        }
        HistoryCall {
            request_id,
            rx,
            inflight: Some(self.clone()),
        }
    }

    /// Hand `result` to the waiting caller, if it is still waiting.
    pub fn complete(&self, request_id: RequestId, result: Result<HistoryPage, EngineError>) -> bool {
        match self.take(request_id) {
            Some(slot) => slot.send(result).is_ok(),
            None => {
                tracing::debug!(request_id, "Dropping response for cancelled request");
                false
            }
        }
    }

    /// Remove the slot without delivering; the caller observes `Cancelled`.
    pub fn abandon(&self, request_id: RequestId) {
        drop(self.take(request_id));
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or_default()
    }

    fn take(&self, request_id: RequestId) -> Option<Slot> {
        let Ok(mut slots) = self.slots.lock() else {
            return None;
        };
        slots.remove(&request_id)
    }
}

/// Handle to a history request.
///
/// Pages served from the local cache are ready immediately; network-bound
/// requests complete when the response has been merged. Dropping the handle
/// cancels the request.
pub struct HistoryCall {
    request_id: RequestId,
    rx: oneshot::Receiver<Result<HistoryPage, EngineError>>,
    inflight: Option<Arc<Inflight>>,
}

impl HistoryCall {
    pub(crate) fn ready(result: Result<HistoryPage, EngineError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            request_id: 0,
            rx,
            inflight: None,
        }
    }

    /// 0 for pages that never touched the network.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// True if the page did not need a network round trip.
    pub fn is_local(&self) -> bool {
        self.inflight.is_none()
    }

    /// Wait up to `timeout` for the page. On timeout the request is cancelled.
    pub async fn wait(mut self, timeout: Duration) -> Result<HistoryPage, EngineError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::Cancelled),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    /// Stop waiting. Fills already applied by a response are kept.
    pub fn cancel(self) {}
}

impl Drop for HistoryCall {
    fn drop(&mut self) {
        if let Some(inflight) = &self.inflight {
            inflight.abandon(self.request_id);
        }
    }
}
