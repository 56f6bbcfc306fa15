//! Outbox reconciliation: optimistic sends against confirmations and updates.

mod common;

use common::*;
use prost::Message as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tessera_engine::{ClientUpdate, EngineError, MediaCategory, TransportError};
use tessera_proto::kind;
use tessera_proto::wire::{MessagesSent, SendMessage};
use tessera_net_sim::SimRequest;
use tessera_storage::PendingStore;

fn sent_request(request: &SimRequest) -> SendMessage {
    assert_eq!(request.kind(), kind::SEND_MESSAGE);
    SendMessage::decode(request.envelope.payload.as_slice()).unwrap()
}

fn confirm(request: SimRequest, message_id: i64, random_id: i64) {
    let sent = MessagesSent {
        message_id,
        random_id,
        created_on: 0,
    };
    request.respond(kind::MESSAGES_SENT, sent.encode_to_vec());
}

#[tokio::test]
async fn test_send_creates_pending_row() {
    let mut t = TestEngine::new();
    let peer = peer();

    let first = t.engine.send_message(peer, "hello", 0).unwrap();
    let second = t.engine.send_message(peer, "again", first.id).unwrap();
    assert_eq!((first.id, second.id), (-1, -2));
    assert_ne!(first.random_id, second.random_id);
    assert_eq!(second.reply_to, -1);

    let request = sent_request(&t.next_request().await);
    assert_eq!(request.body, "hello");
    assert_eq!(request.random_id, first.random_id);

    let rows = t.engine.repository().pending_by_peer(peer).unwrap();
    let ids: Vec<_> = rows.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![-2, -1]);
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let mut t = TestEngine::new();
    let result = t.engine.send_message(peer(), "  ", 0);

    assert!(matches!(result, Err(EngineError::EmptyMessage)));
    assert!(t.engine.repository().pending_by_peer(peer()).unwrap().is_empty());
    assert!(t.server.try_next_request().is_none());
}

#[tokio::test]
async fn test_new_message_before_confirmation() {
    let mut t = TestEngine::new();
    let peer = peer();
    let pending = t.engine.send_message(peer, "hi", 0).unwrap();
    let request = t.next_request().await;

    let real = message(peer, 200, SELF_USER);
    t.engine
        .apply_updates(container(vec![new_message_update(1, real.clone(), pending.random_id)]))
        .unwrap();

    assert!(matches!(t.next_update().await, ClientUpdate::NewMessage(m) if m.id == 200));
    match t.next_update().await {
        ClientUpdate::MessagesDeleted { peer: p, ids } => {
            assert_eq!(p, peer);
            assert_eq!(ids, vec![pending.id]);
        }
        other => panic!("expected deletion, got {other:?}"),
    }
    assert!(matches!(
        t.next_update().await,
        ClientUpdate::PendingDelivered { pending_id, message } if pending_id == pending.id && message.id == 200
    ));
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_none());

    // The confirmation arriving afterwards finds nothing left to do.
    confirm(request, 200, pending.random_id);
    assert!(t.no_update().await);
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_none());
}

#[tokio::test]
async fn test_confirmation_before_new_message() {
    let mut t = TestEngine::new();
    let peer = peer();
    let pending = t.engine.send_message(peer, "hi", 0).unwrap();
    confirm(t.next_request().await, 300, pending.random_id);

    let repo = t.engine.repository();
    assert!(
        eventually(|| {
            repo.get_pending(pending.id)
                .unwrap()
                .is_some_and(|p| p.real_id == 300)
        })
        .await
    );
    assert!(t.no_update().await);

    // No correlation ID on the update; the real ID mapping is enough.
    let real = message(peer, 300, SELF_USER);
    t.engine
        .apply_updates(container(vec![new_message_update(1, real, 0)]))
        .unwrap();

    assert!(matches!(t.next_update().await, ClientUpdate::NewMessage(_)));
    assert!(matches!(
        t.next_update().await,
        ClientUpdate::MessagesDeleted { ids, .. } if ids == vec![pending.id]
    ));
    assert!(matches!(t.next_update().await, ClientUpdate::PendingDelivered { .. }));
    assert!(repo.get_pending(pending.id).unwrap().is_none());
    assert!(repo.get_pending_by_real_id(300).unwrap().is_none());
}

#[tokio::test]
async fn test_uncorrelated_message_then_confirmation() {
    let mut t = TestEngine::new();
    let peer = peer();
    let pending = t.engine.send_message(peer, "hi", 0).unwrap();
    let request = t.next_request().await;

    t.engine
        .apply_updates(container(vec![new_message_update(1, message(peer, 400, SELF_USER), 0)]))
        .unwrap();
    assert!(matches!(t.next_update().await, ClientUpdate::NewMessage(_)));
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_some());

    confirm(request, 400, pending.random_id);
    assert!(matches!(
        t.next_update().await,
        ClientUpdate::MessagesDeleted { ids, .. } if ids == vec![pending.id]
    ));
    assert!(matches!(t.next_update().await, ClientUpdate::PendingDelivered { .. }));
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_message_during_slow_confirmation() {
    let repo = Arc::new(FlakyRepo::new());
    let mut t = TestEngine::with_repository(repo.clone(), |b| b);
    let peer = peer();
    let pending = t.engine.send_message(peer, "hi", 0).unwrap();
    let request = t.next_request().await;

    // The confirmation sees no message yet and stalls before recording the real ID.
    *repo.miss_delay.lock().unwrap() = Some(Duration::from_millis(400));
    confirm(request, 200, pending.random_id);
    assert!(eventually(|| repo.is_stalled()).await);
    *repo.miss_delay.lock().unwrap() = None;

    // The update lands inside that window, without a correlation ID.
    t.engine
        .apply_updates(container(vec![new_message_update(1, message(peer, 200, SELF_USER), 0)]))
        .unwrap();

    assert!(matches!(t.next_update().await, ClientUpdate::NewMessage(m) if m.id == 200));
    assert!(matches!(
        t.next_update().await,
        ClientUpdate::MessagesDeleted { ids, .. } if ids == vec![pending.id]
    ));
    assert!(matches!(t.next_update().await, ClientUpdate::PendingDelivered { .. }));
    assert!(repo.get_pending(pending.id).unwrap().is_none());
    assert!(repo.get_pending_by_real_id(200).unwrap().is_none());
}

#[tokio::test]
async fn test_id_update_confirms_like_response() {
    let mut t = TestEngine::new();
    let peer = peer();
    let pending = t.engine.send_message(peer, "hi", 0).unwrap();
    let _request = t.next_request().await;

    let id_update = tessera_proto::wire::UpdateEnvelope {
        kind: kind::UPDATE_MESSAGE_ID,
        update_id: 1,
        payload: tessera_proto::wire::UpdateMessageId {
            random_id: pending.random_id,
            message_id: 500,
        }
        .encode_to_vec(),
        timestamp: 0,
    };
    t.engine.apply_updates(container(vec![id_update])).unwrap();

    let row = t.engine.repository().get_pending(pending.id).unwrap().unwrap();
    assert_eq!(row.real_id, 500);
}

#[tokio::test]
async fn test_failed_send_keeps_row_for_retry() {
    let mut t = TestEngine::new();
    let peer = peer();
    let pending = t.engine.send_message(peer, "flaky", 0).unwrap();

    t.next_request().await.fail(TransportError::Remote("reset".into()));
    match t.next_update().await {
        ClientUpdate::PendingFailed { pending_id, reason } => {
            assert_eq!(pending_id, pending.id);
            assert!(reason.contains("reset"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_some());

    t.engine.retry_pending_message(pending.id).unwrap();
    let request = t.next_request().await;
    assert_eq!(request.envelope.payload, pending.request);
    confirm(request, 610, pending.random_id);

    let repo = t.engine.repository();
    assert!(
        eventually(|| {
            repo.get_pending(pending.id)
                .unwrap()
                .is_some_and(|p| p.real_id == 610)
        })
        .await
    );
}

#[tokio::test]
async fn test_server_rejection_fails_pending() {
    let mut t = TestEngine::new();
    let pending = t.engine.send_message(peer(), "nope", 0).unwrap();

    let error = tessera_proto::wire::ServerError {
        code: "PEER_BLOCKED".into(),
        items: String::new(),
    };
    t.next_request().await.respond(kind::ERROR, error.encode_to_vec());

    assert!(matches!(
        t.next_update().await,
        ClientUpdate::PendingFailed { pending_id, .. } if pending_id == pending.id
    ));
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_some());
}

#[tokio::test]
async fn test_retry_unknown_pending() {
    let t = TestEngine::new();
    assert!(matches!(
        t.engine.retry_pending_message(-9),
        Err(EngineError::UnknownPending(-9))
    ));
}

#[tokio::test]
async fn test_delete_pending_cancels_upload() {
    let uploads = Arc::new(RecordingUploads::default());
    let controller = uploads.clone();
    let t = TestEngine::with_builder(|b| b.with_uploads(controller));
    let file = t.media_dir.path().join("photo.jpg");
    std::fs::write(&file, b"jpeg").unwrap();

    let pending = t
        .engine
        .send_media_message(peer(), &file, MediaCategory::Photo, "look")
        .unwrap();
    assert!(pending.has_file());
    assert_eq!(*uploads.started.lock().unwrap(), vec![pending.file_id]);

    assert!(t.engine.delete_pending_message(pending.id).unwrap());
    assert_eq!(*uploads.cancelled.lock().unwrap(), vec![pending.file_id]);
    assert!(t.engine.repository().get_pending(pending.id).unwrap().is_none());

    assert!(!t.engine.delete_pending_message(pending.id).unwrap());
}

#[tokio::test]
async fn test_failed_media_save_starts_no_upload() {
    let repo = Arc::new(FlakyRepo::new());
    let uploads = Arc::new(RecordingUploads::default());
    let controller = uploads.clone();
    let mut t = TestEngine::with_repository(repo.clone(), |b| b.with_uploads(controller));
    repo.fail_pending_saves.store(true, Ordering::SeqCst);

    let result = t
        .engine
        .send_media_message(peer(), t.media_dir.path().join("photo.jpg"), MediaCategory::Photo, "");

    assert!(matches!(result, Err(EngineError::Storage(_))));
    assert!(uploads.started.lock().unwrap().is_empty());
    assert!(t.server.try_next_request().is_none());
}

#[tokio::test]
async fn test_delivered_media_moves_into_cache() {
    let mut t = TestEngine::new();
    let peer = peer();
    let upload_dir = tempfile::tempdir().unwrap();
    let file = upload_dir.path().join("clip.mp4");
    std::fs::write(&file, b"video").unwrap();

    let pending = t
        .engine
        .send_media_message(peer, &file, MediaCategory::Video, "")
        .unwrap();
    let _request = t.next_request().await;

    let mut real = message(peer, 700, SELF_USER);
    real.media_category = MediaCategory::Video.as_i32();
    t.engine
        .apply_updates(container(vec![new_message_update(1, real, pending.random_id)]))
        .unwrap();

    let cached = t.media_dir.path().join("0_42_1").join("700");
    assert_eq!(std::fs::read(&cached).unwrap(), b"video");
    assert!(!file.exists());
}

#[tokio::test]
async fn test_pending_ids_continue_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.redb");

    {
        let (sender, _server) = tessera_net_sim::channel();
        let engine = tessera_engine::EngineBuilder::new(tessera_engine::StorageConfig::File(path.clone()))
            .build(Arc::new(sender))
            .unwrap();
        engine.send_message(peer(), "one", 0).unwrap();
        engine.send_message(peer(), "two", 0).unwrap();
    }
    // Let the dispatch tasks observe the closed server and release the database.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (sender, _server) = tessera_net_sim::channel();
    let engine = tessera_engine::EngineBuilder::new(tessera_engine::StorageConfig::File(path))
        .build(Arc::new(sender))
        .unwrap();
    let next = engine.send_message(peer(), "three", 0).unwrap();
    assert_eq!(next.id, -3);
}
