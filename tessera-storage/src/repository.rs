//! RedbRepository - all engine state in one redb database
//!
//! Tables:
//! - messages: team|peer|type|id → Message protobuf
//! - media: team|peer|type|category|id → () (category index into messages)
//! - users / groups: id → protobuf
//! - dialogs: team|peer|type → Dialog protobuf
//! - pending: negative id → PendingMessage protobuf
//! - pending_random / pending_real: correlation id / real id → pending id
//! - holes: detector key → JSON bar list
//! - system: name → i64

use crate::error::StorageError;
use crate::keys::{hole_key, media_key, message_key, peer_key, trailing_id};
use crate::{DialogStore, MessageStore, PendingStore, SystemStore};
use prost::Message as _;
use redb::backends::InMemoryBackend;
use redb::{AccessGuard, Database, ReadableTable, TableDefinition};
use tessera_holes::{HoleStore, HoleStoreError};
use tessera_model::{DetectorKey, MediaCategory, MessageId, PeerRef, StorageConfig};
use tessera_proto::storage::{Dialog, Group, Message, PendingMessage, User};

const MESSAGES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");
const MEDIA_TABLE: TableDefinition<&[u8], ()> = TableDefinition::new("media");
const USERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("users");
const GROUPS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("groups");
const DIALOGS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("dialogs");
const PENDING_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("pending");
const PENDING_RANDOM_TABLE: TableDefinition<i64, i64> = TableDefinition::new("pending_random");
const PENDING_REAL_TABLE: TableDefinition<i64, i64> = TableDefinition::new("pending_real");
const HOLES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("holes");
const SYSTEM_TABLE: TableDefinition<&str, i64> = TableDefinition::new("system");

pub struct RedbRepository {
    db: Database,
}

impl RedbRepository {
    /// Open or create the repository.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let db = match config.path() {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    if !dir.as_os_str().is_empty() && !dir.exists() {
                        std::fs::create_dir_all(dir)?;
                    }
                }
                Database::create(path)?
            }
            None => Database::builder().create_with_backend(InMemoryBackend::new())?,
        };

        // Ensure tables exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MESSAGES_TABLE)?;
            let _ = write_txn.open_table(MEDIA_TABLE)?;
            let _ = write_txn.open_table(USERS_TABLE)?;
            let _ = write_txn.open_table(GROUPS_TABLE)?;
            let _ = write_txn.open_table(DIALOGS_TABLE)?;
            let _ = write_txn.open_table(PENDING_TABLE)?;
            let _ = write_txn.open_table(PENDING_RANDOM_TABLE)?;
            let _ = write_txn.open_table(PENDING_REAL_TABLE)?;
            let _ = write_txn.open_table(HOLES_TABLE)?;
            let _ = write_txn.open_table(SYSTEM_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(&StorageConfig::InMemory)
    }

    fn pending_by_index(
        &self,
        index: TableDefinition<i64, i64>,
        key: i64,
    ) -> Result<Option<PendingMessage>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(index)?;
        let Some(id) = index.get(key)?.map(|v| v.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(PENDING_TABLE)?;
        let row = table.get(id)?;
        Ok(row.and_then(|v| decode_logged("pending", v.value())))
    }
}

/// Inclusive id bounds for a history request, treating 0 as unbounded.
fn history_bounds(min: MessageId, max: MessageId) -> (MessageId, MessageId) {
    let lo = if min == 0 { i64::MIN } else { min };
    let hi = if max == 0 { i64::MAX } else { max };
    (lo, hi)
}

fn decode_logged<M: prost::Message + Default>(table: &str, bytes: &[u8]) -> Option<M> {
    match M::decode(bytes) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::error!(table, error = %e, "Dropping malformed record");
            None
        }
    }
}

/// Walk `rows`, keeping up to `limit` values that `f` accepts.
fn take_rows<'a, K, V, T>(
    rows: impl Iterator<Item = Result<(AccessGuard<'a, K>, AccessGuard<'a, V>), redb::StorageError>>,
    limit: usize,
    mut f: impl FnMut(&AccessGuard<'a, K>, &AccessGuard<'a, V>) -> Option<T>,
) -> Result<Vec<T>, StorageError>
where
    K: redb::Value + 'static,
    V: redb::Value + 'static,
{
    let mut out = Vec::new();
    if limit == 0 {
        return Ok(out);
    }
    for row in rows {
        let (key, value) = row?;
        if let Some(item) = f(&key, &value) {
            out.push(item);
            if out.len() >= limit {
                break;
            }
        }
    }
    Ok(out)
}

fn message_row(_key: &AccessGuard<&'static [u8]>, value: &AccessGuard<&'static [u8]>) -> Option<Message> {
    decode_logged("messages", value.value())
}

fn media_row_id(key: &AccessGuard<&'static [u8]>, _value: &AccessGuard<()>) -> Option<MessageId> {
    trailing_id(key.value())
}

impl MessageStore for RedbRepository {
    fn save_messages(&self, messages: &[Message]) -> Result<(), StorageError> {
        if messages.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES_TABLE)?;
            let mut media = write_txn.open_table(MEDIA_TABLE)?;
            for msg in messages {
                let peer = msg.peer();
                let bytes = msg.encode_to_vec();
                table.insert(message_key(peer, msg.id).as_slice(), bytes.as_slice())?;
                let category = msg.category();
                if category != MediaCategory::All {
                    media.insert(media_key(peer, category, msg.id).as_slice(), ())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_message(&self, peer: PeerRef, id: MessageId) -> Result<Option<Message>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;
        let row = table.get(message_key(peer, id).as_slice())?;
        Ok(row.and_then(|v| decode_logged("messages", v.value())))
    }

    fn delete_messages(&self, peer: PeerRef, ids: &[MessageId]) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES_TABLE)?;
            let mut media = write_txn.open_table(MEDIA_TABLE)?;
            for &id in ids {
                let removed = table
                    .remove(message_key(peer, id).as_slice())?
                    .and_then(|v| decode_logged::<Message>("messages", v.value()));
                if let Some(msg) = removed {
                    let category = msg.category();
                    if category != MediaCategory::All {
                        media.remove(media_key(peer, category, id).as_slice())?;
                    }
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn message_history(
        &self,
        peer: PeerRef,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<Vec<Message>, StorageError> {
        let (lo, hi) = history_bounds(min, max);
        if lo > hi {
            return Ok(Vec::new());
        }
        let limit = usize::try_from(limit).unwrap_or(0);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;
        let (lo_key, hi_key) = (message_key(peer, lo), message_key(peer, hi));
        let range = table.range(lo_key.as_slice()..=hi_key.as_slice())?;
        let mut page = if min != 0 && max == 0 {
            take_rows(range, limit, message_row)?
        } else {
            take_rows(range.rev(), limit, message_row)?
        };
        page.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page)
    }

    fn media_history(
        &self,
        peer: PeerRef,
        category: MediaCategory,
        min: MessageId,
        max: MessageId,
        limit: i32,
    ) -> Result<Vec<Message>, StorageError> {
        if category == MediaCategory::All {
            return self.message_history(peer, min, max, limit);
        }
        let (lo, hi) = history_bounds(min, max);
        if lo > hi {
            return Ok(Vec::new());
        }
        let limit = usize::try_from(limit).unwrap_or(0);

        let read_txn = self.db.begin_read()?;
        let media = read_txn.open_table(MEDIA_TABLE)?;
        let (lo_key, hi_key) = (media_key(peer, category, lo), media_key(peer, category, hi));
        let range = media.range(lo_key.as_slice()..=hi_key.as_slice())?;
        let ids = if min != 0 && max == 0 {
            take_rows(range, limit, media_row_id)?
        } else {
            take_rows(range.rev(), limit, media_row_id)?
        };

        let table = read_txn.open_table(MESSAGES_TABLE)?;
        let mut page = Vec::with_capacity(ids.len());
        for id in ids {
            let row = table.get(message_key(peer, id).as_slice())?;
            if let Some(msg) = row.and_then(|v| decode_logged::<Message>("messages", v.value())) {
                page.push(msg);
            }
        }
        page.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page)
    }

    fn save_users(&self, users: &[User]) -> Result<(), StorageError> {
        if users.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS_TABLE)?;
            for user in users {
                table.insert(user.id, user.encode_to_vec().as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;
        let row = table.get(id)?;
        Ok(row.and_then(|v| decode_logged("users", v.value())))
    }

    fn save_groups(&self, groups: &[Group]) -> Result<(), StorageError> {
        if groups.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(GROUPS_TABLE)?;
            for group in groups {
                table.insert(group.id, group.encode_to_vec().as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_group(&self, id: i64) -> Result<Option<Group>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GROUPS_TABLE)?;
        let row = table.get(id)?;
        Ok(row.and_then(|v| decode_logged("groups", v.value())))
    }
}

impl DialogStore for RedbRepository {
    fn dialog(&self, peer: PeerRef) -> Result<Option<Dialog>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DIALOGS_TABLE)?;
        let row = table.get(peer_key(peer).as_slice())?;
        Ok(row.and_then(|v| decode_logged("dialogs", v.value())))
    }

    fn save_dialog(&self, dialog: &Dialog) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DIALOGS_TABLE)?;
            let bytes = dialog.encode_to_vec();
            table.insert(peer_key(dialog.peer()).as_slice(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_dialogs(&self) -> Result<Vec<Dialog>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DIALOGS_TABLE)?;

        let mut dialogs = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            if let Some(dialog) = decode_logged("dialogs", value.value()) {
                dialogs.push(dialog);
            }
        }
        Ok(dialogs)
    }
}

impl PendingStore for RedbRepository {
    fn save_pending(&self, pending: &PendingMessage) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PENDING_TABLE)?;
            table.insert(pending.id, pending.encode_to_vec().as_slice())?;
            let mut by_random = write_txn.open_table(PENDING_RANDOM_TABLE)?;
            by_random.insert(pending.random_id, pending.id)?;
            if pending.real_id != 0 {
                let mut by_real = write_txn.open_table(PENDING_REAL_TABLE)?;
                by_real.insert(pending.real_id, pending.id)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_pending(&self, id: MessageId) -> Result<Option<PendingMessage>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;
        let row = table.get(id)?;
        Ok(row.and_then(|v| decode_logged("pending", v.value())))
    }

    fn get_pending_by_random_id(&self, random_id: i64) -> Result<Option<PendingMessage>, StorageError> {
        self.pending_by_index(PENDING_RANDOM_TABLE, random_id)
    }

    fn get_pending_by_real_id(&self, real_id: MessageId) -> Result<Option<PendingMessage>, StorageError> {
        self.pending_by_index(PENDING_REAL_TABLE, real_id)
    }

    fn save_pending_real_id(
        &self,
        random_id: i64,
        real_id: MessageId,
    ) -> Result<Option<PendingMessage>, StorageError> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let by_random = write_txn.open_table(PENDING_RANDOM_TABLE)?;
            let id = by_random.get(random_id)?.map(|v| v.value());
            let mut table = write_txn.open_table(PENDING_TABLE)?;
            let current = match id {
                Some(id) => table
                    .get(id)?
                    .and_then(|v| decode_logged::<PendingMessage>("pending", v.value())),
                None => None,
            };
            match current {
                Some(mut pending) => {
                    pending.real_id = real_id;
                    table.insert(pending.id, pending.encode_to_vec().as_slice())?;
                    let mut by_real = write_txn.open_table(PENDING_REAL_TABLE)?;
                    by_real.insert(real_id, pending.id)?;
                    Some(pending)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    fn delete_pending(&self, id: MessageId) -> Result<Option<PendingMessage>, StorageError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(PENDING_TABLE)?;
            let removed = table
                .remove(id)?
                .and_then(|v| decode_logged::<PendingMessage>("pending", v.value()));
            if let Some(pending) = &removed {
                let mut by_random = write_txn.open_table(PENDING_RANDOM_TABLE)?;
                let points_here = by_random.get(pending.random_id)?.map(|v| v.value()) == Some(id);
                if points_here {
                    by_random.remove(pending.random_id)?;
                }
                if pending.real_id != 0 {
                    let mut by_real = write_txn.open_table(PENDING_REAL_TABLE)?;
                    let points_here = by_real.get(pending.real_id)?.map(|v| v.value()) == Some(id);
                    if points_here {
                        by_real.remove(pending.real_id)?;
                    }
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn pending_by_peer(&self, peer: PeerRef) -> Result<Vec<PendingMessage>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;

        let mut rows = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            if let Some(pending) = decode_logged::<PendingMessage>("pending", value.value()) {
                if pending.peer() == peer {
                    rows.push(pending);
                }
            }
        }
        Ok(rows)
    }

    fn lowest_pending_id(&self) -> Result<MessageId, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;
        let lowest = match table.iter()?.next() {
            Some(row) => row?.0.value(),
            None => 0,
        };
        Ok(lowest.min(0))
    }
}

impl SystemStore for RedbRepository {
    fn system_int(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYSTEM_TABLE)?;
        Ok(table.get(key)?.map(|v| v.value()))
    }

    fn set_system_int(&self, key: &str, value: i64) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SYSTEM_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl HoleStore for RedbRepository {
    fn load_holes(&self, key: &DetectorKey) -> Result<Vec<u8>, HoleStoreError> {
        let load = || -> Result<Vec<u8>, StorageError> {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(HOLES_TABLE)?;
            let row = table.get(hole_key(key).as_str())?;
            Ok(row.map(|v| v.value().to_vec()).unwrap_or_default())
        };
        Ok(load()?)
    }

    fn save_holes(&self, key: &DetectorKey, bars: &[u8]) -> Result<(), HoleStoreError> {
        let save = || -> Result<(), StorageError> {
            let write_txn = self.db.begin_write()?;
            {
                let mut table = write_txn.open_table(HOLES_TABLE)?;
                table.insert(hole_key(key).as_str(), bars)?;
            }
            write_txn.commit()?;
            Ok(())
        };
        Ok(save()?)
    }
}
