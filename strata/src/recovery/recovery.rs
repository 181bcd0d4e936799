use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::concurrency::TransactionManager;
use crate::database::Database;
use crate::errors::{Error, Result};
use crate::index::IndexType;
use crate::recovery::log::{EditAction, LogRecord};

/// Name of the write-ahead log inside the database directory. The shadow
/// copy excludes it, and prime preserves it when restoring.
pub const LOG_FILE_NAME: &str = "strata.log";

pub fn log_path<P: AsRef<Path>>(base: P) -> PathBuf {
    base.as_ref().join(LOG_FILE_NAME)
}

fn shadow_path(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{name}-recovery"))
}

struct RmState {
    fd: File,
    /// Per-client records not yet committed, in append order.
    tx_stack: HashMap<Uuid, Vec<LogRecord>>,
}

/// Appends log records ahead of every mutation, checkpoints with a shadow
/// copy of the database directory, and replays/undoes the log on startup.
pub struct RecoveryManager {
    db: Arc<Database>,
    tm: Arc<TransactionManager>,
    log_path: PathBuf,
    state: Mutex<RmState>,
}

impl RecoveryManager {
    pub fn new(
        db: Arc<Database>,
        tm: Arc<TransactionManager>,
        log_path: PathBuf,
    ) -> Result<RecoveryManager> {
        let fd = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&log_path)
            .map_err(Error::LogIo)?;
        Ok(RecoveryManager {
            db,
            tm,
            log_path,
            state: Mutex::new(RmState {
                fd,
                tx_stack: HashMap::new(),
            }),
        })
    }

    /// Append one record and fsync. The log is the durability boundary;
    /// a failure here is fatal to the caller.
    fn append(state: &mut RmState, record: &LogRecord) -> Result<()> {
        writeln!(state.fd, "{record}").map_err(Error::LogIo)?;
        state.fd.sync_all().map_err(Error::LogIo)?;
        Ok(())
    }

    /// Log the creation of a table.
    pub fn table(&self, index_type: IndexType, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::append(
            &mut state,
            &LogRecord::Table {
                index_type,
                name: name.to_string(),
            },
        )
    }

    /// Log the start of a transaction.
    pub fn start(&self, client_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        let record = LogRecord::Start { client_id };
        Self::append(&mut state, &record)?;
        state.tx_stack.insert(client_id, vec![record]);
        Ok(())
    }

    /// Log one edit. Must be called before the index is mutated.
    pub fn edit(
        &self,
        client_id: Uuid,
        table: &str,
        action: EditAction,
        key: i64,
        old_value: i64,
        new_value: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let record = LogRecord::Edit {
            client_id,
            table: table.to_string(),
            action,
            key,
            old_value,
            new_value,
        };
        Self::append(&mut state, &record)?;
        state.tx_stack.entry(client_id).or_default().push(record);
        Ok(())
    }

    /// Log a transaction commit and forget its stack.
    pub fn commit(&self, client_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        Self::append(&mut state, &LogRecord::Commit { client_id })?;
        state.tx_stack.remove(&client_id);
        Ok(())
    }

    /// Flush every table under its update gate, append a checkpoint record
    /// naming the active transactions, and shadow-copy the database. The
    /// copy happens after the flush and before the gates reopen.
    pub fn checkpoint(&self) -> Result<()> {
        let mut state = self.state.lock();
        let active: Vec<Uuid> = state.tx_stack.keys().copied().collect();
        let tables = self.db.get_tables();

        let quiesced: Vec<_> = tables.iter().map(|t| t.quiesce()).collect();
        for table in &tables {
            table.pager().lock_all_updates();
        }
        let result = (|| {
            for table in &tables {
                table.pager().flush_all_pages()?;
                self.db.write_table_meta(table)?;
            }
            Self::append(&mut state, &LogRecord::Checkpoint { active })?;
            self.delta()
        })();
        for table in &tables {
            table.pager().unlock_all_updates();
        }
        drop(quiesced);
        result
    }

    /// Copy the database directory to `<base>-recovery/`, leaving the log
    /// file itself out of the copy.
    fn delta(&self) -> Result<()> {
        let base = self.db.base_path();
        let shadow = shadow_path(base);
        if shadow.exists() {
            std::fs::remove_dir_all(&shadow)?;
        }
        std::fs::create_dir_all(&shadow)?;
        for dir_entry in std::fs::read_dir(base)? {
            let path = dir_entry?.path();
            if !path.is_file() || path.file_name().is_some_and(|n| n == LOG_FILE_NAME) {
                continue;
            }
            if let Some(file_name) = path.file_name() {
                std::fs::copy(&path, shadow.join(file_name))?;
            }
        }
        Ok(())
    }

    /// Restore the database directory from its shadow copy, then open it.
    /// The live write-ahead log survives the restore untouched.
    pub fn prime<P: AsRef<Path>>(base: P) -> Result<Database> {
        let base = base.as_ref();
        let shadow = shadow_path(base);
        if !base.exists() {
            std::fs::create_dir_all(&shadow)?;
            return Database::open(base);
        }
        if !shadow.exists() {
            return Database::open(base);
        }
        for dir_entry in std::fs::read_dir(base)? {
            let path = dir_entry?.path();
            if path.file_name().is_some_and(|n| n == LOG_FILE_NAME) {
                continue;
            }
            if path.is_file() {
                std::fs::remove_file(&path)?;
            }
        }
        for dir_entry in std::fs::read_dir(&shadow)? {
            let path = dir_entry?.path();
            if let Some(file_name) = path.file_name() {
                std::fs::copy(&path, base.join(file_name))?;
            }
        }
        Database::open(base)
    }

    /// Replay the log from the last checkpoint: redo every table and edit
    /// record, then undo the transactions that never committed. Undone
    /// transactions end with a commit record, so running recovery twice is
    /// the same as running it once.
    pub fn recover(&self) -> Result<()> {
        let text = std::fs::read_to_string(&self.log_path).map_err(Error::LogIo)?;
        let mut records = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(LogRecord::parse(line)?);
        }

        let checkpoint_pos = records
            .iter()
            .rposition(|r| matches!(r, LogRecord::Checkpoint { .. }));
        let mut active: HashSet<Uuid> = match checkpoint_pos {
            Some(pos) => match &records[pos] {
                LogRecord::Checkpoint { active } => active.iter().copied().collect(),
                _ => HashSet::new(),
            },
            None => HashSet::new(),
        };
        let replay_from = checkpoint_pos.map(|pos| pos + 1).unwrap_or(0);
        for record in &records[replay_from..] {
            match record {
                LogRecord::Start { client_id } => {
                    active.insert(*client_id);
                }
                LogRecord::Commit { client_id } => {
                    active.remove(client_id);
                }
                _ => {}
            }
        }
        for &client_id in &active {
            self.tm.begin(client_id)?;
        }

        crate::strata_debug_log!(
            "[recover] replaying {} records, {} active transactions",
            records.len() - replay_from,
            active.len()
        );
        for record in &records[replay_from..] {
            match record {
                LogRecord::Table { index_type, name } => {
                    if self.db.get_table(name).is_err() {
                        self.db.create_table(*index_type, name)?;
                    }
                }
                LogRecord::Edit { .. } => self.redo(record)?,
                _ => {}
            }
        }

        if !active.is_empty() {
            for position in (0..records.len()).rev() {
                let record = records[position].clone();
                match &record {
                    LogRecord::Edit { client_id, .. } if active.contains(client_id) => {
                        self.undo(&record)?;
                    }
                    LogRecord::Start { client_id } if active.contains(client_id) => {
                        self.commit(*client_id)?;
                        self.tm.commit(*client_id)?;
                        active.remove(client_id);
                        if active.is_empty() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Re-apply one edit through the index's public mutators, repairing on
    /// a miss: an insert that finds the key falls back to update, an update
    /// that misses falls back to insert, a delete of a missing key is fine.
    fn redo(&self, record: &LogRecord) -> Result<()> {
        let (table, action, key, new_value) = match record {
            LogRecord::Edit {
                table,
                action,
                key,
                new_value,
                ..
            } => (table, *action, *key, *new_value),
            _ => {
                return Err(Error::RecoveryFailed(
                    "can only redo edit records".to_string(),
                ))
            }
        };
        let index = self
            .db
            .get_table(table)
            .map_err(|err| Error::RecoveryFailed(err.to_string()))?;
        let applied = match action {
            EditAction::Insert => match index.insert(key, new_value, false) {
                Err(Error::Duplicate) => index.update(key, new_value),
                other => other,
            },
            EditAction::Update => match index.update(key, new_value) {
                Err(Error::NotFound) => index.insert(key, new_value, false),
                other => other,
            },
            EditAction::Delete => match index.delete(key) {
                Err(Error::NotFound) => Ok(()),
                other => other,
            },
        };
        applied.map_err(|err| Error::RecoveryFailed(format!("redo {record}: {err}")))
    }

    /// Apply the inverse of one edit. The compensating edit is logged
    /// first, so the undo itself is crash-safe, and the application repairs
    /// on a miss just like redo.
    fn undo(&self, record: &LogRecord) -> Result<()> {
        let (client_id, table, action, key, old_value, new_value) = match record {
            LogRecord::Edit {
                client_id,
                table,
                action,
                key,
                old_value,
                new_value,
            } => (*client_id, table, *action, *key, *old_value, *new_value),
            _ => {
                return Err(Error::RecoveryFailed(
                    "can only undo edit records".to_string(),
                ))
            }
        };
        let index = self
            .db
            .get_table(table)
            .map_err(|err| Error::RecoveryFailed(err.to_string()))?;
        let applied = match action {
            EditAction::Insert => {
                self.edit(client_id, table, EditAction::Delete, key, new_value, 0)?;
                match index.delete(key) {
                    Err(Error::NotFound) => Ok(()),
                    other => other,
                }
            }
            EditAction::Update => {
                self.edit(
                    client_id,
                    table,
                    EditAction::Update,
                    key,
                    new_value,
                    old_value,
                )?;
                match index.update(key, old_value) {
                    Err(Error::NotFound) => index.insert(key, old_value, false),
                    other => other,
                }
            }
            EditAction::Delete => {
                self.edit(client_id, table, EditAction::Insert, key, 0, old_value)?;
                match index.insert(key, old_value, false) {
                    Err(Error::Duplicate) => index.update(key, old_value),
                    other => other,
                }
            }
        };
        applied.map_err(|err| Error::RecoveryFailed(format!("undo {record}: {err}")))
    }

    /// Roll back a live transaction: undo its logged edits newest-first,
    /// write a commit record, and release it in the transaction manager.
    pub fn rollback(&self, client_id: Uuid) -> Result<()> {
        let stack = self
            .state
            .lock()
            .tx_stack
            .get(&client_id)
            .cloned()
            .ok_or(Error::NoTransaction)?;
        for record in stack.iter().rev() {
            if matches!(record, LogRecord::Edit { .. }) {
                self.undo(record)?;
            }
        }
        self.commit(client_id)?;
        self.tm.commit(client_id)?;
        Ok(())
    }

    /// Active transactions as the log sees them; checkpoint reports these.
    pub fn active_transactions(&self) -> Vec<Uuid> {
        self.state.lock().tx_stack.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::LockManager;
    use tempfile::tempdir;

    struct Harness {
        db: Arc<Database>,
        tm: Arc<TransactionManager>,
        rm: RecoveryManager,
    }

    fn harness(base: &Path) -> Harness {
        let db = Arc::new(Database::open(base).unwrap());
        db.create_log_file(log_path(base)).unwrap();
        let tm = Arc::new(TransactionManager::new(Arc::new(LockManager::new())));
        let rm = RecoveryManager::new(db.clone(), tm.clone(), log_path(base)).unwrap();
        Harness { db, tm, rm }
    }

    #[test]
    fn test_rollback_undoes_a_live_transaction() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("data");
        let h = harness(&base);

        let client = Uuid::new_v4();
        h.tm.begin(client).unwrap();
        h.rm.start(client).unwrap();
        let table = h.db.create_table(IndexType::BTree, "t").unwrap();
        h.rm.table(IndexType::BTree, "t").unwrap();

        h.rm.edit(client, "t", EditAction::Insert, 5, 0, 55).unwrap();
        table.insert(5, 55, false).unwrap();
        h.rm.edit(client, "t", EditAction::Update, 5, 55, 56).unwrap();
        table.update(5, 56).unwrap();

        h.rm.rollback(client).unwrap();
        assert!(table.find(5).is_err());
        assert!(!h.tm.has_transaction(client));
        assert!(matches!(
            h.rm.rollback(client),
            Err(Error::NoTransaction)
        ));
    }

    #[test]
    fn test_recover_redoes_committed_and_undoes_active() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("data");
        let (committed, dangling) = (Uuid::new_v4(), Uuid::new_v4());
        {
            // Write a log whose page effects never reached the index files,
            // as if the process died before any flush.
            let h = harness(&base);
            h.rm.table(IndexType::BTree, "t").unwrap();
            h.rm.start(committed).unwrap();
            h.rm.edit(committed, "t", EditAction::Insert, 7, 0, 77)
                .unwrap();
            h.rm.commit(committed).unwrap();
            h.rm.start(dangling).unwrap();
            h.rm.edit(dangling, "t", EditAction::Insert, 5, 0, 55)
                .unwrap();
        }

        let h = harness(&base);
        h.rm.recover().unwrap();
        let table = h.db.get_table("t").unwrap();
        assert_eq!(table.find(7).unwrap().value, 77);
        assert!(table.find(5).is_err());
        // The undone transaction was committed away; nothing is left open.
        assert!(!h.tm.has_transaction(dangling));

        // Recovery is idempotent: a second pass changes nothing.
        let h2 = harness(&base);
        h2.rm.recover().unwrap();
        let table = h2.db.get_table("t").unwrap();
        assert_eq!(table.find(7).unwrap().value, 77);
        assert!(table.find(5).is_err());
    }

    #[test]
    fn test_recover_applies_repair_on_miss() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("data");
        {
            let h = harness(&base);
            let table = h.db.create_table(IndexType::Hash, "t").unwrap();
            h.rm.table(IndexType::Hash, "t").unwrap();
            let client = Uuid::new_v4();
            h.rm.start(client).unwrap();
            // The insert reached both the log and the table, and the pages
            // got flushed; redo will find the key already present.
            h.rm.edit(client, "t", EditAction::Insert, 1, 0, 10).unwrap();
            table.insert(1, 10, false).unwrap();
            h.rm.commit(client).unwrap();
            h.db.close().unwrap();
        }
        let h = harness(&base);
        h.rm.recover().unwrap();
        assert_eq!(h.db.get_table("t").unwrap().find(1).unwrap().value, 10);
    }

    #[test]
    fn test_checkpoint_shadow_restores_lost_files() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("data");
        {
            let h = harness(&base);
            let table = h.db.create_table(IndexType::BTree, "t").unwrap();
            h.rm.table(IndexType::BTree, "t").unwrap();
            let client = Uuid::new_v4();
            h.rm.start(client).unwrap();
            h.rm.edit(client, "t", EditAction::Insert, 9, 0, 99).unwrap();
            table.insert(9, 99, false).unwrap();
            h.rm.commit(client).unwrap();
            h.rm.checkpoint().unwrap();
            h.db.close().unwrap();
        }
        // Corrupt the live directory: delete the table files, keep the log.
        std::fs::remove_file(base.join("t.btree")).unwrap();
        std::fs::remove_file(base.join("t.meta")).unwrap();

        let db = Arc::new(RecoveryManager::prime(&base).unwrap());
        let tm = Arc::new(TransactionManager::new(Arc::new(LockManager::new())));
        let rm = RecoveryManager::new(db.clone(), tm, log_path(&base)).unwrap();
        rm.recover().unwrap();
        assert_eq!(db.get_table("t").unwrap().find(9).unwrap().value, 99);
    }

    #[test]
    fn test_checkpoint_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("data");
        let h = harness(&base);
        let table = h.db.create_table(IndexType::Hash, "t").unwrap();
        h.rm.table(IndexType::Hash, "t").unwrap();
        table.insert(3, 33, false).unwrap();

        h.rm.checkpoint().unwrap();
        let shadow = shadow_path(&base);
        let first: Vec<_> = std::fs::read_dir(&shadow)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        h.rm.checkpoint().unwrap();
        let second: Vec<_> = std::fs::read_dir(&shadow)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(first.len(), second.len());
        assert!(!shadow.join(LOG_FILE_NAME).exists());
    }
}
