//! REPL command sets: table operations, transactions, and recovery.
//!
//! Every write follows the same shape: acquire the record lock, look up the
//! old value, append the edit record, then mutate the index. The edit
//! record always reaches the log before the pages change.

use std::sync::Arc;

use strata::concurrency::{LockType, TransactionManager};
use strata::database::Database;
use strata::recovery::{EditAction, RecoveryManager};
use strata::{Error, IndexType, Result};
use uuid::Uuid;

use crate::query;
use crate::repl::{Handler, Repl, ReplContext};

/// The shared state behind every command handler. `tm` is present in the
/// transactional modes, `rm` only in recovery mode.
pub struct Engine {
    pub db: Arc<Database>,
    pub tm: Option<Arc<TransactionManager>>,
    pub rm: Option<Arc<RecoveryManager>>,
}

impl Engine {
    /// Transactional modes start a transaction implicitly on a client's
    /// first locked operation.
    fn ensure_transaction(&self, client_id: Uuid) -> Result<()> {
        if let Some(tm) = &self.tm {
            if !tm.has_transaction(client_id) {
                tm.begin(client_id)?;
                if let Some(rm) = &self.rm {
                    rm.start(client_id)?;
                }
            }
        }
        Ok(())
    }

    fn lock_record(&self, client_id: Uuid, table: &str, key: i64, mode: LockType) -> Result<()> {
        if let Some(tm) = &self.tm {
            self.ensure_transaction(client_id)?;
            tm.lock(client_id, table, key, mode)?;
        }
        Ok(())
    }

    fn log_edit(
        &self,
        client_id: Uuid,
        table: &str,
        action: EditAction,
        key: i64,
        old_value: i64,
        new_value: i64,
    ) -> Result<()> {
        if let Some(rm) = &self.rm {
            rm.edit(client_id, table, action, key, old_value, new_value)?;
        }
        Ok(())
    }

    /// Abort the session's transaction after a deadlock: roll back through
    /// the recovery manager when present, otherwise just release the locks.
    pub fn abort_session(&self, client_id: Uuid) {
        match (&self.rm, &self.tm) {
            (Some(rm), _) => {
                let _ = rm.rollback(client_id);
            }
            (None, Some(tm)) => {
                let _ = tm.commit(client_id);
            }
            _ => {}
        }
    }

    /// Commit-and-forget for a session that disconnected mid-transaction.
    pub fn finish_session(&self, client_id: Uuid) {
        if let Some(tm) = &self.tm {
            if tm.has_transaction(client_id) {
                if let Some(rm) = &self.rm {
                    let _ = rm.commit(client_id);
                }
                let _ = tm.commit(client_id);
            }
        }
    }
}

fn parse_i64(token: &str) -> Result<i64> {
    token
        .parse::<i64>()
        .map_err(|_| Error::InvalidInput(format!("expected an integer, got {token}")))
}

fn usage(message: &str) -> Error {
    Error::InvalidInput(message.to_string())
}

fn handler<F>(f: F) -> Handler
where
    F: Fn(&[&str], &ReplContext) -> Result<String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The table command set, loaded in every mode.
pub fn database_repl(engine: Arc<Engine>) -> Repl {
    let mut repl = Repl::new();

    let e = engine.clone();
    repl.add_command(
        "create",
        "create <btree|hash> table <name>: create a table",
        handler(move |tokens, _ctx| {
            let (kind, name) = match tokens {
                ["create", kind, "table", name] => (*kind, *name),
                _ => return Err(usage("usage: create <btree|hash> table <name>")),
            };
            let index_type = IndexType::parse(kind)?;
            e.db.create_table(index_type, name)?;
            if let Some(rm) = &e.rm {
                rm.table(index_type, name)?;
            }
            Ok(format!("created table {name}"))
        }),
    );

    let e = engine.clone();
    repl.add_command(
        "find",
        "find <table> <key>: find an entry",
        handler(move |tokens, ctx| {
            let (name, key) = match tokens {
                ["find", name, key] => (*name, parse_i64(key)?),
                _ => return Err(usage("usage: find <table> <key>")),
            };
            let table = e.db.get_table(name)?;
            e.lock_record(ctx.client_id, name, key, LockType::Shared)?;
            Ok(table.find(key)?.to_string())
        }),
    );

    let e = engine.clone();
    repl.add_command(
        "insert",
        "insert <key> <value> into <table>: insert an entry",
        handler(move |tokens, ctx| {
            let (key, value, name) = match tokens {
                ["insert", key, value, "into", name] => {
                    (parse_i64(key)?, parse_i64(value)?, *name)
                }
                _ => return Err(usage("usage: insert <key> <value> into <table>")),
            };
            let table = e.db.get_table(name)?;
            e.lock_record(ctx.client_id, name, key, LockType::Exclusive)?;
            if table.find(key).is_ok() {
                return Err(Error::Duplicate);
            }
            e.log_edit(ctx.client_id, name, EditAction::Insert, key, 0, value)?;
            table.insert(key, value, false)?;
            Ok("ok".to_string())
        }),
    );

    let e = engine.clone();
    repl.add_command(
        "update",
        "update <table> <key> <value>: update an entry",
        handler(move |tokens, ctx| {
            let (name, key, value) = match tokens {
                ["update", name, key, value] => (*name, parse_i64(key)?, parse_i64(value)?),
                _ => return Err(usage("usage: update <table> <key> <value>")),
            };
            let table = e.db.get_table(name)?;
            e.lock_record(ctx.client_id, name, key, LockType::Exclusive)?;
            let old_value = table.find(key)?.value;
            e.log_edit(ctx.client_id, name, EditAction::Update, key, old_value, value)?;
            table.update(key, value)?;
            Ok("ok".to_string())
        }),
    );

    let e = engine.clone();
    repl.add_command(
        "delete",
        "delete <key> from <table>: delete an entry",
        handler(move |tokens, ctx| {
            let (key, name) = match tokens {
                ["delete", key, "from", name] => (parse_i64(key)?, *name),
                _ => return Err(usage("usage: delete <key> from <table>")),
            };
            let table = e.db.get_table(name)?;
            e.lock_record(ctx.client_id, name, key, LockType::Exclusive)?;
            let old_value = table.find(key)?.value;
            e.log_edit(ctx.client_id, name, EditAction::Delete, key, old_value, 0)?;
            table.delete(key)?;
            Ok("ok".to_string())
        }),
    );

    let e = engine.clone();
    repl.add_command(
        "select",
        "select from <table>: list every entry",
        handler(move |tokens, _ctx| {
            let name = match tokens {
                ["select", "from", name] => *name,
                _ => return Err(usage("usage: select from <table>")),
            };
            let entries = e.db.get_table(name)?.select()?;
            let formatted: Vec<String> = entries.iter().map(|entry| entry.to_string()).collect();
            Ok(format!("[{}]", formatted.join(", ")))
        }),
    );

    let e = engine;
    repl.add_command(
        "print",
        "print <table>: pretty-print a table",
        handler(move |tokens, _ctx| {
            let name = match tokens {
                ["print", name] => *name,
                _ => return Err(usage("usage: print <table>")),
            };
            let mut out = Vec::new();
            e.db.get_table(name)?.print(&mut out)?;
            Ok(String::from_utf8_lossy(&out).trim_end().to_string())
        }),
    );

    repl
}

/// Transaction commands, loaded in the concurrency and recovery modes.
pub fn transaction_repl(engine: Arc<Engine>) -> Repl {
    let mut repl = Repl::new();

    let e = engine.clone();
    repl.add_command(
        "transaction",
        "transaction <begin|commit>: open or close a transaction",
        handler(move |tokens, ctx| {
            let tm = e.tm.as_ref().ok_or(Error::NoTransaction)?;
            match tokens {
                ["transaction", "begin"] => {
                    tm.begin(ctx.client_id)?;
                    if let Some(rm) = &e.rm {
                        rm.start(ctx.client_id)?;
                    }
                    Ok("ok".to_string())
                }
                ["transaction", "commit"] => {
                    if let Some(rm) = &e.rm {
                        rm.commit(ctx.client_id)?;
                    }
                    tm.commit(ctx.client_id)?;
                    Ok("ok".to_string())
                }
                _ => Err(usage("usage: transaction <begin|commit>")),
            }
        }),
    );

    let e = engine;
    repl.add_command(
        "lock",
        "lock <table> <key> <r|w>: acquire a record lock",
        handler(move |tokens, ctx| {
            let (name, key, mode) = match tokens {
                ["lock", name, key, mode] => (*name, parse_i64(key)?, *mode),
                _ => return Err(usage("usage: lock <table> <key> <r|w>")),
            };
            let mode = match mode {
                "r" => LockType::Shared,
                "w" => LockType::Exclusive,
                _ => return Err(usage("lock mode must be r or w")),
            };
            e.db.get_table(name)?;
            e.lock_record(ctx.client_id, name, key, mode)?;
            Ok("ok".to_string())
        }),
    );

    repl
}

/// Checkpoint and abort, loaded in recovery mode only.
pub fn recovery_repl(engine: Arc<Engine>) -> Repl {
    let mut repl = Repl::new();

    let e = engine.clone();
    repl.add_command(
        "checkpoint",
        "checkpoint: flush, log a checkpoint and shadow-copy the database",
        handler(move |tokens, _ctx| {
            match tokens {
                ["checkpoint"] => {}
                _ => return Err(usage("usage: checkpoint")),
            }
            let rm = e.rm.as_ref().ok_or(Error::NoTransaction)?;
            rm.checkpoint()?;
            Ok("ok".to_string())
        }),
    );

    let e = engine;
    repl.add_command(
        "abort",
        "abort: roll back the current transaction",
        handler(move |tokens, ctx| {
            match tokens {
                ["abort"] => {}
                _ => return Err(usage("usage: abort")),
            }
            let rm = e.rm.as_ref().ok_or(Error::NoTransaction)?;
            rm.rollback(ctx.client_id)?;
            Ok("ok".to_string())
        }),
    );

    repl
}

/// The join operator, loaded in query mode.
pub fn query_repl(engine: Arc<Engine>) -> Repl {
    let mut repl = Repl::new();

    let e = engine;
    repl.add_command(
        "join",
        "join <table1> <key|value> on <table2> <key|value>: grace hash join",
        handler(move |tokens, _ctx| {
            let (left_name, left_col, right_name, right_col) = match tokens {
                ["join", left, left_col, "on", right, right_col] => {
                    (*left, *left_col, *right, *right_col)
                }
                _ => {
                    return Err(usage(
                        "usage: join <table1> <key|value> on <table2> <key|value>",
                    ))
                }
            };
            let on_left_key = parse_join_column(left_col)?;
            let on_right_key = parse_join_column(right_col)?;
            let left = e.db.get_table(left_name)?;
            let right = e.db.get_table(right_name)?;
            let pairs = query::join(&left, &right, on_left_key, on_right_key)?;
            let lines: Vec<String> = pairs
                .iter()
                .map(|p| format!("{} {}", p.left, p.right))
                .collect();
            Ok(lines.join("\n"))
        }),
    );

    repl
}

fn parse_join_column(token: &str) -> Result<bool> {
    match token {
        "key" => Ok(true),
        "value" => Ok(false),
        _ => Err(usage("join column must be key or value")),
    }
}
