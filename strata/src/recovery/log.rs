use std::fmt;

use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::index::IndexType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Insert,
    Update,
    Delete,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditAction::Insert => "INSERT",
            EditAction::Update => "UPDATE",
            EditAction::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Result<EditAction> {
        match s {
            "INSERT" => Ok(EditAction::Insert),
            "UPDATE" => Ok(EditAction::Update),
            "DELETE" => Ok(EditAction::Delete),
            other => Err(Error::InvalidInput(format!("unknown edit action {other}"))),
        }
    }
}

/// One record of the write-ahead log. The on-disk encoding is one
/// space-separated text line per record:
///
/// ```text
/// table <btree|hash> <name>
/// start <uuid>
/// edit <uuid> <table> <INSERT|UPDATE|DELETE> <key> <oldval> <newval>
/// commit <uuid>
/// checkpoint <uuid>[,<uuid>]*
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Table {
        index_type: IndexType,
        name: String,
    },
    Start {
        client_id: Uuid,
    },
    Edit {
        client_id: Uuid,
        table: String,
        action: EditAction,
        key: i64,
        old_value: i64,
        new_value: i64,
    },
    Commit {
        client_id: Uuid,
    },
    Checkpoint {
        active: Vec<Uuid>,
    },
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Table { index_type, name } => write!(f, "table {index_type} {name}"),
            LogRecord::Start { client_id } => write!(f, "start {client_id}"),
            LogRecord::Edit {
                client_id,
                table,
                action,
                key,
                old_value,
                new_value,
            } => write!(
                f,
                "edit {client_id} {table} {} {key} {old_value} {new_value}",
                action.as_str()
            ),
            LogRecord::Commit { client_id } => write!(f, "commit {client_id}"),
            LogRecord::Checkpoint { active } => {
                if active.is_empty() {
                    write!(f, "checkpoint")
                } else {
                    let ids: Vec<String> = active.iter().map(Uuid::to_string).collect();
                    write!(f, "checkpoint {}", ids.join(","))
                }
            }
        }
    }
}

fn bad_record(line: &str) -> Error {
    Error::InvalidInput(format!("malformed log record: {line}"))
}

fn parse_uuid(token: &str, line: &str) -> Result<Uuid> {
    Uuid::parse_str(token).map_err(|_| bad_record(line))
}

fn parse_i64(token: &str, line: &str) -> Result<i64> {
    token.parse::<i64>().map_err(|_| bad_record(line))
}

impl LogRecord {
    /// Parse one log line. The tokenizer is plain whitespace splitting;
    /// table names carry no spaces by construction.
    pub fn parse(line: &str) -> Result<LogRecord> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["table", index_type, name] => Ok(LogRecord::Table {
                index_type: IndexType::parse(index_type)?,
                name: (*name).to_string(),
            }),
            ["start", id] => Ok(LogRecord::Start {
                client_id: parse_uuid(id, line)?,
            }),
            ["edit", id, table, action, key, old_value, new_value] => Ok(LogRecord::Edit {
                client_id: parse_uuid(id, line)?,
                table: (*table).to_string(),
                action: EditAction::parse(action)?,
                key: parse_i64(key, line)?,
                old_value: parse_i64(old_value, line)?,
                new_value: parse_i64(new_value, line)?,
            }),
            ["commit", id] => Ok(LogRecord::Commit {
                client_id: parse_uuid(id, line)?,
            }),
            ["checkpoint"] => Ok(LogRecord::Checkpoint { active: Vec::new() }),
            ["checkpoint", ids] => {
                let mut active = Vec::new();
                for id in ids.split(',') {
                    active.push(parse_uuid(id, line)?);
                }
                Ok(LogRecord::Checkpoint { active })
            }
            _ => Err(bad_record(line)),
        }
    }

    pub fn client_id(&self) -> Option<Uuid> {
        match self {
            LogRecord::Start { client_id }
            | LogRecord::Edit { client_id, .. }
            | LogRecord::Commit { client_id } => Some(*client_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(record: LogRecord) {
        let line = record.to_string();
        assert_eq!(LogRecord::parse(&line).unwrap(), record);
    }

    #[test]
    fn test_record_lines_round_trip() {
        round_trip(LogRecord::Table {
            index_type: IndexType::BTree,
            name: "accounts".to_string(),
        });
        round_trip(LogRecord::Start {
            client_id: Uuid::new_v4(),
        });
        round_trip(LogRecord::Edit {
            client_id: Uuid::new_v4(),
            table: "accounts".to_string(),
            action: EditAction::Update,
            key: -4,
            old_value: 10,
            new_value: -20,
        });
        round_trip(LogRecord::Commit {
            client_id: Uuid::new_v4(),
        });
        round_trip(LogRecord::Checkpoint { active: Vec::new() });
        round_trip(LogRecord::Checkpoint {
            active: vec![Uuid::new_v4(), Uuid::new_v4()],
        });
    }

    #[test]
    fn test_edit_line_format_is_stable() {
        let id = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        let record = LogRecord::Edit {
            client_id: id,
            table: "t".to_string(),
            action: EditAction::Insert,
            key: 5,
            old_value: 0,
            new_value: 55,
        };
        assert_eq!(
            record.to_string(),
            "edit 6ba7b810-9dad-11d1-80b4-00c04fd430c8 t INSERT 5 0 55"
        );
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert!(LogRecord::parse("").is_err());
        assert!(LogRecord::parse("edit nope").is_err());
        assert!(LogRecord::parse("table btree").is_err());
        assert!(LogRecord::parse("start not-a-uuid").is_err());
        assert!(LogRecord::parse("frobnicate 12").is_err());
    }
}
