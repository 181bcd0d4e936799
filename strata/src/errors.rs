use std::fmt;
use std::io;

/// Strata errors. One variant per failure kind the engine can surface;
/// callers match on the kind, not on message text.
#[derive(Debug)]
pub enum Error {
    /// A negative or otherwise impossible page number was requested.
    InvalidPage(crate::PageNum),
    /// Every frame in the pager is pinned; nothing can be evicted.
    NoFrames,
    /// An index file's size is not a whole multiple of the page size.
    CorruptFile(String),
    /// A key lookup, update or delete found no such key.
    NotFound,
    /// An insert hit an existing key without update semantics.
    Duplicate,
    /// A shared lock cannot be upgraded to exclusive mid-transaction.
    UpgradeForbidden,
    /// Granting the requested lock would close a waits-for cycle.
    Deadlock,
    /// An unlock did not match the mode originally held.
    Mismatch,
    /// The client has no open transaction.
    NoTransaction,
    /// The write-ahead log could not be appended or synced. Fatal.
    LogIo(io::Error),
    /// A redo or undo pass could not repair the database.
    RecoveryFailed(String),
    /// Malformed input: bad command arguments, bad log lines, bad state.
    InvalidInput(String),
    /// Any other I/O failure.
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPage(pn) => write!(f, "invalid pagenum {pn}"),
            Error::NoFrames => write!(f, "no available pages"),
            Error::CorruptFile(what) => write!(f, "corrupt file: {what}"),
            Error::NotFound => write!(f, "not found"),
            Error::Duplicate => write!(f, "duplicate key"),
            Error::UpgradeForbidden => {
                write!(f, "cannot upgrade to write lock in the middle of transaction")
            }
            Error::Deadlock => write!(f, "deadlock detected"),
            Error::Mismatch => write!(f, "incorrect unlock type"),
            Error::NoTransaction => write!(f, "no transactions running"),
            Error::LogIo(err) => write!(f, "log write failed: {err}"),
            Error::RecoveryFailed(msg) => write!(f, "recovery failed: {msg}"),
            Error::InvalidInput(msg) => write!(f, "{msg}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::CorruptFile(err.to_string())
    }
}
