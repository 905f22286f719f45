use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// `create`/`TableConfig::validate` rejected the requested sizes.
    InvalidConfig(String),
    /// The initial virtual memory reservation for the table failed.
    Memory(io::Error),
    /// A lookup or rehash could not claim a payload slot anywhere in the table.
    TableFull,
    /// A probe ran `threshold` re-mixes without finding an empty slot or a match.
    ProbeExhausted,
    /// The rehash sweep could not re-publish every live entry.
    RehashFailed { attempted: usize, failed_at: u64 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid table configuration: {msg}"),
            Error::Memory(e) => write!(f, "memory provider allocation failed: {e}"),
            Error::TableFull => write!(f, "table full: no payload slot available"),
            Error::ProbeExhausted => write!(f, "probe exhausted: directory too congested"),
            Error::RehashFailed { attempted, failed_at } => write!(
                f,
                "rehash failed after {attempted} re-insertions, could not place payload index {failed_at}"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Memory(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Memory(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
