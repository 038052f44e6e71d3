use poker_room_core::{InvariantError, TableError};
use thiserror::Error;

/// What went wrong while a room handled a request.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The request was refused; only the requester hears about it.
    #[error("{0}")]
    Rejected(String),
    /// The table is corrupt and the room must be closed.
    #[error("fatal table error: {0}")]
    Fatal(#[from] InvariantError),
}

impl From<TableError> for RoomError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::Action(e) => RoomError::Rejected(e.to_string()),
            TableError::Invariant(e) => RoomError::Fatal(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
