use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the sweep stages.
///
/// Per-record variants (`ValidationRejected`, `ServerFault`) are reported and
/// counted by the executor; they never abort a batch. `TransportFailure` and
/// `Store` abort the stage that hit them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("page {page} timed out after {attempts} attempt(s)")]
    TransportTimeout { page: u32, attempts: u32 },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("action for {steamid} rejected: {detail}")]
    ValidationRejected { steamid: String, detail: String },

    #[error("server fault (status {status}) for {steamid}")]
    ServerFault { steamid: String, status: u16 },

    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecord),

    #[error("store {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Error::TransportFailure(err.to_string())
    }
}

/// Why a single store block was dropped while reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("block has {0} line(s), expected at least 5")]
    TooShort(usize),

    #[error("line {line}: missing `{prefix}` prefix")]
    MissingPrefix { line: usize, prefix: &'static str },

    #[error("line {line}: bad timestamp `{value}`")]
    BadTimestamp { line: usize, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
