// This file is part of h5cloud.

use anyhow::Context as _;
use thiserror::Error;

/// Crate-wide result alias, mirroring the way the teacher crate exports its
/// own `Result` from the root module.
pub type Result<T> = std::result::Result<T, Error>;

/// The complete set of failure kinds the reader can surface to a caller.
///
/// Every variant carries enough context (dataset path, file offset, or a
/// short description) for a caller to locate the problem without the error
/// message leaking raw byte dumps or credentials.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a valid HDF5 file: {0}")]
    InvalidSignature(String),

    #[error("truncated while {0}")]
    Truncated(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("dataset not found: {0}")]
    NotFound(String),

    #[error("dataset is not chunked: {0}")]
    NotChunked(String),

    #[error("reader is closed")]
    Closed,
}

impl Error {
    pub fn truncated(context: impl Into<String>) -> Self {
        Error::Truncated(context.into())
    }

    pub fn out_of_range(detail: impl Into<String>) -> Self {
        Error::OutOfRange(detail.into())
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::Unsupported(what.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Mirrors the teacher crate's `anyhow::Context` usage (e.g.
/// `io/posix.rs`'s `anyhow!("Error opening {}", uri).context(...)`):
/// attaches a "while doing X" context to a lower-level error before folding
/// it into the crate's typed `Error`.
pub trait ResultExt<T> {
    fn context_err(self, context: impl std::fmt::Display + Send + Sync + 'static) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_err(self, context: impl std::fmt::Display + Send + Sync + 'static) -> Result<T> {
        self.map_err(|e| Error::Transport(anyhow::Error::new(e).context(context).to_string()))
    }
}
