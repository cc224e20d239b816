// Error types
// -----------
// Library modules return `EsaError`; the binary and the `ui` layer wrap it
// with `anyhow` for context.

use std::path::PathBuf;

/// Every failure the sync library can report.
#[derive(Debug, thiserror::Error)]
pub enum EsaError {
    /// Missing or incomplete local configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// A local document could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The file name does not start with `{number}-`.
    #[error("invalid file name '{name}': expected '{{number}}-{{title}}.md'")]
    FilenameFormat { name: String },

    /// The remote article does not exist (HTTP 404).
    #[error("article #{number} not found")]
    NotFound { number: u64 },

    /// The API answered with a non-success status.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Transport(String),

    /// A response or request body could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The remote update committed but the local file was not rewritten.
    #[error(
        "article #{number} was updated remotely but {path:?} could not be rewritten: {source}; \
         run 'esa-cli fetch {number}' to resync"
    )]
    LocalWrite {
        number: u64,
        path: PathBuf,
        source: Box<EsaError>,
    },

    /// The user declined a confirmation prompt.
    #[error("update cancelled")]
    Aborted,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EsaError>;

impl EsaError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the 404 class, which the conflict pre-check tolerates.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { status: 404, .. })
    }
}
