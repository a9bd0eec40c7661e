use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type covering the different failure cases that can occur while
/// fetching, planning, or applying a reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level HTTP failures (connection refused, timeout, TLS).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when the board service answers with a non-success status.
    /// Aborts the current fetch or mutation, not the whole run.
    #[error("board service returned HTTP {status}: {message}")]
    BoardApi { status: u16, message: String },

    /// Raised when a board response does not carry the expected tree shape.
    #[error("unexpected board response: {0}")]
    BoardResponse(String),

    /// Fault answer from the business suite RPC endpoint.
    #[error("business suite fault {code}: {message}")]
    SuiteFault { code: i64, message: String },

    /// Raised when the suite rejects the configured username or password.
    #[error("business suite rejected credentials for user '{0}'")]
    AuthRejected(String),

    /// Raised when an XML-RPC payload cannot be encoded or decoded.
    #[error("XML-RPC error: {0}")]
    XmlRpc(String),

    /// Errors bubbled up from the XML parser.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Raised when a field mapping fails validation before a run starts.
    #[error("invalid field mapping: {0}")]
    InvalidMapping(String),

    /// Raised when a status lookup fails validation before a run starts.
    #[error("invalid status lookup: {0}")]
    InvalidLookup(String),

    /// Raised when the user provides a configuration path that does not exist.
    #[error("configuration file not found: {0}")]
    MissingConfig(PathBuf),

    /// Raised when the stored credential file cannot be parsed.
    #[error("credential file error: {0}")]
    Env(#[from] dotenvy::Error),

    /// Raised when no credentials are stored and none were supplied.
    #[error("no stored credentials; run again to be prompted for them")]
    MissingCredentials,

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
