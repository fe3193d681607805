//! Error types for the paperflow library.
//!
//! One error enum covers every failure mode the library surfaces:
//! - Network and remote API errors
//! - Configuration errors (missing credentials or scopes)
//! - PDF parsing
//! - Filesystem access and JSON handling
//!
//! # Examples
//!
//! ```
//! use paperflow::{error::PaperflowError, zotero::ZoteroConfig};
//!
//! std::env::remove_var("ZOTERO_USER_ID");
//! match ZoteroConfig::from_env() {
//!   Err(PaperflowError::Config(msg)) => println!("fatal: {msg}"),
//!   Err(e) => println!("other error: {e}"),
//!   Ok(_) => println!("configured"),
//! }
//! ```

use thiserror::Error;

/// Error type alias used for the [`paperflow`](crate) crate.
pub type Result<T> = core::result::Result<T, PaperflowError>;

/// Errors that can occur while working with the paperflow library.
///
/// Configuration errors are fatal and surface before any record is touched;
/// the other variants are produced per record or per request and are usually
/// logged and counted by the callers rather than aborting a run.
#[derive(Error, Debug)]
pub enum PaperflowError {
  /// A network request failed.
  ///
  /// This can occur when:
  /// - The network is unavailable
  /// - The server is unreachable
  /// - The request times out
  /// - TLS/SSL errors occur
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A remote API returned an error response.
  ///
  /// The string carries the service name, HTTP status, and as much of the
  /// response body as was readable, for debugging.
  #[error("API error: {0}")]
  Api(String),

  /// Required configuration is missing or unusable.
  ///
  /// This covers absent credentials (`ZOTERO_API_KEY`, provider API keys),
  /// scopes that cannot be resolved (an unknown collection name), and
  /// malformed configuration files such as the tag taxonomy.
  #[error("{0}")]
  Config(String),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// JSON (de)serialization failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// PDF parsing and text extraction errors from the lopdf library.
  ///
  /// Common cases include malformed or encrypted files, missing objects,
  /// and invalid stream encodings.
  #[error(transparent)]
  Pdf(#[from] lopdf::Error),
}
