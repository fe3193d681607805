//! Error types for the CLI layer.
//!
//! Most failures bubble up from the `paperflow` library; the CLI adds the
//! few failure modes it owns (user interaction, report files).

use thiserror::Error;

/// Any error the CLI can exit with.
#[derive(Error, Debug)]
pub enum PaperflowdError {
  /// Errors propagated from the library
  #[error(transparent)]
  Paperflow(#[from] paperflow::error::PaperflowError),

  /// Prompt or terminal interaction failures
  #[error("interaction error: {0}")]
  Interaction(#[from] dialoguer::Error),

  /// Report and state file failures
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Report serialization failures
  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

/// Result alias for CLI operations.
pub type Result<T> = core::result::Result<T, PaperflowdError>;
