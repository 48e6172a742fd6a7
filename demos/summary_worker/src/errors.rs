// demos/summary_worker/src/errors.rs

use thiserror::Error;

use recap::RecapError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Invalid trigger event: {0}")]
  InvalidEvent(String),

  #[error("Orchestrator Error: {source}")]
  Orchestrator {
    #[from] // Allows conversion from recap::RecapError
    source: RecapError,
  },

  #[error("I/O Error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Internal Error: {0}")]
  Internal(String),
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
