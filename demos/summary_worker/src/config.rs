// demos/summary_worker/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use recap::OrchestratorConfig;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub orchestrator: OrchestratorConfig,

  /// Bucket assumed for plain object keys read from stdin.
  pub default_bucket: String,

  // Mock transcription service behaviour
  pub mock_job_polls: usize,
  pub mock_throttle_percent: u32,

  // Mock notifier
  pub notify_recipient: String,
}

/// Read before the subscriber exists, so it cannot go through `AppConfig`.
pub fn json_logs_requested() -> bool {
  env::var("WORKER_LOG_JSON").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let orchestrator = OrchestratorConfig::from_env()?;

    let get_env = |var_name: &str, default: &str| env::var(var_name).unwrap_or_else(|_| default.to_string());

    let default_bucket = get_env("WORKER_BUCKET", "demo-recordings");
    let mock_job_polls = get_env("WORKER_MOCK_JOB_POLLS", "2")
      .parse::<usize>()
      .map_err(|e| AppError::Config(format!("Invalid WORKER_MOCK_JOB_POLLS: {}", e)))?;
    let mock_throttle_percent = get_env("WORKER_MOCK_THROTTLE_PERCENT", "0")
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid WORKER_MOCK_THROTTLE_PERCENT: {}", e)))?;
    if mock_throttle_percent > 100 {
      return Err(AppError::Config("WORKER_MOCK_THROTTLE_PERCENT must be between 0 and 100".to_string()));
    }
    let notify_recipient = get_env("WORKER_NOTIFY_RECIPIENT", "team@example.com");

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      orchestrator,
      default_bucket,
      mock_job_polls,
      mock_throttle_percent,
      notify_recipient,
    })
  }
}
