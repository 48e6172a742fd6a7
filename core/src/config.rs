// recap/src/config.rs

use crate::core::run::MAX_RUN_TIMEOUT;
use crate::error::{RecapError, RecapResult};
use crate::retry::{Jitter, RetryPolicy};
use crate::units::prepare::MAX_JOB_NAME_PREFIX_LEN;
use crate::units::DiarizationSettings;
use std::time::Duration;

pub const DEFAULT_SUMMARY_INSTRUCTIONS: &str = "Your task is to create markdown-formatted list Key Stakeholders and highlight Key Discussion Points and list Decisions and outline Action Items and provide meeting notes and create a concise summary.";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Settings for one orchestrator. Shared read-only by all runs it drives.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
  /// Delay of the WaitBeforePoll state.
  pub poll_interval: Duration,
  /// Absolute budget of a run, measured from its start.
  pub run_timeout: Duration,
  pub retry: RetryPolicy,
  /// Only objects under this prefix start a run.
  pub trigger_prefix: String,
  /// Prefix of the key the job service writes its output to.
  pub output_prefix: String,
  pub job_name_prefix: String,
  pub language_code: String,
  pub diarization: DiarizationSettings,
  pub summary_instructions: String,
  pub model_id: String,
  pub guardrail_id: Option<String>,
  /// Must contain `{run_id}`.
  pub run_history_url_template: String,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(20),
      run_timeout: Duration::from_secs(30 * 60),
      retry: RetryPolicy::default(),
      trigger_prefix: "recordings/".to_string(),
      output_prefix: "transcriptions/".to_string(),
      job_name_prefix: "summary-generator".to_string(),
      language_code: "en-US".to_string(),
      diarization: DiarizationSettings::default(),
      summary_instructions: DEFAULT_SUMMARY_INSTRUCTIONS.to_string(),
      model_id: DEFAULT_MODEL_ID.to_string(),
      guardrail_id: None,
      run_history_url_template: "recap://runs/{run_id}".to_string(),
    }
  }
}

impl OrchestratorConfig {
  /// Reads `RECAP_*` variables from the process environment.
  pub fn from_env() -> RecapResult<Self> {
    Self::from_source(|key| std::env::var(key).ok())
  }

  /// Builds a config from any key lookup; unset keys keep their defaults.
  pub fn from_source<F>(mut lookup: F) -> RecapResult<Self>
  where
    F: FnMut(&str) -> Option<String>,
  {
    let mut config = Self::default();
    let mut get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("RECAP_POLL_INTERVAL_SECS") {
      config.poll_interval = Duration::from_secs(parse_num("RECAP_POLL_INTERVAL_SECS", &v)?);
    }
    if let Some(v) = get("RECAP_RUN_TIMEOUT_SECS") {
      config.run_timeout = Duration::from_secs(parse_num("RECAP_RUN_TIMEOUT_SECS", &v)?);
    }
    if let Some(v) = get("RECAP_RETRY_MAX_ATTEMPTS") {
      config.retry.max_attempts = parse_num("RECAP_RETRY_MAX_ATTEMPTS", &v)?;
    }
    if let Some(v) = get("RECAP_RETRY_INITIAL_DELAY_MS") {
      config.retry.initial_delay = Duration::from_millis(parse_num("RECAP_RETRY_INITIAL_DELAY_MS", &v)?);
    }
    if let Some(v) = get("RECAP_RETRY_MAX_DELAY_MS") {
      config.retry.max_delay = Duration::from_millis(parse_num("RECAP_RETRY_MAX_DELAY_MS", &v)?);
    }
    if let Some(v) = get("RECAP_RETRY_MAX_ELAPSED_SECS") {
      config.retry.max_elapsed = Duration::from_secs(parse_num("RECAP_RETRY_MAX_ELAPSED_SECS", &v)?);
    }
    if let Some(v) = get("RECAP_RETRY_JITTER") {
      config.retry.jitter = match v.to_ascii_lowercase().as_str() {
        "none" | "off" | "false" => Jitter::None,
        "equal" | "on" | "true" => Jitter::Equal,
        other => {
          return Err(RecapError::Configuration {
            field: "RECAP_RETRY_JITTER".to_string(),
            message: format!("expected 'none' or 'equal', got '{other}'"),
          })
        }
      };
    }
    if let Some(v) = get("RECAP_TRIGGER_PREFIX") {
      config.trigger_prefix = v;
    }
    if let Some(v) = get("RECAP_OUTPUT_PREFIX") {
      config.output_prefix = v;
    }
    if let Some(v) = get("RECAP_JOB_NAME_PREFIX") {
      config.job_name_prefix = v;
    }
    if let Some(v) = get("RECAP_LANGUAGE_CODE") {
      config.language_code = v;
    }
    if let Some(v) = get("RECAP_MAX_SPEAKER_LABELS") {
      config.diarization.max_speaker_labels = parse_num("RECAP_MAX_SPEAKER_LABELS", &v)?;
    }
    if let Some(v) = get("RECAP_SUMMARY_INSTRUCTIONS") {
      config.summary_instructions = v;
    }
    if let Some(v) = get("RECAP_MODEL_ID") {
      config.model_id = v;
    }
    config.guardrail_id = get("RECAP_GUARDRAIL_ID");
    if let Some(v) = get("RECAP_RUN_HISTORY_URL") {
      config.run_history_url_template = v;
    }

    if config.guardrail_id.is_none() {
      tracing::warn!("RECAP_GUARDRAIL_ID is not set; the model will be invoked without a content-safety guardrail.");
    }

    config.validate()?;
    tracing::info!("Orchestrator configuration loaded.");
    Ok(config)
  }

  pub fn validate(&self) -> RecapResult<()> {
    let invalid = |field: &str, message: &str| RecapError::Configuration {
      field: field.to_string(),
      message: message.to_string(),
    };
    if self.poll_interval.is_zero() {
      return Err(invalid("poll_interval", "must be greater than zero"));
    }
    if self.run_timeout.is_zero() {
      return Err(invalid("run_timeout", "must be greater than zero"));
    }
    if self.run_timeout > MAX_RUN_TIMEOUT {
      return Err(invalid("run_timeout", "must not exceed seven days"));
    }
    if self.retry.max_attempts == 0 {
      return Err(invalid("retry.max_attempts", "must allow at least one attempt"));
    }
    if self.job_name_prefix.is_empty() {
      return Err(invalid("job_name_prefix", "must not be empty"));
    }
    if self.job_name_prefix.len() > MAX_JOB_NAME_PREFIX_LEN {
      return Err(invalid("job_name_prefix", "leaves no room for the job name hash"));
    }
    if !self.run_history_url_template.contains("{run_id}") {
      return Err(invalid("run_history_url_template", "must contain '{run_id}'"));
    }
    Ok(())
  }

  pub fn run_history_link(&self, run_id: &str) -> String {
    self.run_history_url_template.replace("{run_id}", run_id)
  }
}

fn parse_num<T: std::str::FromStr>(field: &str, raw: &str) -> RecapResult<T>
where
  T::Err: std::fmt::Display,
{
  raw.parse::<T>().map_err(|e| RecapError::Configuration {
    field: field.to_string(),
    message: format!("invalid value '{raw}': {e}"),
  })
}
