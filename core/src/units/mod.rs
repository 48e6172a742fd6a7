// recap/src/units/mod.rs

//! Contracts of everything the orchestrator calls but does not implement:
//! the four step units, the transcription job client, the inference client
//! and the notifier.
//!
//! Every call returns a `StepResult`. Implementations classify their own
//! failures; anything left unclassified is treated as non-transient.

pub mod delivery;
pub mod model;
pub mod prepare;

use crate::core::run::SourceLocator;
use crate::error::StepResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use delivery::{FailureReport, NotifierDelivery};
pub use model::ModelInvoker;
pub use prepare::{derive_job_name, submit_request_for, SourcePreparer};

// --- Transcription job ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
  Submitted,
  InProgress,
  Completed,
  Failed,
  /// A status code the job service returned that this crate does not know.
  Unknown(String),
}

impl JobStatus {
  /// Maps a service status code. Queued jobs count as submitted.
  pub fn parse(code: &str) -> Self {
    match code.trim().to_ascii_uppercase().as_str() {
      "SUBMITTED" | "QUEUED" => JobStatus::Submitted,
      "IN_PROGRESS" => JobStatus::InProgress,
      "COMPLETED" => JobStatus::Completed,
      "FAILED" => JobStatus::Failed,
      _ => JobStatus::Unknown(code.to_string()),
    }
  }

  pub fn is_finished(&self) -> bool {
    matches!(self, JobStatus::Completed | JobStatus::Failed)
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      JobStatus::Submitted => f.write_str("SUBMITTED"),
      JobStatus::InProgress => f.write_str("IN_PROGRESS"),
      JobStatus::Completed => f.write_str("COMPLETED"),
      JobStatus::Failed => f.write_str("FAILED"),
      JobStatus::Unknown(code) => write!(f, "UNKNOWN({code})"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiarizationSettings {
  pub show_speaker_labels: bool,
  pub max_speaker_labels: u32,
}

impl Default for DiarizationSettings {
  fn default() -> Self {
    Self {
      show_speaker_labels: true,
      max_speaker_labels: 10,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitJobRequest {
  pub job_name: String,
  pub media_uri: String,
  pub output_bucket: String,
  pub output_key: String,
  pub language_code: String,
  pub diarization: DiarizationSettings,
  pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
  pub job_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
  pub job_name: String,
  pub status: JobStatus,
  pub output_locator: Option<String>,
  pub failure_reason: Option<String>,
}

/// Client for the external speech-to-text job service.
///
/// `submit` must be idempotent on `job_name`: submitting a name that already
/// exists returns that job instead of creating another one.
#[async_trait]
pub trait JobClient: Send + Sync {
  async fn submit(&self, request: &SubmitJobRequest) -> StepResult<SubmittedJob>;

  async fn get_status(&self, job_name: &str) -> StepResult<JobStatusReport>;
}

// --- Prepare-Input ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedInput {
  pub source_bucket: String,
  pub source_key: String,
  pub source_file_name: String,
  pub source_file_name_with_date: String,
}

/// Must be deterministic for a given locator.
#[async_trait]
pub trait PrepareInput: Send + Sync {
  async fn prepare(&self, source: &SourceLocator) -> StepResult<PreparedInput>;
}

// --- Format-Transcript ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptFormatRequest {
  /// Where the job service wrote its raw output.
  pub transcription_output: String,
  pub source_file_name: String,
}

/// Location of the speaker-diarized, human-readable transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedTranscript {
  pub bucket_name: String,
  pub speaker_transcription_key_name: String,
}

impl FormattedTranscript {
  pub fn locator(&self) -> String {
    format!("s3://{}/{}", self.bucket_name, self.speaker_transcription_key_name)
  }
}

#[async_trait]
pub trait FormatTranscript: Send + Sync {
  async fn format(&self, request: &TranscriptFormatRequest) -> StepResult<FormattedTranscript>;
}

// --- Invoke-Model / Inference ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
  Succeeded,
  Failed,
}

impl fmt::Display for ModelStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ModelStatus::Succeeded => f.write_str("SUCCEEDED"),
      ModelStatus::Failed => f.write_str("FAILED"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
  pub transcript: FormattedTranscript,
  pub instructions: String,
  pub model_id: String,
  pub guardrail_id: Option<String>,
  pub source_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
  pub status: ModelStatus,
  pub summary_text: Option<String>,
  /// Where the summary was stored, if the unit stored it.
  pub summary_key_name: Option<String>,
  pub error: Option<String>,
}

impl ModelSummary {
  pub fn succeeded(summary_text: impl Into<String>) -> Self {
    Self {
      status: ModelStatus::Succeeded,
      summary_text: Some(summary_text.into()),
      summary_key_name: None,
      error: None,
    }
  }

  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      status: ModelStatus::Failed,
      summary_text: None,
      summary_key_name: None,
      error: Some(error.into()),
    }
  }
}

/// Generative-model service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
  async fn summarize(&self, request: &SummarizeRequest) -> StepResult<ModelSummary>;
}

#[async_trait]
pub trait InvokeModel: Send + Sync {
  async fn invoke(&self, request: &SummarizeRequest) -> StepResult<ModelSummary>;
}

// --- Deliver-Result / Notifier ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPayload {
  pub run_id: String,
  pub source_file_name: String,
  pub summary_text: String,
  pub summary_key_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
  pub message_id: String,
  pub delivered_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeliverResult: Send + Sync {
  async fn deliver(&self, payload: &SummaryPayload) -> StepResult<DeliveryReceipt>;
}

/// Delivers a message to a human recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn send(&self, message: &str, subject: Option<&str>) -> StepResult<DeliveryReceipt>;
}

/// The full set of collaborators one orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
  pub prepare: Arc<dyn PrepareInput>,
  pub jobs: Arc<dyn JobClient>,
  pub format: Arc<dyn FormatTranscript>,
  pub model: Arc<dyn InvokeModel>,
  pub deliver: Arc<dyn DeliverResult>,
  pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
  /// Wires the default Prepare-Input, Invoke-Model and Deliver-Result units
  /// around the given clients. Summaries and failure reports share `notifier`.
  pub fn with_defaults<J, F, C, N>(jobs: J, format: F, inference: C, notifier: N) -> Self
  where
    J: JobClient + 'static,
    F: FormatTranscript + 'static,
    C: InferenceClient + 'static,
    N: Notifier + 'static,
  {
    let notifier = Arc::new(notifier);
    Self {
      prepare: Arc::new(SourcePreparer),
      jobs: Arc::new(jobs),
      format: Arc::new(format),
      model: Arc::new(ModelInvoker::new(inference)),
      deliver: Arc::new(NotifierDelivery::new(notifier.clone())),
      notifier,
    }
  }
}
