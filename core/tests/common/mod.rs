// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use recap::units::{ModelInvoker, NotifierDelivery, SourcePreparer};
use recap::{
  Collaborators, DeliveryReceipt, ErrorKind, FormatTranscript, FormattedTranscript, InferenceClient, Jitter,
  JobClient, JobStatus, JobStatusReport, ModelSummary, Notifier, Orchestrator, OrchestratorConfig, RecapResult,
  RetryPolicy, RunJournal, RunSnapshot, SourceLocator, StepFailure, StepResult, SubmitJobRequest, SubmittedJob,
  SummarizeRequest, TranscriptFormatRequest,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

pub const BUCKET: &str = "meetings-bucket";

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Inputs ---

pub fn recording(key: &str) -> SourceLocator {
  SourceLocator::new(BUCKET, key, Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 5).unwrap())
}

/// Default timings (20 s poll, 30 min deadline) with deterministic backoff.
pub fn test_config() -> OrchestratorConfig {
  OrchestratorConfig {
    retry: RetryPolicy {
      max_attempts: 4,
      initial_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(8),
      multiplier: 2.0,
      max_elapsed: Duration::from_secs(120),
      jitter: Jitter::None,
    },
    ..OrchestratorConfig::default()
  }
}

// --- Transcription job service ---

/// Job service whose status answers follow a script.
///
/// Submission is idempotent on the job name: `created` holds each distinct
/// name once no matter how often it was submitted.
#[derive(Clone, Default)]
pub struct ScriptedJobs {
  statuses: Arc<Mutex<VecDeque<StepResult<JobStatus>>>>,
  fallback: Arc<Mutex<Option<JobStatus>>>,
  submit_failures: Arc<Mutex<VecDeque<StepFailure>>>,
  failing_names: Arc<Mutex<Vec<String>>>,
  pub created: Arc<Mutex<BTreeSet<String>>>,
  pub submit_calls: Arc<AtomicUsize>,
  pub status_calls: Arc<AtomicUsize>,
}

impl ScriptedJobs {
  /// Answers from `script` in order, then `fallback` forever.
  pub fn new(script: Vec<StepResult<JobStatus>>, fallback: JobStatus) -> Self {
    let jobs = Self::default();
    *jobs.statuses.lock() = script.into();
    *jobs.fallback.lock() = Some(fallback);
    jobs
  }

  /// `pending` IN_PROGRESS answers, then COMPLETED.
  pub fn completing_after(pending: usize) -> Self {
    Self::new(vec![Ok(JobStatus::InProgress); pending], JobStatus::Completed)
  }

  pub fn never_finishing() -> Self {
    Self::new(Vec::new(), JobStatus::InProgress)
  }

  /// The next submissions fail with `failures`, in order.
  pub fn fail_submit_with(self, failures: Vec<StepFailure>) -> Self {
    *self.submit_failures.lock() = failures.into();
    self
  }

  /// Jobs whose name contains `fragment` report FAILED.
  pub fn fail_jobs_named(self, fragment: &str) -> Self {
    self.failing_names.lock().push(fragment.to_string());
    self
  }

  pub fn output_locator(job_name: &str) -> String {
    format!("s3://{BUCKET}/transcriptions/{job_name}.json")
  }
}

#[async_trait]
impl JobClient for ScriptedJobs {
  async fn submit(&self, request: &SubmitJobRequest) -> StepResult<SubmittedJob> {
    self.submit_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = self.submit_failures.lock().pop_front() {
      return Err(failure);
    }
    self.created.lock().insert(request.job_name.clone());
    Ok(SubmittedJob {
      job_name: request.job_name.clone(),
    })
  }

  async fn get_status(&self, job_name: &str) -> StepResult<JobStatusReport> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    if !self.created.lock().contains(job_name) {
      return Err(StepFailure::validation(format!("no such job: {job_name}")));
    }
    let failing = self.failing_names.lock().iter().any(|f| job_name.contains(f.as_str()));
    let status = if failing {
      JobStatus::Failed
    } else {
      let scripted = self.statuses.lock().pop_front();
      match scripted {
        Some(answer) => answer?,
        None => self.fallback.lock().clone().unwrap_or(JobStatus::InProgress),
      }
    };
    Ok(JobStatusReport {
      job_name: job_name.to_string(),
      output_locator: (status == JobStatus::Completed).then(|| Self::output_locator(job_name)),
      failure_reason: (status == JobStatus::Failed).then(|| "unsupported media format".to_string()),
      status,
    })
  }
}

// --- Format-Transcript ---

#[derive(Clone, Default)]
pub struct FakeFormatter {
  failures: Arc<Mutex<VecDeque<StepFailure>>>,
  panic_message: Arc<Mutex<Option<String>>>,
  pub calls: Arc<AtomicUsize>,
}

impl FakeFormatter {
  pub fn failing_first(failures: Vec<StepFailure>) -> Self {
    let formatter = Self::default();
    *formatter.failures.lock() = failures.into();
    formatter
  }

  pub fn panicking(message: &str) -> Self {
    let formatter = Self::default();
    *formatter.panic_message.lock() = Some(message.to_string());
    formatter
  }
}

#[async_trait]
impl FormatTranscript for FakeFormatter {
  async fn format(&self, request: &TranscriptFormatRequest) -> StepResult<FormattedTranscript> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let panic_message = self.panic_message.lock().clone();
    if let Some(message) = panic_message {
      panic!("{}", message);
    }
    if let Some(failure) = self.failures.lock().pop_front() {
      return Err(failure);
    }
    Ok(FormattedTranscript {
      bucket_name: BUCKET.to_string(),
      speaker_transcription_key_name: format!("formatted/{}.txt", request.source_file_name),
    })
  }
}

// --- Inference ---

#[derive(Clone, Default)]
pub struct FakeInference {
  answers: Arc<Mutex<VecDeque<StepResult<ModelSummary>>>>,
  pub requests: Arc<Mutex<Vec<SummarizeRequest>>>,
}

impl FakeInference {
  pub const SUMMARY: &'static str = "## Key Discussion Points\n- Ship the release on Friday";

  pub fn answering(answers: Vec<StepResult<ModelSummary>>) -> Self {
    let inference = Self::default();
    *inference.answers.lock() = answers.into();
    inference
  }

  pub fn calls(&self) -> usize {
    self.requests.lock().len()
  }
}

#[async_trait]
impl InferenceClient for FakeInference {
  async fn summarize(&self, request: &SummarizeRequest) -> StepResult<ModelSummary> {
    self.requests.lock().push(request.clone());
    let answer = self.answers.lock().pop_front();
    answer.unwrap_or_else(|| Ok(ModelSummary::succeeded(Self::SUMMARY)))
  }
}

// --- Notifier ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
  pub subject: Option<String>,
  pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
  failures: Arc<Mutex<VecDeque<StepFailure>>>,
  pub sent: Arc<Mutex<Vec<SentMessage>>>,
  pub attempts: Arc<AtomicUsize>,
}

impl RecordingNotifier {
  pub fn failing_first(failures: Vec<StepFailure>) -> Self {
    let notifier = Self::default();
    *notifier.failures.lock() = failures.into();
    notifier
  }

  pub fn messages(&self) -> Vec<SentMessage> {
    self.sent.lock().clone()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn send(&self, message: &str, subject: Option<&str>) -> StepResult<DeliveryReceipt> {
    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(failure) = self.failures.lock().pop_front() {
      return Err(failure);
    }
    self.sent.lock().push(SentMessage {
      subject: subject.map(str::to_string),
      body: message.to_string(),
    });
    Ok(DeliveryReceipt {
      message_id: format!("msg-{attempt}"),
      delivered_at: Utc::now(),
    })
  }
}

// --- Journal keeping every snapshot ---

#[derive(Default)]
pub struct RecordingJournal {
  pub snapshots: Mutex<Vec<RunSnapshot>>,
}

impl RecordingJournal {
  pub fn first_in(&self, state: recap::PipelineState) -> Option<RunSnapshot> {
    self.snapshots.lock().iter().find(|s| s.current_state == state).cloned()
  }
}

#[async_trait]
impl RunJournal for RecordingJournal {
  async fn record(&self, snapshot: &RunSnapshot) -> RecapResult<()> {
    self.snapshots.lock().push(snapshot.clone());
    Ok(())
  }
}

// --- Harness wiring the fakes into an orchestrator ---

/// All fakes of one orchestrator. Summaries go to `summaries`, failure
/// reports to `alerts`.
#[derive(Clone, Default)]
pub struct Harness {
  pub jobs: ScriptedJobs,
  pub formatter: FakeFormatter,
  pub inference: FakeInference,
  pub summaries: RecordingNotifier,
  pub alerts: RecordingNotifier,
}

impl Harness {
  pub fn new(jobs: ScriptedJobs) -> Self {
    Self {
      jobs,
      ..Self::default()
    }
  }

  pub fn collaborators(&self) -> Collaborators {
    Collaborators {
      prepare: Arc::new(SourcePreparer),
      jobs: Arc::new(self.jobs.clone()),
      format: Arc::new(self.formatter.clone()),
      model: Arc::new(ModelInvoker::new(self.inference.clone())),
      deliver: Arc::new(NotifierDelivery::new(Arc::new(self.summaries.clone()))),
      notifier: Arc::new(self.alerts.clone()),
    }
  }

  pub fn orchestrator(&self) -> Orchestrator {
    self.orchestrator_with(test_config())
  }

  pub fn orchestrator_with(&self, config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::new(config, self.collaborators()).expect("test orchestrator should be valid")
  }
}

pub fn transient(message: &str) -> StepFailure {
  StepFailure::new(ErrorKind::TransientService, message)
}
