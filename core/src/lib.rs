// src/lib.rs

//! Recap: an async orchestrator that turns an arrived recording into a
//! delivered summary.
//!
//! Each recording drives one pipeline run through a fixed state machine:
//!  - Prepare the input and derive a deterministic transcription job name.
//!  - Submit the job, then wait and poll until it finishes.
//!  - Format the transcript and ask a model for a summary.
//!  - Deliver the summary, or escalate a failure report to a human.
//!
//! Routing lives in an explicit transition table, transient service errors
//! are retried with jittered backoff, and every run has an absolute deadline.

pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod journal;
pub mod pipeline;
pub mod retry;
pub mod units;

// --- Re-exports for the Public API ---

pub use crate::core::context::{keys, ContextEntry, RunContext};
pub use crate::core::control::{RunOutcome, Signal};
pub use crate::core::run::{PipelineRun, MAX_RUN_TIMEOUT, RetryRecord, SourceLocator, TranscriptionJobHandle, TransitionRecord};
pub use crate::core::shared_run::SharedRun;
pub use crate::core::state::PipelineState;

pub use crate::pipeline::definition::{Guard, Transition, TransitionTable};
pub use crate::pipeline::execution::Orchestrator;

pub use crate::config::OrchestratorConfig;
pub use crate::dispatch::{Dispatcher, RunHandle, TriggerEvent};
pub use crate::journal::{InMemoryJournal, RunJournal, RunSnapshot};
pub use crate::retry::{Jitter, RetryPolicy};

pub use crate::units::{
  Collaborators, DeliverResult, DeliveryReceipt, FailureReport, FormatTranscript, FormattedTranscript,
  InferenceClient, InvokeModel, JobClient, JobStatus, JobStatusReport, ModelStatus, ModelSummary, Notifier,
  PrepareInput, PreparedInput, SubmitJobRequest, SubmittedJob, SummarizeRequest, SummaryPayload,
  TranscriptFormatRequest,
};

pub use crate::error::{ErrorKind, RecapError, RecapResult, StepFailure, StepResult};
