// recap/src/pipeline/handlers.rs

//! Per-state evaluation. Each handler reads what it needs from the run
//! context, calls its collaborator and returns the `Signal` for the table.

use crate::core::context::keys;
use crate::core::control::Signal;
use crate::core::run::{RetryRecord, TranscriptionJobHandle};
use crate::core::shared_run::SharedRun;
use crate::core::state::PipelineState;
use crate::error::{ErrorKind, StepFailure, StepResult};
use crate::pipeline::execution::Orchestrator;
use crate::retry::{retry_transient, RetryAttempt, RetryPolicy};
use crate::units::{
  derive_job_name, submit_request_for, FormattedTranscript, JobStatus, ModelSummary, PreparedInput, SummarizeRequest,
  SummaryPayload, TranscriptFormatRequest,
};
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::time::sleep;
use tracing::{event, Level};

use crate::core::state::PipelineState::*;

/// Awaits a collaborator call, turning a panic into an unclassified failure.
pub(crate) async fn guarded<T, Fut>(call: Fut) -> StepResult<T>
where
  Fut: Future<Output = StepResult<T>>,
{
  match AssertUnwindSafe(call).catch_unwind().await {
    Ok(result) => result,
    Err(panic) => {
      let message = panic_message(panic.as_ref());
      event!(Level::ERROR, panic = %message, "Step unit panicked.");
      Err(StepFailure::new(ErrorKind::Unclassified, format!("step unit panicked: {message}")))
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

impl Orchestrator {
  /// Evaluates one non-terminal state of `run`.
  pub(crate) async fn evaluate(&self, state: PipelineState, run: &SharedRun) -> Signal {
    let result = match state {
      PrepareInput => self.prepare_input(run).await,
      SubmitJob => self.submit_job(run).await,
      WaitBeforePoll => self.wait_before_poll().await,
      PollJobStatus => self.poll_job_status(run).await,
      FormatTranscript => self.format_transcript(run).await,
      InvokeModel => self.invoke_model(run).await,
      CheckModelStatus => self.check_model_status(run),
      DeliverResult => self.deliver_result(run).await,
      Success | Failure => Err(StepFailure::new(
        ErrorKind::Unclassified,
        format!("terminal state {state} cannot be evaluated"),
      )),
    };
    match result {
      Ok(signal) => signal,
      Err(failure) => {
        event!(Level::WARN, kind = %failure.kind, error = %failure.message, "State failed.");
        Signal::Failed(failure)
      }
    }
  }

  /// Calls a collaborator through the retry layer. Only `retryable` call
  /// sites get more than one attempt; each retry is recorded on the run.
  async fn call<T, F, Fut>(&self, state: PipelineState, run: &SharedRun, retryable: bool, mut op: F) -> StepResult<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = StepResult<T>>,
  {
    let deadline = run.read().deadline;
    let single_attempt;
    let policy = if retryable {
      &self.config.retry
    } else {
      single_attempt = RetryPolicy::no_retry();
      &single_attempt
    };
    let record = |retry: &RetryAttempt| {
      run.write().retries.push(RetryRecord {
        state,
        attempt: retry.attempt,
        kind: retry.failure.kind,
        message: retry.failure.message.clone(),
        delay: retry.delay,
      });
    };
    retry_transient(policy, deadline, record, |_| guarded(op())).await
  }

  async fn prepare_input(&self, run: &SharedRun) -> StepResult<Signal> {
    let source = run.read().source.clone();
    let prepared = self.call(PrepareInput, run, false, || self.units.prepare.prepare(&source)).await?;
    let job_name = derive_job_name(&self.config.job_name_prefix, &prepared);
    event!(Level::DEBUG, %job_name, file_name = %prepared.source_file_name, "Input prepared.");

    let mut guard = run.write();
    guard.context.insert(keys::SOURCE, PrepareInput, &prepared)?;
    guard.context.insert(keys::JOB_NAME, PrepareInput, &job_name)?;
    Ok(Signal::Completed)
  }

  async fn submit_job(&self, run: &SharedRun) -> StepResult<Signal> {
    let (prepared, job_name) = {
      let guard = run.read();
      let prepared: PreparedInput = guard.context.require(keys::SOURCE, SubmitJob)?;
      let job_name: String = guard.context.require(keys::JOB_NAME, SubmitJob)?;
      (prepared, job_name)
    };
    let request = submit_request_for(&self.config, &prepared, &job_name);
    let submitted = self.call(SubmitJob, run, true, || self.units.jobs.submit(&request)).await?;
    if submitted.job_name != job_name {
      event!(Level::WARN, expected = %job_name, returned = %submitted.job_name, "Job service returned a different job name.");
    }
    event!(Level::INFO, %job_name, "Transcription job submitted.");

    let mut guard = run.write();
    guard.job = Some(TranscriptionJobHandle {
      job_name,
      status: JobStatus::Submitted,
      output_locator: None,
      failure_reason: None,
    });
    guard.context.insert(keys::SUBMISSION, SubmitJob, &submitted)?;
    Ok(Signal::Completed)
  }

  async fn wait_before_poll(&self) -> StepResult<Signal> {
    // The run loop bounds this sleep by the run deadline.
    sleep(self.config.poll_interval).await;
    Ok(Signal::Completed)
  }

  async fn poll_job_status(&self, run: &SharedRun) -> StepResult<Signal> {
    let job_name: String = {
      let mut guard = run.write();
      guard.poll_cycles += 1;
      guard.context.require(keys::JOB_NAME, PollJobStatus)?
    };
    let report = self.call(PollJobStatus, run, true, || self.units.jobs.get_status(&job_name)).await?;
    let status = report.status.clone();
    if let JobStatus::Unknown(code) = &status {
      event!(Level::WARN, %job_name, %code, "Unrecognised job status; treating the job as still running.");
    } else {
      event!(Level::DEBUG, %job_name, %status, "Job status polled.");
    }

    let mut guard = run.write();
    let record = &mut *guard;
    let handle = record.job.get_or_insert_with(|| TranscriptionJobHandle {
      job_name: job_name.clone(),
      status: JobStatus::Submitted,
      output_locator: None,
      failure_reason: None,
    });
    handle.status = status.clone();
    handle.output_locator = report.output_locator.clone();
    handle.failure_reason = report.failure_reason.clone();

    if status == JobStatus::Completed {
      let output = report
        .output_locator
        .ok_or_else(|| StepFailure::validation(format!("job {job_name} completed without an output location")))?;
      record.context.insert(keys::TRANSCRIPTION_OUTPUT, PollJobStatus, &output)?;
    }
    Ok(Signal::Job(status))
  }

  async fn format_transcript(&self, run: &SharedRun) -> StepResult<Signal> {
    let request = {
      let guard = run.read();
      let prepared: PreparedInput = guard.context.require(keys::SOURCE, FormatTranscript)?;
      TranscriptFormatRequest {
        transcription_output: guard.context.require(keys::TRANSCRIPTION_OUTPUT, FormatTranscript)?,
        source_file_name: prepared.source_file_name,
      }
    };
    let transcript = self.call(FormatTranscript, run, true, || self.units.format.format(&request)).await?;
    event!(Level::DEBUG, transcript = %transcript.locator(), "Transcript formatted.");

    run.write().context.insert(keys::TRANSCRIPT, FormatTranscript, &transcript)?;
    Ok(Signal::Completed)
  }

  async fn invoke_model(&self, run: &SharedRun) -> StepResult<Signal> {
    let request = {
      let guard = run.read();
      let prepared: PreparedInput = guard.context.require(keys::SOURCE, InvokeModel)?;
      let transcript: FormattedTranscript = guard.context.require(keys::TRANSCRIPT, InvokeModel)?;
      SummarizeRequest {
        transcript,
        instructions: self.config.summary_instructions.clone(),
        model_id: self.config.model_id.clone(),
        guardrail_id: self.config.guardrail_id.clone(),
        source_file_name: prepared.source_file_name,
      }
    };
    let summary = self.call(InvokeModel, run, true, || self.units.model.invoke(&request)).await?;

    run.write().context.insert(keys::SUMMARY, InvokeModel, &summary)?;
    Ok(Signal::Completed)
  }

  fn check_model_status(&self, run: &SharedRun) -> StepResult<Signal> {
    let summary: ModelSummary = run.read().context.require(keys::SUMMARY, CheckModelStatus)?;
    event!(Level::DEBUG, status = %summary.status, "Model status checked.");
    Ok(Signal::Model(summary.status))
  }

  async fn deliver_result(&self, run: &SharedRun) -> StepResult<Signal> {
    let payload = {
      let guard = run.read();
      if guard.context.contains(keys::DELIVERY) {
        None
      } else {
        let prepared: PreparedInput = guard.context.require(keys::SOURCE, DeliverResult)?;
        let summary: ModelSummary = guard.context.require(keys::SUMMARY, DeliverResult)?;
        let summary_text = summary
          .summary_text
          .ok_or_else(|| StepFailure::validation("model summary has no text to deliver"))?;
        Some(SummaryPayload {
          run_id: guard.run_id.clone(),
          source_file_name: prepared.source_file_name,
          summary_text,
          summary_key_name: summary.summary_key_name,
        })
      }
    };
    let Some(payload) = payload else {
      event!(Level::INFO, "Delivery receipt already recorded; not delivering again.");
      return Ok(Signal::Completed);
    };

    let receipt = self
      .call(DeliverResult, run, true, || self.units.deliver.deliver(&payload))
      .await
      .map_err(|failure| match failure.kind {
        ErrorKind::Delivery | ErrorKind::DeadlineExceeded => failure,
        kind => StepFailure::delivery(format!("{kind}: {}", failure.message)),
      })?;

    run.write().context.insert(keys::DELIVERY, DeliverResult, &receipt)?;
    Ok(Signal::Completed)
  }
}
