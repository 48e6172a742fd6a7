// tests/orchestrator_tests.rs
mod common;

use common::*;
use recap::{keys, ErrorKind, FailureReport, JobStatus, ModelSummary, PipelineState, RunOutcome, StepFailure};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

use recap::PipelineState::*;

#[tokio::test(start_paused = true)]
async fn test_happy_path_reaches_success() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::completing_after(2));
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-a", recording("recordings/team/standup.mp4")).await;

  assert_eq!(outcome, RunOutcome::Succeeded);
  let record = run.cloned();
  assert_eq!(
    record.path(),
    vec![
      PrepareInput,
      SubmitJob,
      WaitBeforePoll,
      PollJobStatus,
      WaitBeforePoll,
      PollJobStatus,
      WaitBeforePoll,
      PollJobStatus,
      FormatTranscript,
      InvokeModel,
      CheckModelStatus,
      DeliverResult,
      Success,
    ]
  );
  assert_eq!(record.poll_cycles, 3);
  assert_eq!(record.visits(WaitBeforePoll), 3);
  assert!(record.failure.is_none());

  let summaries = harness.summaries.messages();
  assert_eq!(summaries.len(), 1);
  assert_eq!(summaries[0].body, FakeInference::SUMMARY);
  assert_eq!(summaries[0].subject.as_deref(), Some("Recording summary: standup"));
  assert!(harness.alerts.messages().is_empty());

  // Every state's result stays readable, tagged with its writer.
  assert_eq!(record.context.owner_of(keys::SOURCE), Some(PrepareInput));
  assert_eq!(record.context.owner_of(keys::SUBMISSION), Some(SubmitJob));
  assert_eq!(record.context.owner_of(keys::TRANSCRIPTION_OUTPUT), Some(PollJobStatus));
  assert_eq!(record.context.owner_of(keys::TRANSCRIPT), Some(FormatTranscript));
  assert_eq!(record.context.owner_of(keys::SUMMARY), Some(InvokeModel));
  assert_eq!(record.context.owner_of(keys::DELIVERY), Some(DeliverResult));
  assert!(!record.context.contains(keys::FAILURE_REPORT));
}

#[tokio::test(start_paused = true)]
async fn test_model_request_carries_configured_instructions() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::completing_after(0));
  let mut config = test_config();
  config.guardrail_id = Some("guardrail-7".to_string());
  let orchestrator = harness.orchestrator_with(config.clone());

  let (_run, outcome) = orchestrator.start("run-req", recording("recordings/retro.m4a")).await;

  assert!(outcome.is_success());
  let requests = harness.inference.requests.lock().clone();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].instructions, config.summary_instructions);
  assert_eq!(requests[0].model_id, config.model_id);
  assert_eq!(requests[0].guardrail_id.as_deref(), Some("guardrail-7"));
  assert_eq!(requests[0].source_file_name, "retro");
  assert_eq!(requests[0].transcript.speaker_transcription_key_name, "formatted/retro.txt");
}

#[tokio::test(start_paused = true)]
async fn test_job_failure_routes_to_failure_and_notifies_once() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::new(
    vec![Ok(JobStatus::InProgress), Ok(JobStatus::Failed)],
    JobStatus::Failed,
  ));
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-b", recording("recordings/broken.mp4")).await;

  let failure = outcome.failure().cloned().expect("run should fail");
  assert_eq!(failure.kind, ErrorKind::JobFailed);
  assert_eq!(failure.message, "unsupported media format");

  let record = run.cloned();
  assert_eq!(record.current_state, Failure);
  assert_eq!(record.history.last().map(|t| t.from), Some(PollJobStatus));
  assert_eq!(harness.formatter.calls.load(Ordering::SeqCst), 0);
  assert_eq!(harness.inference.calls(), 0);
  assert!(harness.summaries.messages().is_empty());

  let alerts = harness.alerts.messages();
  assert_eq!(alerts.len(), 1);
  let report: FailureReport = serde_json::from_str(&alerts[0].body).unwrap();
  assert_eq!(report.run_id, "run-b");
  assert_eq!(report.error_kind, ErrorKind::JobFailed);
  assert_eq!(report.failed_state, PollJobStatus);
  assert_eq!(report.error_detail, "unsupported media format");
  assert_eq!(report.link_to_run_history, "recap://runs/run-b");
  assert!(alerts[0].body.contains("\"ErrorKind\": \"JobFailed\""));
  assert!(record.notified);
  assert_eq!(record.context.owner_of(keys::FAILURE_REPORT), Some(Failure));
}

#[tokio::test(start_paused = true)]
async fn test_transient_format_errors_are_retried_then_succeed() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.formatter = FakeFormatter::failing_first(vec![transient("throttled"), transient("throttled")]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-c", recording("recordings/sync.mp4")).await;

  assert_eq!(outcome, RunOutcome::Succeeded);
  assert_eq!(harness.formatter.calls.load(Ordering::SeqCst), 3);

  let record = run.cloned();
  assert_eq!(record.retries_in(FormatTranscript), 2);
  let delays: Vec<Duration> = record.retries.iter().map(|r| r.delay).collect();
  assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
  assert!(record.retries.iter().all(|r| r.kind == ErrorKind::TransientService));
  // Retries happen inside the state; the path shows a single visit.
  assert_eq!(record.visits(FormatTranscript), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_error_is_retried_within_one_cycle() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::new(
    vec![Ok(JobStatus::InProgress), Err(transient("rate exceeded")), Ok(JobStatus::Completed)],
    JobStatus::Completed,
  ));
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-poll-retry", recording("recordings/standup.mp4")).await;

  assert_eq!(outcome, RunOutcome::Succeeded);
  let record = run.cloned();
  assert_eq!(record.retries_in(PollJobStatus), 1);
  assert_eq!(record.retries[0].message, "rate exceeded");
  assert_eq!(record.retries[0].delay, Duration::from_secs(1));
  // The retry stays inside the second poll; it does not add a cycle.
  assert_eq!(record.poll_cycles, 2);
  assert_eq!(record.visits(PollJobStatus), 2);
  assert_eq!(harness.jobs.status_calls.load(Ordering::SeqCst), 3);
  assert_eq!(harness.jobs.created.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_inference_error_is_retried() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.inference = FakeInference::answering(vec![Err(transient("model overloaded"))]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-model-retry", recording("recordings/standup.mp4")).await;

  assert_eq!(outcome, RunOutcome::Succeeded);
  assert_eq!(harness.inference.calls(), 2);
  let record = run.cloned();
  assert_eq!(record.retries_in(InvokeModel), 1);
  assert_eq!(record.retries[0].kind, ErrorKind::TransientService);
  assert_eq!(record.visits(InvokeModel), 1);
  let summaries = harness.summaries.messages();
  assert_eq!(summaries.len(), 1);
  assert_eq!(summaries[0].body, FakeInference::SUMMARY);
}

#[tokio::test(start_paused = true)]
async fn test_transient_delivery_error_is_retried_and_delivers_once() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.summaries = RecordingNotifier::failing_first(vec![transient("topic throttled")]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-deliver-retry", recording("recordings/standup.mp4")).await;

  assert_eq!(outcome, RunOutcome::Succeeded);
  assert_eq!(harness.summaries.attempts.load(Ordering::SeqCst), 2);
  assert_eq!(harness.summaries.messages().len(), 1);
  assert!(harness.alerts.messages().is_empty());

  let record = run.cloned();
  assert_eq!(record.retries_in(DeliverResult), 1);
  assert_eq!(record.current_state, Success);
  let receipt: recap::DeliveryReceipt = record.context.require(keys::DELIVERY, Success).unwrap();
  assert_eq!(receipt.message_id, "msg-2");
}

#[tokio::test(start_paused = true)]
async fn test_three_pending_polls_then_completion() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::completing_after(3));
  let orchestrator = harness.orchestrator();
  let started = Instant::now();

  let (run, outcome) = orchestrator.start("run-b3", recording("recordings/standup.mp4")).await;

  assert_eq!(outcome, RunOutcome::Succeeded);
  let record = run.cloned();
  // Three IN_PROGRESS answers, then the COMPLETED one.
  assert_eq!(record.poll_cycles, 4);
  assert_eq!(record.visits(WaitBeforePoll), 4);
  assert_eq!(record.visits(PollJobStatus), 4);
  assert_eq!(harness.jobs.status_calls.load(Ordering::SeqCst), 4);
  assert!(started.elapsed() >= Duration::from_secs(4 * 20));
  assert_eq!(
    record.path()[2..10],
    [
      WaitBeforePoll,
      PollJobStatus,
      WaitBeforePoll,
      PollJobStatus,
      WaitBeforePoll,
      PollJobStatus,
      WaitBeforePoll,
      PollJobStatus,
    ]
  );
  assert_eq!(record.path()[10], FormatTranscript);
  assert!(record.retries.is_empty());
  assert_eq!(harness.summaries.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_transient_errors_exhaust_retries() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.formatter = FakeFormatter::failing_first(vec![transient("503"); 10]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-c2", recording("recordings/sync.mp4")).await;

  let failure = outcome.failure().cloned().unwrap();
  assert_eq!(failure.kind, ErrorKind::TransientService);
  assert!(failure.message.contains("gave up after 4 attempts"));
  assert_eq!(harness.formatter.calls.load(Ordering::SeqCst), 4);
  assert_eq!(run.cloned().retries_in(FormatTranscript), 3);
  assert_eq!(harness.alerts.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_finishing_job_hits_deadline() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::never_finishing());
  let orchestrator = harness.orchestrator();
  let started = Instant::now();

  let (run, outcome) = orchestrator.start("run-d", recording("recordings/marathon.mp4")).await;

  let failure = outcome.failure().cloned().unwrap();
  assert_eq!(failure.kind, ErrorKind::DeadlineExceeded);
  assert!(started.elapsed() <= Duration::from_secs(30 * 60) + Duration::from_secs(1));

  let record = run.cloned();
  // 30 minutes of 20-second waits.
  assert!(record.poll_cycles >= 85 && record.poll_cycles <= 90, "poll cycles: {}", record.poll_cycles);
  assert_eq!(record.visits(FormatTranscript), 0);
  assert_eq!(harness.alerts.messages().len(), 1);
  assert!(harness.alerts.messages()[0].body.contains("DeadlineExceeded"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_job_status_keeps_polling() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::new(
    vec![
      Ok(JobStatus::parse("QUEUED")),
      Ok(JobStatus::parse("PAUSED_FOR_MAINTENANCE")),
      Ok(JobStatus::InProgress),
    ],
    JobStatus::Completed,
  ));
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-unknown", recording("recordings/standup.mp4")).await;

  assert!(outcome.is_success());
  let record = run.cloned();
  assert_eq!(record.poll_cycles, 4);
  assert!(record
    .history
    .iter()
    .any(|t| t.from == PollJobStatus && t.signal == "job:UNKNOWN(PAUSED_FOR_MAINTENANCE)"));
}

#[tokio::test(start_paused = true)]
async fn test_model_rejection_routes_to_failure() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(1));
  harness.inference = FakeInference::answering(vec![Ok(ModelSummary::failed("guardrail intervened"))]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-e", recording("recordings/standup.mp4")).await;

  let failure = outcome.failure().cloned().unwrap();
  assert_eq!(failure.kind, ErrorKind::ModelRejected);
  assert_eq!(failure.message, "guardrail intervened");
  assert_eq!(run.cloned().history.last().map(|t| t.from), Some(CheckModelStatus));
  assert!(harness.summaries.messages().is_empty());
  assert_eq!(harness.alerts.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_definitive_inference_error_becomes_model_rejection() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.inference = FakeInference::answering(vec![Err(StepFailure::validation("prompt too long"))]);
  let orchestrator = harness.orchestrator();

  let (_run, outcome) = orchestrator.start("run-e2", recording("recordings/standup.mp4")).await;

  let failure = outcome.failure().cloned().unwrap();
  assert_eq!(failure.kind, ErrorKind::ModelRejected);
  assert_eq!(failure.message, "prompt too long");
}

#[tokio::test(start_paused = true)]
async fn test_folder_key_fails_validation_without_submitting() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::completing_after(0));
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-v", recording("recordings/")).await;

  assert_eq!(outcome.failure().map(|f| f.kind), Some(ErrorKind::Validation));
  assert_eq!(run.cloned().path(), vec![PrepareInput, Failure]);
  assert_eq!(harness.jobs.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_unit_fails_closed() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.formatter = FakeFormatter::panicking("index out of bounds");
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-panic", recording("recordings/standup.mp4")).await;

  let failure = outcome.failure().cloned().unwrap();
  assert_eq!(failure.kind, ErrorKind::Unclassified);
  assert!(failure.message.contains("index out of bounds"));
  // Unclassified failures are never retried.
  assert_eq!(harness.formatter.calls.load(Ordering::SeqCst), 1);
  assert_eq!(run.current_state(), Failure);
}

#[tokio::test(start_paused = true)]
async fn test_submission_is_idempotent_across_retries() {
  setup_tracing();
  let harness = Harness::new(
    ScriptedJobs::completing_after(0).fail_submit_with(vec![transient("throttled"), transient("throttled")]),
  );
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-idem", recording("recordings/standup.mp4")).await;

  assert!(outcome.is_success());
  assert_eq!(harness.jobs.submit_calls.load(Ordering::SeqCst), 3);
  assert_eq!(harness.jobs.created.lock().len(), 1);
  assert_eq!(run.cloned().retries_in(SubmitJob), 2);
}

#[tokio::test(start_paused = true)]
async fn test_same_recording_yields_same_job_name() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::completing_after(0));
  let orchestrator = harness.orchestrator();

  let (first, _) = orchestrator.start("run-1", recording("recordings/standup.mp4")).await;
  let (second, _) = orchestrator.start("run-2", recording("recordings/standup.mp4")).await;

  let first_name: String = first.read().context.require(keys::JOB_NAME, SubmitJob).unwrap();
  let second_name: String = second.read().context.require(keys::JOB_NAME, SubmitJob).unwrap();
  assert_eq!(first_name, second_name);
  assert_eq!(harness.jobs.created.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failure_is_reported_as_delivery_error() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.summaries = RecordingNotifier::failing_first(vec![StepFailure::validation("recipient unsubscribed")]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-deliver", recording("recordings/standup.mp4")).await;

  let failure = outcome.failure().cloned().unwrap();
  assert_eq!(failure.kind, ErrorKind::Delivery);
  assert!(failure.message.contains("recipient unsubscribed"));
  assert_eq!(run.cloned().history.last().map(|t| t.from), Some(DeliverResult));
  assert_eq!(harness.alerts.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notifier_failure_still_yields_failed_outcome() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::new(vec![], JobStatus::Failed));
  harness.alerts = RecordingNotifier::failing_first(vec![transient("notifier down")]);
  let orchestrator = harness.orchestrator();

  let (run, outcome) = orchestrator.start("run-quiet", recording("recordings/standup.mp4")).await;

  assert_eq!(outcome.failure().map(|f| f.kind), Some(ErrorKind::JobFailed));
  // One attempt, no retry, and the run stays terminal.
  assert_eq!(harness.alerts.attempts.load(Ordering::SeqCst), 1);
  assert!(harness.alerts.messages().is_empty());
  let record = run.cloned();
  assert_eq!(record.current_state, Failure);
  assert!(record.notified);
}

#[tokio::test(start_paused = true)]
async fn test_rerunning_a_terminal_run_changes_nothing() {
  setup_tracing();
  let harness = Harness::new(ScriptedJobs::new(vec![], JobStatus::Failed));
  let orchestrator = harness.orchestrator();

  let (run, first) = orchestrator.start("run-twice", recording("recordings/standup.mp4")).await;
  let history_len = run.read().history.len();
  let second = orchestrator.run(run.clone()).await;

  assert_eq!(first, second);
  assert_eq!(run.read().history.len(), history_len);
  assert_eq!(harness.alerts.messages().len(), 1);
  assert_eq!(run.current_state(), PipelineState::Failure);
}

#[tokio::test(start_paused = true)]
async fn test_short_timeout_bounds_backoff() {
  setup_tracing();
  let mut harness = Harness::new(ScriptedJobs::completing_after(0));
  harness.formatter = FakeFormatter::failing_first(vec![transient("503"); 10]);
  let mut config = test_config();
  config.poll_interval = Duration::from_secs(1);
  config.run_timeout = Duration::from_secs(3);
  let orchestrator = harness.orchestrator_with(config);
  let started = Instant::now();

  let (_run, outcome) = orchestrator.start("run-tight", recording("recordings/standup.mp4")).await;

  assert_eq!(outcome.failure().map(|f| f.kind), Some(ErrorKind::DeadlineExceeded));
  assert!(started.elapsed() <= Duration::from_secs(3));
}
