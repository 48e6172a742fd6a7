// demos/summary_worker/src/services/transcribe_mock.rs
use async_trait::async_trait;
use rand_core::{OsRng, RngCore};
use recap::{JobClient, JobStatus, JobStatusReport, StepFailure, StepResult, SubmitJobRequest, SubmittedJob};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug)]
struct MockJob {
  request: SubmitJobRequest,
  polls_seen: usize,
}

/// In-memory speech-to-text job service.
///
/// Every job reports IN_PROGRESS for `polls_until_done` polls and then
/// COMPLETED. Recordings whose key contains "corrupt" end up FAILED.
/// A share of calls fails with a throttling error to exercise retries.
pub struct MockTranscribeService {
  jobs: Mutex<HashMap<String, MockJob>>,
  polls_until_done: usize,
  throttle_percent: u32,
}

impl MockTranscribeService {
  pub fn new(polls_until_done: usize, throttle_percent: u32) -> Self {
    Self {
      jobs: Mutex::new(HashMap::new()),
      polls_until_done,
      throttle_percent,
    }
  }

  fn maybe_throttle(&self, operation: &str) -> StepResult<()> {
    if self.throttle_percent > 0 && OsRng.next_u32() % 100 < self.throttle_percent {
      warn!("Simulated throttling on {}", operation);
      return Err(StepFailure::transient(format!("{operation}: rate exceeded")));
    }
    Ok(())
  }
}

#[async_trait]
impl JobClient for MockTranscribeService {
  async fn submit(&self, request: &SubmitJobRequest) -> StepResult<SubmittedJob> {
    tokio::time::sleep(std::time::Duration::from_millis(30)).await; // Simulate network latency
    self.maybe_throttle("StartTranscriptionJob")?;

    let mut jobs = self.jobs.lock().await;
    if jobs.contains_key(&request.job_name) {
      info!("Job '{}' already exists; returning it.", request.job_name);
    } else {
      info!(
        "Simulating transcription job start: Job='{}', Media='{}', Output='{}/{}'",
        request.job_name, request.media_uri, request.output_bucket, request.output_key
      );
      jobs.insert(
        request.job_name.clone(),
        MockJob {
          request: request.clone(),
          polls_seen: 0,
        },
      );
    }
    Ok(SubmittedJob {
      job_name: request.job_name.clone(),
    })
  }

  async fn get_status(&self, job_name: &str) -> StepResult<JobStatusReport> {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    self.maybe_throttle("GetTranscriptionJob")?;

    let mut jobs = self.jobs.lock().await;
    let job = jobs
      .get_mut(job_name)
      .ok_or_else(|| StepFailure::validation(format!("transcription job '{job_name}' does not exist")))?;
    job.polls_seen += 1;

    let (status, output_locator, failure_reason) = if job.request.media_uri.contains("corrupt") {
      (JobStatus::Failed, None, Some("The media format could not be detected.".to_string()))
    } else if job.polls_seen > self.polls_until_done {
      let output = format!("s3://{}/{}", job.request.output_bucket, job.request.output_key);
      (JobStatus::Completed, Some(output), None)
    } else {
      (JobStatus::InProgress, None, None)
    };

    info!("Mock job '{}' polled ({}): {}", job_name, job.polls_seen, status);
    Ok(JobStatusReport {
      job_name: job_name.to_string(),
      status,
      output_locator,
      failure_reason,
    })
  }
}
