// recap/src/units/delivery.rs

//! Default Deliver-Result unit and the failure report sent on the Failure path.

use crate::core::state::PipelineState;
use crate::error::{ErrorKind, StepResult};
use crate::units::{DeliverResult, DeliveryReceipt, Notifier, SummaryPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{event, Level};

/// Publishes summaries through a `Notifier`.
pub struct NotifierDelivery<N: Notifier + ?Sized> {
  notifier: Arc<N>,
}

impl<N: Notifier + ?Sized> NotifierDelivery<N> {
  pub fn new(notifier: Arc<N>) -> Self {
    Self { notifier }
  }
}

#[async_trait]
impl<N: Notifier + ?Sized> DeliverResult for NotifierDelivery<N> {
  async fn deliver(&self, payload: &SummaryPayload) -> StepResult<DeliveryReceipt> {
    let subject = format!("Recording summary: {}", payload.source_file_name);
    let receipt = self.notifier.send(&payload.summary_text, Some(&subject)).await?;
    event!(Level::INFO, run_id = %payload.run_id, message_id = %receipt.message_id, "Summary delivered.");
    Ok(receipt)
  }
}

/// What a human receives when a run fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
  #[serde(rename = "RunId")]
  pub run_id: String,
  #[serde(rename = "ErrorKind")]
  pub error_kind: ErrorKind,
  #[serde(rename = "Error")]
  pub error_detail: String,
  #[serde(rename = "FailedState")]
  pub failed_state: PipelineState,
  #[serde(rename = "Link")]
  pub link_to_run_history: String,
}

impl FailureReport {
  pub fn subject(&self) -> String {
    format!("Recording summary failed ({})", self.error_kind)
  }

  /// JSON body of the notification.
  pub fn to_message(&self) -> String {
    serde_json::to_string_pretty(self).unwrap_or_else(|_| {
      format!(
        "Error: {}\nErrorKind: {}\nFailedState: {}\nRunId: {}\nLink: {}",
        self.error_detail, self.error_kind, self.failed_state, self.run_id, self.link_to_run_history
      )
    })
  }
}
