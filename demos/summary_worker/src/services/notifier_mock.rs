// demos/summary_worker/src/services/notifier_mock.rs
use async_trait::async_trait;
use chrono::Utc;
use recap::{DeliveryReceipt, Notifier, StepFailure, StepResult};
use tracing::info;

/// Logs messages instead of emailing them.
pub struct MockNotifier {
  pub recipient: String,
}

#[async_trait]
impl Notifier for MockNotifier {
  async fn send(&self, message: &str, subject: Option<&str>) -> StepResult<DeliveryReceipt> {
    let subject = subject.unwrap_or("(no subject)");
    info!("Simulating sending notification: To='{}', Subject='{}'", self.recipient, subject);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await; // Simulate network latency

    if subject.to_lowercase().contains("fail_test") {
      tracing::warn!("Simulated notification failure for subject: {}", subject);
      return Err(StepFailure::delivery("Simulated notification send failure"));
    }

    let body_preview = message.chars().take(50).collect::<String>() + "...";
    let message_id = format!("mock_notification_{}", uuid::Uuid::new_v4());
    info!("Mock notification sent. Message ID: {}, Preview: {:?}", message_id, body_preview);

    Ok(DeliveryReceipt {
      message_id,
      delivered_at: Utc::now(),
    })
  }
}
