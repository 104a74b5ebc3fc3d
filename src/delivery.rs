use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::DeliveryError;
use crate::platform::{Deliverer, RecipientId, SourceMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Transient errors back off linearly: `base_delay * attempt`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// Decide the next step after attempt number `attempt` (1-based) failed with `error`.
    pub fn next_action(&self, attempt: u32, error: &DeliveryError) -> NextAction {
        if attempt >= self.max_attempts {
            return NextAction::GiveUp;
        }
        match error {
            DeliveryError::RateLimited(wait) => NextAction::RetryAfter(*wait),
            DeliveryError::Transient(_) => NextAction::RetryAfter(
                self.base_delay
                    .checked_mul(attempt)
                    .unwrap_or(Duration::MAX),
            ),
            DeliveryError::Permanent(_) => NextAction::GiveUp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    Skipped,
}

impl DeliveryOutcome {
    pub fn symbol(self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "✓",
            DeliveryOutcome::Failed => "✗",
            DeliveryOutcome::Skipped => "⊘",
        }
    }
}

/// Record of what happened to one message for one recipient.
///
/// Skipped messages are never offered to recipients, so their records carry
/// no recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub message_id: u64,
    pub recipient: Option<RecipientId>,
    pub outcome: DeliveryOutcome,
    pub attempts: u32,
    pub at: DateTime<Utc>,
    /// Last error seen, or the skip reason
    pub detail: Option<String>,
}

impl DeliveryAttempt {
    pub fn skipped(message_id: u64, recipient: Option<RecipientId>, reason: &str) -> Self {
        Self {
            message_id,
            recipient,
            outcome: DeliveryOutcome::Skipped,
            attempts: 0,
            at: Utc::now(),
            detail: Some(reason.to_string()),
        }
    }
}

/// Send `message` to `recipient`, retrying per `policy`. Never returns an error:
/// the final result is folded into the returned attempt record.
pub async fn deliver<D>(
    deliverer: &D,
    recipient: &RecipientId,
    message: &SourceMessage,
    policy: &RetryPolicy,
) -> DeliveryAttempt
where
    D: Deliverer + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match deliverer.send(recipient, message).await {
            Ok(()) => {
                info!("✓ Forwarded message {} to {}", message.id, recipient);
                return DeliveryAttempt {
                    message_id: message.id,
                    recipient: Some(recipient.clone()),
                    outcome: DeliveryOutcome::Sent,
                    attempts: attempt,
                    at: Utc::now(),
                    detail: None,
                };
            }
            Err(e) => e,
        };

        match policy.next_action(attempt, &error) {
            NextAction::RetryAfter(delay) => {
                warn!(
                    "Attempt {}/{} sending message {} to {} failed ({}); retrying in {:?}",
                    attempt, policy.max_attempts, message.id, recipient, error, delay
                );
                tokio::time::sleep(delay).await;
            }
            NextAction::GiveUp => {
                warn!(
                    "✗ Failed to send message {} to {} after {} attempt(s): {}",
                    message.id, recipient, attempt, error
                );
                return DeliveryAttempt {
                    message_id: message.id,
                    recipient: Some(recipient.clone()),
                    outcome: DeliveryOutcome::Failed,
                    attempts: attempt,
                    at: Utc::now(),
                    detail: Some(error.to_string()),
                };
            }
        }
    }
}
