use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::classify::classify;
use crate::cursor::CursorStore;
use crate::delivery::{deliver, DeliveryAttempt, DeliveryOutcome, RetryPolicy};
use crate::error::RunError;
use crate::platform::{RecipientId, SourceMessage, Transport};

/// How a single message is fanned out to the recipients.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// One recipient after another, in configured order
    #[default]
    Sequential,
    /// All recipients at once; the next message waits for every one of them
    Parallel,
}

/// Everything the forwarder needs to know for one run.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    pub source_chat: i64,
    pub recipients: Vec<RecipientId>,
    /// How many of the most recent source messages to look at
    pub window: usize,
    pub retry: RetryPolicy,
    pub fanout: FanoutMode,
    /// Classify and report, but send nothing and keep the cursor where it is
    pub dry_run: bool,
}

/// Stages of a run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connected,
    CursorLoaded,
    Fetched,
    NoNewWork,
    Dispatching,
    CursorAdvanced,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Messages returned by the source
    pub fetched: usize,
    /// Of those, messages newer than the cursor
    pub new_messages: usize,
    pub previous_cursor: u64,
    pub cursor: u64,
    /// False when the new cursor could not be written (or in a dry run)
    pub cursor_saved: bool,
}

/// Summary plus every per-message, per-recipient record of the run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub attempts: Vec<DeliveryAttempt>,
    pub dry_run: bool,
}

/// Accumulates delivery records for one run.
#[derive(Debug)]
struct RunLedger {
    summary: RunSummary,
    attempts: Vec<DeliveryAttempt>,
}

impl RunLedger {
    fn new(previous_cursor: u64) -> Self {
        Self {
            summary: RunSummary {
                previous_cursor,
                cursor: previous_cursor,
                ..RunSummary::default()
            },
            attempts: Vec::new(),
        }
    }

    fn record(&mut self, attempt: DeliveryAttempt) {
        match attempt.outcome {
            DeliveryOutcome::Sent => self.summary.sent += 1,
            DeliveryOutcome::Failed => self.summary.failed += 1,
            DeliveryOutcome::Skipped => self.summary.skipped += 1,
        }
        self.attempts.push(attempt);
    }

    fn finish(self, dry_run: bool) -> RunReport {
        RunReport {
            summary: self.summary,
            attempts: self.attempts,
            dry_run,
        }
    }
}

/// Drives one forwarding run: cursor in, window fetched, new messages
/// fanned out oldest first, cursor out.
pub struct Forwarder<'a, T: ?Sized, C: ?Sized> {
    transport: &'a T,
    cursor: &'a C,
    settings: &'a ForwardSettings,
}

impl<'a, T, C> Forwarder<'a, T, C>
where
    T: Transport + ?Sized,
    C: CursorStore + ?Sized,
{
    pub fn new(transport: &'a T, cursor: &'a C, settings: &'a ForwardSettings) -> Self {
        Self {
            transport,
            cursor,
            settings,
        }
    }

    /// Run once. The session is closed on every path out, including a panic
    /// while dispatching.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut state = RunState::Idle;

        self.transport.connect().await.map_err(RunError::Connect)?;
        enter(&mut state, RunState::Connected);

        let outcome = AssertUnwindSafe(self.run_connected(&mut state))
            .catch_unwind()
            .await;

        self.transport.disconnect().await;
        enter(&mut state, RunState::Disconnected);

        match outcome {
            Ok(result) => result,
            Err(_) => {
                error!("Run aborted by a panic; cursor left untouched");
                Err(RunError::Panicked)
            }
        }
    }

    async fn run_connected(&self, state: &mut RunState) -> Result<RunReport, RunError> {
        let previous = self.cursor.load();
        enter(state, RunState::CursorLoaded);

        info!(
            "Checking for new messages in chat {}...",
            self.settings.source_chat
        );
        let window = self
            .transport
            .fetch_recent(self.settings.source_chat, self.settings.window)
            .await
            .map_err(RunError::Fetch)?;
        enter(state, RunState::Fetched);

        let mut ledger = RunLedger::new(previous);
        ledger.summary.fetched = window.len();

        let head = window.iter().map(|m| m.id).max().unwrap_or(previous);
        let mut fresh: Vec<&SourceMessage> = window.iter().filter(|m| m.id > previous).collect();

        if fresh.is_empty() {
            enter(state, RunState::NoNewWork);
            info!("No new messages to forward");
            // Everything fetched is already handled; release it so stale or
            // foreign updates cannot hide newer source messages next run.
            if !self.settings.dry_run {
                self.transport.acknowledge(previous).await;
            }
            return Ok(ledger.finish(self.settings.dry_run));
        }

        enter(state, RunState::Dispatching);
        ledger.summary.new_messages = fresh.len();
        info!("Found {} new message(s)", fresh.len());
        info!(
            "Will forward to {} recipient(s)",
            self.settings.recipients.len()
        );

        // Source order is newest first; recipients must see them as they were posted.
        fresh.sort_by_key(|m| m.id);
        for message in fresh {
            let class = classify(message);
            if !class.is_eligible() {
                info!("⊘ Skipped {} message {}", class.reason(), message.id);
                ledger.record(DeliveryAttempt::skipped(message.id, None, class.reason()));
                continue;
            }
            self.fan_out(message, &mut ledger).await;
        }

        // Advance past the whole window, delivered or not.
        let next = previous.max(head);
        ledger.summary.cursor = next;

        if self.settings.dry_run {
            info!("Dry run: cursor would move from {} to {}", previous, next);
            return Ok(ledger.finish(true));
        }

        match self.cursor.save(next) {
            Ok(()) => {
                ledger.summary.cursor_saved = true;
                enter(state, RunState::CursorAdvanced);
                info!("Updated last message ID to: {}", next);
                self.transport.acknowledge(next).await;
            }
            Err(e) => {
                error!("Failed to persist cursor {}: {:#}", next, e);
            }
        }

        Ok(ledger.finish(false))
    }

    async fn fan_out(&self, message: &SourceMessage, ledger: &mut RunLedger) {
        let recipients = &self.settings.recipients;
        let policy = &self.settings.retry;

        if self.settings.dry_run {
            for recipient in recipients {
                info!(
                    "Dry run: would send message {} to {}: {}",
                    message.id,
                    recipient,
                    message.preview.as_deref().unwrap_or("<media>")
                );
                ledger.record(DeliveryAttempt::skipped(
                    message.id,
                    Some(recipient.clone()),
                    "dry run",
                ));
            }
            return;
        }

        match self.settings.fanout {
            FanoutMode::Sequential => {
                for recipient in recipients {
                    let attempt = deliver(self.transport, recipient, message, policy).await;
                    ledger.record(attempt);
                }
            }
            FanoutMode::Parallel => {
                let attempts = join_all(
                    recipients
                        .iter()
                        .map(|recipient| deliver(self.transport, recipient, message, policy)),
                )
                .await;
                for attempt in attempts {
                    ledger.record(attempt);
                }
            }
        }
    }
}

fn enter(state: &mut RunState, next: RunState) {
    debug!("Run state: {:?} -> {:?}", state, next);
    *state = next;
}
