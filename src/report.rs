//! Plain-text rendering of a run for the terminal.

use std::fmt::Write;

use crate::forwarder::RunReport;

/// One row per delivery record, then the totals.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let s = &report.summary;

    if report.attempts.is_empty() {
        out.push_str("No new messages to forward\n");
    } else {
        let _ = writeln!(
            out,
            "{:<3} {:>12}  {:<24} {:>8}  detail",
            "", "message", "recipient", "attempts"
        );
        for a in &report.attempts {
            let recipient = a
                .recipient
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<3} {:>12}  {:<24} {:>8}  {}",
                a.outcome.symbol(),
                a.message_id,
                recipient,
                a.attempts,
                a.detail.as_deref().unwrap_or("")
            );
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "Sent: {}  Skipped: {}  Failed: {}",
        s.sent, s.skipped, s.failed
    );

    let cursor_line = if report.dry_run {
        format!("Cursor: {} (dry run, would move to {})", s.previous_cursor, s.cursor)
    } else if s.cursor != s.previous_cursor && !s.cursor_saved {
        format!("Cursor: {} (failed to save {})", s.previous_cursor, s.cursor)
    } else if s.cursor != s.previous_cursor {
        format!("Cursor: {} -> {}", s.previous_cursor, s.cursor)
    } else {
        format!("Cursor: {} (unchanged)", s.cursor)
    };
    out.push_str(&cursor_line);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryAttempt, DeliveryOutcome};
    use crate::forwarder::RunSummary;
    use crate::platform::RecipientId;
    use chrono::Utc;

    fn sent(id: u64, to: &str) -> DeliveryAttempt {
        DeliveryAttempt {
            message_id: id,
            recipient: Some(RecipientId::new(to)),
            outcome: DeliveryOutcome::Sent,
            attempts: 1,
            at: Utc::now(),
            detail: None,
        }
    }

    #[test]
    fn test_render_empty_run() {
        let report = RunReport {
            summary: RunSummary::default(),
            attempts: vec![],
            dry_run: false,
        };
        let out = render(&report);
        assert!(out.contains("No new messages to forward"));
        assert!(out.contains("Sent: 0  Skipped: 0  Failed: 0"));
        assert!(out.contains("Cursor: 0 (unchanged)"));
    }

    #[test]
    fn test_render_rows_and_cursor_move() {
        let report = RunReport {
            summary: RunSummary {
                sent: 2,
                skipped: 1,
                previous_cursor: 100,
                cursor: 105,
                cursor_saved: true,
                ..RunSummary::default()
            },
            attempts: vec![
                sent(101, "A"),
                DeliveryAttempt::skipped(103, None, "poll"),
                sent(105, "A"),
            ],
            dry_run: false,
        };
        let out = render(&report);
        assert!(out.contains("Cursor: 100 -> 105"));
        assert!(out.lines().any(|l| l.contains("⊘") && l.contains("103") && l.contains("poll")));
        assert!(out.contains("Sent: 2  Skipped: 1  Failed: 0"));
    }

    #[test]
    fn test_render_unsaved_cursor() {
        let report = RunReport {
            summary: RunSummary {
                sent: 1,
                previous_cursor: 10,
                cursor: 11,
                cursor_saved: false,
                ..RunSummary::default()
            },
            attempts: vec![sent(11, "A")],
            dry_run: false,
        };
        assert!(render(&report).contains("Cursor: 10 (failed to save 11)"));
    }
}
