//! Progress reporting surface.
//!
//! The runner pushes one event per item plus a terminal completion event.
//! Consumers sit behind the [`ProgressReporter`] trait; the shipped
//! implementations deliver to a channel or discard.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why an item produced no document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingInput {
        volume_missing: bool,
        mask_missing: bool,
    },
    ExtractionFailed {
        error: String,
    },
    NormalizationFailed {
        error: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingInput {
                volume_missing,
                mask_missing,
            } => match (*volume_missing, *mask_missing) {
                (true, true) => write!(f, "volume and mask files missing"),
                (true, false) => write!(f, "volume file missing"),
                _ => write!(f, "mask file missing"),
            },
            SkipReason::ExtractionFailed { error } => write!(f, "extraction failed: {error}"),
            SkipReason::NormalizationFailed { error } => {
                write!(f, "normalization failed: {error}")
            }
        }
    }
}

/// Outcome of the document store attempt for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    /// No store configured (or it degraded to a no-op for this run).
    Disabled,
    Inserted,
    Failed(String),
}

/// Final state of one work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Extraction and normalization succeeded; the sink attempts ran. A
    /// failed file write shows up as `file_error` with no `document_path`,
    /// and does not suppress the store attempt.
    Completed {
        document_path: Option<PathBuf>,
        file_error: Option<String>,
        stored: StoreOutcome,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// One per-item progress report. `index` is 1-based and strictly
/// increasing; `total` is fixed at batch start and never recomputed.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub total: usize,
    pub id: String,
    pub volume_path: PathBuf,
    pub mask_path: PathBuf,
    pub outcome: ItemOutcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Item(ItemReport),
    /// Emitted exactly once, strictly after the last item's outcome and
    /// after sink teardown.
    BatchCompleted,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Delivers events over a channel to the submitting side.
pub struct ChannelProgress {
    sender: crossbeam_channel::Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: crossbeam_channel::Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        // A dropped receiver must not fail the batch.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::MissingInput {
            volume_missing: true,
            mask_missing: false,
        };
        assert_eq!(reason.to_string(), "volume file missing");

        let reason = SkipReason::ExtractionFailed {
            error: "bad volume".to_string(),
        };
        assert_eq!(reason.to_string(), "extraction failed: bad volume");
    }

    #[test]
    fn test_channel_progress_delivers_in_order() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let progress = ChannelProgress::new(sender);

        progress.report(ProgressEvent::BatchCompleted);
        assert!(matches!(
            receiver.try_recv(),
            Ok(ProgressEvent::BatchCompleted)
        ));
    }

    #[test]
    fn test_channel_progress_survives_dropped_receiver() {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        drop(receiver);

        let progress = ChannelProgress::new(sender);
        progress.report(ProgressEvent::BatchCompleted);
    }
}
