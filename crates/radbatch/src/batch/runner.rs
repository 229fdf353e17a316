use chrono::Utc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::engine::FeatureEngine;
use crate::normalize::{self, ArrayPolicy};
use crate::params::ParameterSet;
use crate::sink::{DocumentSink, DocumentStore, FileSink};
use crate::worklist::WorkItem;

use super::config::BatchConfig;
use super::progress::{
    ItemOutcome, ItemReport, ProgressEvent, ProgressReporter, SkipReason, StoreOutcome,
};

/// Everything one batch run owns: the worklist, the shared read-only
/// parameter set, the engine, and the sinks. Created fresh per invocation
/// and consumed by [`run`] — no state survives into the next batch.
///
/// [`run`]: BatchRun::run
pub struct BatchRun {
    run_id: String,
    items: Vec<WorkItem>,
    params: ParameterSet,
    engine: Box<dyn FeatureEngine>,
    file_sink: FileSink,
    store: Option<Box<dyn DocumentSink>>,
    array_policy: ArrayPolicy,
}

/// Outcome counts for one completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub file_failures: usize,
    pub store_failures: usize,
}

impl BatchRun {
    /// Production constructor: wires the sinks from a validated
    /// configuration. A database connection that cannot be opened here —
    /// after pre-flight validation already passed — degrades the store to a
    /// no-op for the whole run rather than failing the batch.
    pub fn from_config(
        items: Vec<WorkItem>,
        params: ParameterSet,
        config: &BatchConfig,
        engine: Box<dyn FeatureEngine>,
    ) -> Self {
        let store: Option<Box<dyn DocumentSink>> = if config.use_database {
            match DocumentStore::connect(
                &config.connection_string,
                &config.database,
                &config.collection,
            ) {
                Ok(store) => Some(Box::new(store)),
                Err(e) => {
                    warn!("Document store unavailable, continuing file-only: {e}");
                    None
                }
            }
        } else {
            None
        };

        Self::new(
            items,
            params,
            engine,
            FileSink::new(&config.output_directory),
            store,
        )
        .with_array_policy(config.array_policy)
    }

    /// Constructor with injected sub-components.
    pub fn new(
        items: Vec<WorkItem>,
        params: ParameterSet,
        engine: Box<dyn FeatureEngine>,
        file_sink: FileSink,
        store: Option<Box<dyn DocumentSink>>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            items,
            params,
            engine,
            file_sink,
            store,
            array_policy: ArrayPolicy::default(),
        }
    }

    pub fn with_array_policy(mut self, policy: ArrayPolicy) -> Self {
        self.array_policy = policy;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drives the whole worklist in order, one item at a time. Every
    /// per-item failure funnels into that item's outcome; nothing here is
    /// fatal. Progress is reported after every item against the fixed
    /// total, the store is closed best-effort on exhaustion, and completion
    /// is signalled exactly once.
    pub fn run(mut self, progress: &dyn ProgressReporter) -> BatchSummary {
        let total = self.items.len();
        let _span = info_span!("batch", run_id = %self.run_id, total).entered();
        info!("Starting batch of {} items", total);

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        let items = std::mem::take(&mut self.items);
        for (position, item) in items.into_iter().enumerate() {
            let outcome = self.process_item(&item);

            match &outcome {
                ItemOutcome::Completed {
                    file_error, stored, ..
                } => {
                    summary.completed += 1;
                    if file_error.is_some() {
                        summary.file_failures += 1;
                    }
                    if matches!(stored, StoreOutcome::Failed(_)) {
                        summary.store_failures += 1;
                    }
                }
                ItemOutcome::Skipped { .. } => summary.skipped += 1,
            }

            progress.report(ProgressEvent::Item(ItemReport {
                index: position + 1,
                total,
                id: item.id,
                volume_path: item.volume_path,
                mask_path: item.mask_path,
                outcome,
                timestamp: Utc::now(),
            }));
        }

        if let Some(store) = self.store.take() {
            store.close();
        }

        info!(
            "Batch finished: {} completed, {} skipped",
            summary.completed, summary.skipped
        );
        progress.report(ProgressEvent::BatchCompleted);

        summary
    }

    fn process_item(&self, item: &WorkItem) -> ItemOutcome {
        let _span = info_span!("item", id = %item.id).entered();

        // Existence is checked at the moment the item is reached, not
        // pre-validated for the whole worklist up front.
        let volume_missing = !item.volume_path.exists();
        let mask_missing = !item.mask_path.exists();
        if volume_missing || mask_missing {
            let reason = SkipReason::MissingInput {
                volume_missing,
                mask_missing,
            };
            warn!("Skipping {}: {}", item.id, reason);
            return ItemOutcome::Skipped { reason };
        }

        let raw = match self
            .engine
            .extract(&item.volume_path, &item.mask_path, &self.params)
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Extraction failed for {}: {}", item.id, e);
                return ItemOutcome::Skipped {
                    reason: SkipReason::ExtractionFailed {
                        error: e.to_string(),
                    },
                };
            }
        };

        let document = match normalize::normalize_with(raw, &item.id, self.array_policy) {
            Ok(document) => document,
            Err(e) => {
                debug!(
                    "Partial document for {}: {} fields converted before failure",
                    item.id,
                    e.partial.len()
                );
                warn!("Normalization failed for {}: {}", item.id, e);
                return ItemOutcome::Skipped {
                    reason: SkipReason::NormalizationFailed {
                        error: e.to_string(),
                    },
                };
            }
        };

        // The two sink attempts are independent: a failed file write must
        // not suppress the store attempt, and vice versa.
        let (document_path, file_error) = match self.file_sink.write(&document) {
            Ok(path) => {
                debug!("Wrote {}", path.display());
                (Some(path), None)
            }
            Err(e) => {
                warn!("File sink failed for {}: {}", item.id, e);
                (None, Some(e.to_string()))
            }
        };

        let stored = match &self.store {
            None => StoreOutcome::Disabled,
            Some(store) => match store.insert(&document) {
                Ok(()) => StoreOutcome::Inserted,
                Err(e) => {
                    warn!("Document store insert failed for {}: {}", item.id, e);
                    StoreOutcome::Failed(e.to_string())
                }
            },
        };

        ItemOutcome::Completed {
            document_path,
            file_error,
            stored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RawResult, RawValue};
    use crate::error::EngineError;
    use crate::sink::StoreError;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Engine stub returning a fixed raw result, or a failure for ids the
    /// test marks as poisoned (matched on the volume filename).
    struct StubEngine {
        fail_for: Vec<String>,
        result: fn() -> RawResult,
    }

    impl StubEngine {
        fn ok() -> Self {
            Self {
                fail_for: vec![],
                result: default_raw,
            }
        }

        fn failing_for(names: &[&str]) -> Self {
            Self {
                fail_for: names.iter().map(|s| s.to_string()).collect(),
                result: default_raw,
            }
        }

        fn with_result(result: fn() -> RawResult) -> Self {
            Self {
                fail_for: vec![],
                result,
            }
        }
    }

    fn default_raw() -> RawResult {
        let mut raw = RawResult::new();
        raw.insert(
            "original_firstorder_Mean".to_string(),
            RawValue::Scalar(12.34),
        );
        raw
    }

    impl FeatureEngine for StubEngine {
        fn extract(
            &self,
            volume_path: &Path,
            _mask_path: &Path,
            _params: &ParameterSet,
        ) -> Result<RawResult, EngineError> {
            let name = volume_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if self.fail_for.contains(&name) {
                return Err(EngineError::Failed("synthetic engine failure".to_string()));
            }
            Ok((self.result)())
        }
    }

    /// Store stub recording inserted ids; fails for the configured ids.
    struct RecordingStore {
        inserted: Mutex<Vec<String>>,
        fail_for: Vec<String>,
        closed: AtomicUsize,
    }

    impl RecordingStore {
        fn new(fail_for: &[&str]) -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                inserted: Mutex::new(vec![]),
                fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
                closed: AtomicUsize::new(0),
            })
        }
    }

    impl DocumentSink for std::sync::Arc<RecordingStore> {
        fn insert(&self, document: &crate::normalize::Document) -> Result<(), StoreError> {
            if self.fail_for.contains(&document.id().to_string()) {
                return Err(StoreError::Rejected("synthetic insert failure".to_string()));
            }
            self.inserted
                .lock()
                .expect("store lock")
                .push(document.id().to_string());
            Ok(())
        }

        fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _tmp: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        Fixture {
            _tmp: tmp,
            input,
            output,
        }
    }

    /// Creates volume+mask files for `id` and returns the work item.
    fn present_item(fx: &Fixture, id: &str) -> WorkItem {
        let volume = fx.input.join(format!("{id}-volume.nrrd"));
        let mask = fx.input.join(format!("{id}-mask.nrrd"));
        std::fs::write(&volume, b"volume").unwrap();
        std::fs::write(&mask, b"mask").unwrap();
        WorkItem::new(id, volume, mask).unwrap()
    }

    fn collect_events(
        run: BatchRun,
    ) -> (BatchSummary, Vec<ProgressEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let progress = super::super::progress::ChannelProgress::new(sender);
        let summary = run.run(&progress);
        let events: Vec<ProgressEvent> = receiver.try_iter().collect();
        (summary, events)
    }

    #[test]
    fn test_single_item_file_only() {
        let fx = fixture();
        let item = present_item(&fx, "p1");

        let run = BatchRun::new(
            vec![item],
            ParameterSet::default(),
            Box::new(StubEngine::ok()),
            FileSink::new(&fx.output),
            None,
        );
        let (summary, events) = collect_events(run);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 0);

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(fx.output.join("p1.json")).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"_ID_": "p1", "original_firstorder_Mean": 12.34})
        );

        assert_eq!(events.len(), 2);
        match &events[0] {
            ProgressEvent::Item(report) => {
                assert_eq!(report.index, 1);
                assert_eq!(report.total, 1);
                assert_eq!(report.id, "p1");
                assert!(matches!(
                    report.outcome,
                    ItemOutcome::Completed {
                        stored: StoreOutcome::Disabled,
                        ..
                    }
                ));
            }
            other => panic!("Expected Item event, got {:?}", other),
        }
        assert!(matches!(events[1], ProgressEvent::BatchCompleted));
    }

    #[test]
    fn test_missing_volume_skips_without_extraction() {
        let fx = fixture();
        let mask = fx.input.join("m1.nrrd");
        std::fs::write(&mask, b"mask").unwrap();
        let item = WorkItem::new("p1", fx.input.join("absent.nrrd"), mask).unwrap();

        let run = BatchRun::new(
            vec![item],
            ParameterSet::default(),
            Box::new(StubEngine::ok()),
            FileSink::new(&fx.output),
            None,
        );
        let (summary, events) = collect_events(run);

        assert_eq!(summary.skipped, 1);
        assert!(!fx.output.join("p1.json").exists());
        match &events[0] {
            ProgressEvent::Item(report) => assert!(matches!(
                report.outcome,
                ItemOutcome::Skipped {
                    reason: SkipReason::MissingInput {
                        volume_missing: true,
                        mask_missing: false,
                    }
                }
            )),
            other => panic!("Expected Item event, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_failure_skips_item_but_not_batch() {
        let fx = fixture();
        let bad = present_item(&fx, "bad");
        let good = present_item(&fx, "good");

        let run = BatchRun::new(
            vec![bad, good],
            ParameterSet::default(),
            Box::new(StubEngine::failing_for(&["bad-volume.nrrd"])),
            FileSink::new(&fx.output),
            None,
        );
        let (summary, events) = collect_events(run);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!fx.output.join("bad.json").exists());
        assert!(fx.output.join("good.json").exists());
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_normalization_failure_skips_item() {
        let fx = fixture();
        let item = present_item(&fx, "p1");

        fn array_raw() -> RawResult {
            let mut raw = RawResult::new();
            raw.insert("hist".to_string(), RawValue::Array(vec![1.0, 2.0]));
            raw
        }

        let run = BatchRun::new(
            vec![item],
            ParameterSet::default(),
            Box::new(StubEngine::with_result(array_raw)),
            FileSink::new(&fx.output),
            None,
        );
        let (summary, events) = collect_events(run);

        assert_eq!(summary.skipped, 1);
        assert!(!fx.output.join("p1.json").exists());
        match &events[0] {
            ProgressEvent::Item(report) => assert!(matches!(
                report.outcome,
                ItemOutcome::Skipped {
                    reason: SkipReason::NormalizationFailed { .. }
                }
            )),
            other => panic!("Expected Item event, got {:?}", other),
        }
    }

    #[test]
    fn test_first_policy_accepts_multi_element_array() {
        let fx = fixture();
        let item = present_item(&fx, "p1");

        fn array_raw() -> RawResult {
            let mut raw = RawResult::new();
            raw.insert("hist".to_string(), RawValue::Array(vec![7.0, 8.0]));
            raw
        }

        let run = BatchRun::new(
            vec![item],
            ParameterSet::default(),
            Box::new(StubEngine::with_result(array_raw)),
            FileSink::new(&fx.output),
            None,
        )
        .with_array_policy(ArrayPolicy::First);
        let (summary, _events) = collect_events(run);

        assert_eq!(summary.completed, 1);
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(fx.output.join("p1.json")).unwrap()).unwrap();
        assert_eq!(written["hist"], serde_json::json!(7.0));
    }

    #[test]
    fn test_file_sink_failure_does_not_block_store() {
        let fx = fixture();
        let item = present_item(&fx, "p1");
        let store = RecordingStore::new(&[]);

        // Point the file sink at a path that is a file, not a directory.
        let blocked = fx.output.join("blocked");
        std::fs::write(&blocked, b"blocker").unwrap();

        let run = BatchRun::new(
            vec![item],
            ParameterSet::default(),
            Box::new(StubEngine::ok()),
            FileSink::new(&blocked),
            Some(Box::new(std::sync::Arc::clone(&store))),
        );
        let (summary, events) = collect_events(run);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.file_failures, 1);
        assert_eq!(
            store.inserted.lock().unwrap().as_slice(),
            &["p1".to_string()]
        );
        match &events[0] {
            ProgressEvent::Item(report) => match &report.outcome {
                ItemOutcome::Completed {
                    document_path,
                    file_error,
                    stored,
                } => {
                    assert!(document_path.is_none());
                    assert!(file_error.is_some());
                    assert_eq!(stored, &StoreOutcome::Inserted);
                }
                other => panic!("Expected Completed, got {:?}", other),
            },
            other => panic!("Expected Item event, got {:?}", other),
        }
    }

    #[test]
    fn test_store_failure_isolated_per_item() {
        let fx = fixture();
        let first = present_item(&fx, "p1");
        let second = present_item(&fx, "p2");
        let store = RecordingStore::new(&["p1"]);

        let run = BatchRun::new(
            vec![first, second],
            ParameterSet::default(),
            Box::new(StubEngine::ok()),
            FileSink::new(&fx.output),
            Some(Box::new(std::sync::Arc::clone(&store))),
        );
        let (summary, _events) = collect_events(run);

        // Item p1's insert failed, p2's still went through on the same
        // connection; both documents hit the file sink.
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.store_failures, 1);
        assert_eq!(
            store.inserted.lock().unwrap().as_slice(),
            &["p2".to_string()]
        );
        assert!(fx.output.join("p1.json").exists());
        assert!(fx.output.join("p2.json").exists());
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_worklist_completes_immediately() {
        let fx = fixture();
        let run = BatchRun::new(
            vec![],
            ParameterSet::default(),
            Box::new(StubEngine::ok()),
            FileSink::new(&fx.output),
            None,
        );
        let (summary, events) = collect_events(run);

        assert_eq!(summary, BatchSummary::default());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::BatchCompleted));
        assert_eq!(std::fs::read_dir(&fx.output).unwrap().count(), 0);
    }

    #[test]
    fn test_progress_order_and_monotonic_index() {
        let fx = fixture();
        let items: Vec<WorkItem> = (1..=4)
            .map(|n| present_item(&fx, &format!("p{n}")))
            .collect();

        let run = BatchRun::new(
            items,
            ParameterSet::default(),
            Box::new(StubEngine::ok()),
            FileSink::new(&fx.output),
            None,
        );
        let (_summary, events) = collect_events(run);

        let reports: Vec<&ItemReport> = events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Item(report) => Some(report),
                ProgressEvent::BatchCompleted => None,
            })
            .collect();
        assert_eq!(reports.len(), 4);
        for (position, report) in reports.iter().enumerate() {
            assert_eq!(report.index, position + 1);
            assert_eq!(report.total, 4);
            assert_eq!(report.id, format!("p{}", position + 1));
        }
        assert!(matches!(events.last(), Some(ProgressEvent::BatchCompleted)));
    }

    #[test]
    fn test_documents_written_equals_total_minus_skips() {
        let fx = fixture();
        let mut items = vec![
            present_item(&fx, "p1"),
            present_item(&fx, "p2"),
            present_item(&fx, "p3"),
        ];
        // p4's files never exist.
        items.push(
            WorkItem::new(
                "p4",
                fx.input.join("nope-v.nrrd"),
                fx.input.join("nope-m.nrrd"),
            )
            .unwrap(),
        );

        let run = BatchRun::new(
            items,
            ParameterSet::default(),
            Box::new(StubEngine::failing_for(&["p2-volume.nrrd"])),
            FileSink::new(&fx.output),
            None,
        );
        let (summary, _events) = collect_events(run);

        let written = std::fs::read_dir(&fx.output).unwrap().count();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.skipped, 2);
        assert_eq!(written, summary.total - summary.skipped);
        assert_eq!(written, summary.completed);
    }
}
