//! Background execution of batch runs.
//!
//! A batch executes on a single dedicated thread, off the interactive
//! control path, with progress delivered over a channel. Exactly one batch
//! may be in flight at a time; a second submission is refused until the
//! current one signals completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver};
use log::{error, info};

use crate::batch::{BatchConfig, BatchError, BatchRun, BatchSummary, ChannelProgress, ProgressEvent};
use crate::engine::FeatureEngine;
use crate::error::{RadbatchError, WorkerError};
use crate::params::ParameterSet;
use crate::worklist::WorkItem;

pub struct BatchExecutor {
    in_flight: Arc<AtomicBool>,
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validates the submission, then starts the batch on a fresh
    /// background thread. Pre-flight failures — invalid configuration,
    /// unreachable database, empty worklist, executor busy — are reported
    /// synchronously here; nothing after this call returns aborts the
    /// batch.
    pub fn submit(
        &self,
        items: Vec<WorkItem>,
        params: ParameterSet,
        config: &BatchConfig,
        engine: Box<dyn FeatureEngine>,
    ) -> Result<BatchHandle, RadbatchError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::BatchInFlight.into());
        }

        let result = self.start(items, params, config, engine);
        if result.is_err() {
            self.in_flight.store(false, Ordering::SeqCst);
        }
        result
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn start(
        &self,
        items: Vec<WorkItem>,
        params: ParameterSet,
        config: &BatchConfig,
        engine: Box<dyn FeatureEngine>,
    ) -> Result<BatchHandle, RadbatchError> {
        if items.is_empty() {
            return Err(BatchError::EmptyWorklist.into());
        }
        config.validate()?;

        // Capacity covers every item event plus completion, so the runner
        // can always finish even if the receiver stops draining.
        let (sender, receiver) = bounded(items.len() + 1);
        let progress = ChannelProgress::new(sender);

        let run = BatchRun::from_config(items, params, config, engine);
        info!("Submitting batch run {}", run.run_id());

        let in_flight = Arc::clone(&self.in_flight);
        let thread = std::thread::Builder::new()
            .name("radbatch-batch".to_string())
            .spawn(move || {
                let summary = run.run(&progress);
                in_flight.store(false, Ordering::SeqCst);
                summary
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(BatchHandle {
            events: receiver,
            thread: Some(thread),
        })
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-side handle to one running batch: the event stream plus the
/// join handle for the final summary.
pub struct BatchHandle {
    events: Receiver<ProgressEvent>,
    thread: Option<JoinHandle<BatchSummary>>,
}

impl BatchHandle {
    /// Blocks for the next event. Returns `None` once the runner is done
    /// and the channel drained.
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.events.recv().ok()
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.events.try_recv().ok()
    }

    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Blocks until the batch finishes and returns its summary.
    pub fn wait(mut self) -> BatchSummary {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                error!("Batch thread panicked");
                BatchSummary::default()
            }),
            None => BatchSummary::default(),
        }
    }
}
