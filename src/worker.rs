//! Background recomputation for interactive callers.
//!
//! Every request gets a generation token. A result is only worth showing
//! if its token is still the newest one issued; anything older was
//! superseded by a later threshold change or drawing edit.

use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::errors::{HerbivoryError, Result};
use crate::pipeline::{measure_prepared, MeasurementReport, MeasurementRequest, PreparedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Issues monotonically increasing generation tokens. Shared between the
/// thread that submits work and the threads that do it.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    latest: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Generation {
        Generation(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The newest token issued so far; `Generation(0)` before the first
    pub fn latest(&self) -> Generation {
        Generation(self.latest.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.latest()
    }
}

/// Holds the most recent result, refusing anything that was superseded
#[derive(Debug)]
pub struct LatestResult<T> {
    counter: Arc<GenerationCounter>,
    current: Option<(Generation, T)>,
}

impl<T> LatestResult<T> {
    pub fn new(counter: Arc<GenerationCounter>) -> Self {
        Self { counter, current: None }
    }

    /// Store `value` if `generation` is still the newest token.
    /// Returns whether it was accepted.
    pub fn offer(&mut self, generation: Generation, value: T) -> bool {
        let newer_than_held = self
            .current
            .as_ref()
            .map_or(true, |(held, _)| generation > *held);

        if self.counter.is_current(generation) && newer_than_held {
            self.current = Some((generation, value));
            true
        } else {
            warn!(
                "Dropping stale result of generation {} (latest is {})",
                generation.value(),
                self.counter.latest().value()
            );
            false
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.current.as_ref().map(|(_, value)| value)
    }

    pub fn generation(&self) -> Option<Generation> {
        self.current.as_ref().map(|(generation, _)| *generation)
    }

    pub fn take(&mut self) -> Option<T> {
        self.current.take().map(|(_, value)| value)
    }
}

struct Job {
    generation: Generation,
    prepared: Arc<PreparedImage>,
    request: MeasurementRequest,
}

pub type WorkerResult = (Generation, Result<MeasurementReport>);

/// Runs measurements on a background thread.
///
/// Jobs queue up in submission order. Before starting one the thread
/// drains the queue and keeps only the newest job, so a burst of edits
/// costs a single measurement. Results still arrive tagged with their
/// generation; a job that was already running when a newer one arrived
/// reports normally and is filtered out on the receiving side.
pub struct MeasurementWorker {
    counter: Arc<GenerationCounter>,
    jobs: Option<Sender<Job>>,
    results: Receiver<WorkerResult>,
    // Newest generation already handed to the caller
    delivered: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl MeasurementWorker {
    pub fn spawn(config: Config) -> Self {
        let counter = Arc::new(GenerationCounter::new());
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel();

        let thread_counter = Arc::clone(&counter);
        let handle = thread::spawn(move || {
            while let Ok(mut job) = job_rx.recv() {
                while let Ok(newer) = job_rx.try_recv() {
                    debug!("Skipping generation {}", job.generation.value());
                    job = newer;
                }

                if !thread_counter.is_current(job.generation) {
                    debug!("Generation {} superseded before it started", job.generation.value());
                    continue;
                }

                let result = measure_prepared(&job.prepared, &config, &job.request);
                if result_tx.send((job.generation, result)).is_err() {
                    break;
                }
            }
            debug!("Measurement worker stopped");
        });

        Self {
            counter,
            jobs: Some(job_tx),
            results: result_rx,
            delivered: AtomicU64::new(0),
            handle: Some(handle),
        }
    }

    /// Counter used to tag jobs, for building a `LatestResult`
    pub fn counter(&self) -> Arc<GenerationCounter> {
        Arc::clone(&self.counter)
    }

    pub fn submit(&self, prepared: Arc<PreparedImage>, request: MeasurementRequest) -> Result<Generation> {
        let sender = self.jobs.as_ref().ok_or(HerbivoryError::WorkerDisconnected)?;
        let generation = self.counter.issue();
        sender
            .send(Job { generation, prepared, request })
            .map_err(|_| HerbivoryError::WorkerDisconnected)?;
        Ok(generation)
    }

    /// A finished job if one is waiting, current or not
    pub fn try_recv(&self) -> Result<Option<WorkerResult>> {
        match self.results.try_recv() {
            Ok(result) => {
                self.mark_delivered(result.0);
                Ok(Some(result))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(HerbivoryError::WorkerDisconnected),
        }
    }

    /// Block until the newest submitted job has finished, dropping the
    /// results of older ones.
    ///
    /// Returns `None` without blocking when nothing was ever submitted, or
    /// when the newest result was already handed out, e.g. by `try_recv`.
    pub fn recv_latest(&self) -> Result<Option<(Generation, MeasurementReport)>> {
        let latest = self.counter.latest().value();
        if latest == 0 || self.delivered.load(Ordering::SeqCst) >= latest {
            return Ok(None);
        }

        loop {
            let (generation, result) = self
                .results
                .recv()
                .map_err(|_| HerbivoryError::WorkerDisconnected)?;
            self.mark_delivered(generation);

            if self.counter.is_current(generation) {
                return result.map(|report| Some((generation, report)));
            }
            warn!("Dropping stale result of generation {}", generation.value());
        }
    }

    fn mark_delivered(&self, generation: Generation) {
        self.delivered.fetch_max(generation.value(), Ordering::SeqCst);
    }
}

impl Drop for MeasurementWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the thread's loop
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Measurement worker panicked");
            }
        }
    }
}
