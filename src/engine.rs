use crate::aggregator::Aggregator;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ingestor::{IngestStats, IngestStep, Ingestor};
use crate::measure::LatencyMeasurer;
use crate::splitter::Splitter;
use crate::window::SharedWindow;
use spdlog::{error, info, warn};
use std::fmt::Display;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of every cancellable wait in the engine.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// What a worker asks for after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStep {
    Continue,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    /// Stopped on its own or on cancellation.
    Finished,
    /// Stopped on an error or a panic.
    Failed(String),
    /// Still running when its shutdown grace period ran out; detached.
    Abandoned,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerStatus::Running)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: Vec<&'static str>,
    pub abandoned: Vec<&'static str>,
    /// Whether this shutdown released the window memory.
    pub released: bool,
    /// Ingestor counters as of its last read.
    pub ingest: IngestStats,
}

struct Worker {
    name: &'static str,
    handle: Option<thread::JoinHandle<()>>,
    status: Arc<Mutex<WorkerStatus>>,
}

impl Worker {
    fn status(&self) -> WorkerStatus {
        let status = self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let exited = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if status == WorkerStatus::Running && exited {
            // The thread ended without publishing a status: it panicked.
            return WorkerStatus::Failed("panicked".into());
        }
        status
    }

    fn set_status(&self, status: WorkerStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Owns the shared window and coordinates the workers that use it.
///
/// Workers poll a shared cancellation flag between iterations. Shutdown clears the
/// flag, gives each worker a grace period, detaches the ones that do not stop and
/// finally releases the window memory exactly once.
pub struct WindowEngine {
    window: Arc<SharedWindow>,
    running: Arc<AtomicBool>,
    workers: Vec<Worker>,
    ingest_stats: Arc<Mutex<IngestStats>>,
    startup_stagger: Duration,
    shutdown_grace: Duration,
    splitter_interval: Duration,
    aggregator_interval: Duration,
    enable_latency_stats: bool,
    pin_cores: bool,
    shut_down: bool,
}

impl WindowEngine {
    /// Validates the configuration and allocates the window arena.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let options = config.window_options()?;
        let window = SharedWindow::new(options, config.backing_path.clone())?;
        info!(
            "[Engine] window {}x{} in {:?} mode (batch {}), spanning {:?} at {} Hz",
            options.capacity,
            options.columns,
            options.mode(),
            options.batch_size,
            config.window_span(),
            config.nominal_rate
        );

        Ok(Self {
            window: Arc::new(window),
            running: Arc::new(AtomicBool::new(true)),
            workers: vec![],
            ingest_stats: Arc::new(Mutex::new(IngestStats::default())),
            startup_stagger: config.startup_stagger(),
            shutdown_grace: config.shutdown_grace(),
            splitter_interval: config.splitter_interval(),
            aggregator_interval: config.aggregator_interval(),
            enable_latency_stats: config.latency_stats,
            pin_cores: config.pin_cores,
            shut_down: false,
        })
    }

    pub fn window(&self) -> Arc<SharedWindow> {
        self.window.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks every worker to stop after its current iteration.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Runs `runnable` on its own thread until it is done, fails, or the engine stops.
    ///
    /// With a `cadence`, the worker sleeps that long between iterations, waking
    /// early on cancellation.
    pub fn run_worker<E: Display>(
        &mut self,
        name: &'static str,
        cadence: Option<Duration>,
        mut runnable: impl FnMut() -> Result<WorkerStep, E> + Send + 'static,
    ) -> Result<(), EngineError> {
        let worker_id = self.workers.len();
        let running = self.running.clone();
        let status = Arc::new(Mutex::new(WorkerStatus::Running));
        let published = status.clone();
        let enable_latency_stats = self.enable_latency_stats;
        let pin_cores = self.pin_cores;

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if pin_cores {
                    if let Some(core_ids) = core_affinity::get_core_ids() {
                        if let Some(core_id) = core_ids.get(worker_id % core_ids.len()) {
                            core_affinity::set_for_current(*core_id);
                        }
                    }
                }

                info!("[Worker:{}] started", name);
                let mut measurer = enable_latency_stats.then(|| LatencyMeasurer::new(1));
                let outcome = loop {
                    if !running.load(Ordering::Acquire) {
                        break WorkerStatus::Finished;
                    }
                    let instant = Instant::now();
                    let step = runnable();
                    if let Some(measurer) = measurer.as_mut() {
                        measurer.measure(instant.elapsed());
                    }
                    match step {
                        Ok(WorkerStep::Continue) => {}
                        Ok(WorkerStep::Done) => break WorkerStatus::Finished,
                        Err(err) => {
                            error!("[Worker:{}] stopped on error: {}", name, err);
                            break WorkerStatus::Failed(err.to_string());
                        }
                    }
                    if let Some(cadence) = cadence {
                        sleep_while_running(&running, cadence);
                    }
                };

                if let Some(measurer) = measurer {
                    info!("[Latency/Worker:{}]{}", name, measurer.format_stats());
                }
                info!("[Worker:{}] exited: {:?}", name, outcome);
                let mut status = published.lock().unwrap_or_else(PoisonError::into_inner);
                if *status == WorkerStatus::Running {
                    *status = outcome;
                }
            })
            .map_err(|source| EngineError::Spawn { name, source })?;

        self.workers.push(Worker {
            name,
            handle: Some(handle),
            status,
        });
        Ok(())
    }

    /// Starts the ingestor, waits the start-up stagger, then starts both readers.
    pub fn start<R: Read + Send + 'static>(
        &mut self,
        mut ingestor: Ingestor<R>,
        mut splitter: Splitter,
        mut aggregator: Aggregator,
    ) -> Result<(), EngineError> {
        let published = self.ingest_stats.clone();
        self.run_worker("ingestor", None, move || {
            let step = ingestor.step();
            *published.lock().unwrap_or_else(PoisonError::into_inner) = ingestor.stats();
            match step {
                Ok(IngestStep::Continue) => Ok(WorkerStep::Continue),
                Ok(IngestStep::Closed) => {
                    info!("[Worker:ingestor] feed closed, {:?}", ingestor.stats());
                    Ok(WorkerStep::Done)
                }
                Err(err) => {
                    warn!("[Worker:ingestor] stopping, {:?}", ingestor.stats());
                    Err(err)
                }
            }
        })?;

        sleep_while_running(&self.running, self.startup_stagger);

        let splitter_interval = self.splitter_interval;
        self.run_worker("splitter", Some(splitter_interval), move || {
            splitter.split().map(|_| WorkerStep::Continue)
        })?;

        let aggregator_interval = self.aggregator_interval;
        self.run_worker("aggregator", Some(aggregator_interval), move || {
            aggregator.step().map(|_| WorkerStep::Continue)
        })?;
        Ok(())
    }

    /// Ingestor counters, updated after every read.
    pub fn ingest_stats(&self) -> IngestStats {
        *self.ingest_stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn worker_statuses(&self) -> Vec<(&'static str, WorkerStatus)> {
        self.workers.iter().map(|w| (w.name, w.status())).collect()
    }

    /// True once any worker has reached a terminal state.
    pub fn any_worker_stopped(&self) -> bool {
        self.workers.iter().any(|w| w.status().is_terminal())
    }

    pub fn any_worker_failed(&self) -> bool {
        self.workers
            .iter()
            .any(|w| matches!(w.status(), WorkerStatus::Failed(_)))
    }

    /// Stops all workers within the configured grace period and releases the window.
    pub fn shutdown(&mut self) -> ShutdownReport {
        self.shutdown_within(self.shutdown_grace)
    }

    /// Shutdown without a grace period, for fatal setup errors.
    pub fn abort(&mut self) -> ShutdownReport {
        self.shutdown_within(Duration::ZERO)
    }

    fn shutdown_within(&mut self, grace: Duration) -> ShutdownReport {
        self.request_stop();
        let mut report = ShutdownReport::default();

        for worker in &mut self.workers {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            let deadline = Instant::now() + grace;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(WAIT_SLICE);
            }

            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("[Worker:{}] panicked", worker.name);
                    worker.set_status(WorkerStatus::Failed("panicked".into()));
                }
                report.stopped.push(worker.name);
            } else {
                warn!(
                    "[Worker:{}] did not stop within {:?}, abandoning it",
                    worker.name, grace
                );
                worker.set_status(WorkerStatus::Abandoned);
                report.abandoned.push(worker.name);
            }
        }

        report.released = self.release_window();
        report.ingest = self.ingest_stats();
        self.shut_down = true;
        info!("[Engine] shutdown complete: {:?}", report);
        report
    }

    /// Releases the window memory; repeated calls only log.
    pub fn release_window(&self) -> bool {
        if self.window.release() {
            info!("[Engine] window memory released");
            true
        } else {
            warn!("[Engine] window memory was already released");
            false
        }
    }
}

impl Drop for WindowEngine {
    fn drop(&mut self) {
        if !self.shut_down {
            self.shutdown();
        }
    }
}

/// Sleeps for `duration` in short slices, returning early once `running` is cleared.
pub fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}
