use crate::collectors::{MetricsProvider, ProviderError};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::timer::{CancellableTimer, WaitOutcome, DEFAULT_RESOLUTION};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub const MIN_PERIOD: Duration = Duration::from_secs(60);

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type Handler = Box<dyn Fn(&Snapshot, &str) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collection period must be at least one minute, got {0:?}")]
    InvalidPeriod(Duration),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("handler failed: {0}")]
    Handler(HandlerError),
    #[error("handler panicked: {0}")]
    HandlerPanic(String),
}

/// Periodic collect -> notify -> wait loop.
///
/// `run` blocks the calling thread until `stop` is called from elsewhere.
/// The handler receives each snapshot together with its JSON payload.
pub struct CollectorLoop<P> {
    provider: Arc<P>,
    period: Duration,
    handler: Handler,
    timer: CancellableTimer,
    running: AtomicBool,
}

impl<P: MetricsProvider> CollectorLoop<P> {
    pub fn new<F>(period: Duration, provider: Arc<P>, handler: F) -> Result<Self, CollectorError>
    where
        F: Fn(&Snapshot, &str) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        if period < MIN_PERIOD {
            return Err(CollectorError::InvalidPeriod(period));
        }
        Ok(Self {
            provider,
            period,
            handler: Box::new(handler),
            timer: CancellableTimer::new(DEFAULT_RESOLUTION),
            running: AtomicBool::new(false),
        })
    }

    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.timer = CancellableTimer::new(resolution);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("collector loop already running, ignoring run()");
            return;
        }
        // drop a cancel left over from a stop() that raced the previous exit
        self.timer.reset();

        if !self.provider.init() {
            warn!("metrics provider initialized partially, continuing with degraded readings");
        }
        info!(
            period_secs = self.period.as_secs(),
            resolution_ms = self.timer.resolution().as_millis() as u64,
            "starting collector loop"
        );

        loop {
            if let Err(err) = self.run_cycle() {
                error!(error = %err, "failed to collect and deliver snapshot");
            }
            if self.timer.wait(self.period) == WaitOutcome::Cancelled {
                break;
            }
        }

        self.provider.uninit();
        self.running.store(false, Ordering::SeqCst);
        info!("collector loop exited");
    }

    /// Never blocks; a no-op when the loop is not running.
    pub fn stop(&self) {
        if self.is_running() {
            info!("stop requested, waiting for the current cycle to finish");
            self.timer.cancel();
        }
    }

    fn run_cycle(&self) -> Result<(), CycleError> {
        let snapshot = self.collect()?;
        let payload = snapshot.to_json()?;
        let delivered =
            panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(&snapshot, payload.as_str())));
        match delivered {
            Ok(result) => result.map_err(CycleError::Handler),
            Err(panic) => Err(CycleError::HandlerPanic(panic_message(panic.as_ref()))),
        }
    }

    fn collect(&self) -> Result<Snapshot, CycleError> {
        let cpu_percent = self.provider.cpu_use_percent();
        let process_count = self.provider.process_count()?;
        let memory_percent = self.provider.memory_use_percent();
        let volume_io = self.provider.disk_io_stats();
        Ok(Snapshot::new(
            cpu_percent,
            memory_percent,
            process_count,
            volume_io,
        )?)
    }

    #[cfg(test)]
    fn with_period_unchecked(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
