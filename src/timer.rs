use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Timed wait that another thread can cut short.
///
/// The wait sleeps in slices of `resolution` and checks the cancel flag
/// between them, so cancellation is observed within one slice however long
/// the wait is. `cancel` only stores an atomic and is safe to call from any
/// thread at any time.
#[derive(Debug)]
pub struct CancellableTimer {
    cancelled: AtomicBool,
    resolution: Duration,
}

impl CancellableTimer {
    pub fn new(resolution: Duration) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            resolution: resolution.max(Duration::from_millis(1)),
        }
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// A period too large to represent as an `Instant` never elapses; only
    /// `cancel` ends such a wait.
    pub fn wait(&self, period: Duration) -> WaitOutcome {
        let deadline = Instant::now().checked_add(period);
        loop {
            if self.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::Elapsed;
                    }
                    self.resolution.min(deadline - now)
                }
                None => self.resolution,
            };
            thread::sleep(slice);
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl Default for CancellableTimer {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn short_wait_elapses() {
        let timer = CancellableTimer::new(Duration::from_millis(10));
        let start = Instant::now();
        assert_eq!(timer.wait(Duration::from_millis(30)), WaitOutcome::Elapsed);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_before_wait_returns_immediately() {
        let timer = CancellableTimer::default();
        timer.cancel();
        let start = Instant::now();
        assert_eq!(timer.wait(Duration::from_secs(60)), WaitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn cancel_from_other_thread_interrupts_long_wait() {
        let timer = Arc::new(CancellableTimer::default());
        let waiter = {
            let timer = timer.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (timer.wait(Duration::from_secs(3600)), start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(150));
        let cancelled_at = Instant::now();
        timer.cancel();
        let (outcome, _) = waiter.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(cancelled_at.elapsed() <= Duration::from_millis(200));
    }

    #[test]
    fn unbounded_period_waits_until_cancelled() {
        let timer = Arc::new(CancellableTimer::new(Duration::from_millis(5)));
        let waiter = {
            let timer = timer.clone();
            thread::spawn(move || timer.wait(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        timer.cancel();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Cancelled);
    }

    #[test]
    fn reset_rearms_the_timer() {
        let timer = CancellableTimer::new(Duration::from_millis(5));
        timer.cancel();
        timer.reset();
        assert!(!timer.is_cancelled());
        assert_eq!(timer.wait(Duration::from_millis(10)), WaitOutcome::Elapsed);
    }
}
