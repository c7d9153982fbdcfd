use std::sync::Mutex;
use tracing::info;

const WINDOW: usize = 10;

#[derive(Debug, Default)]
struct CpuWindow {
    reports_sent: u64,
    latest: [f32; WINDOW],
}

/// Mean CPU usage over the last ten sent snapshots, reported on every tenth.
#[derive(Debug, Default)]
pub struct CpuMeanTracker {
    window: Mutex<CpuWindow>,
}

impl CpuMeanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one sent value; returns the mean when a full window has landed.
    pub fn record(&self, cpu_percent: f32) -> Option<f32> {
        let mut window = self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = (window.reports_sent % WINDOW as u64) as usize;
        window.latest[slot] = cpu_percent;
        window.reports_sent += 1;

        if window.reports_sent % WINDOW as u64 != 0 {
            return None;
        }
        let mean = window.latest.iter().sum::<f32>() / WINDOW as f32;
        info!(
            mean_cpu_percent = mean,
            reports_sent = window.reports_sent,
            "mean CPU usage"
        );
        Some(mean)
    }
}
