use crate::collectors::{MetricsProvider, ProviderError};
use crate::snapshot::VolumeIoStat;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct FakeValues {
    process_count: u32,
    cpu_use_percent: f32,
    memory_use_percent: f32,
    disk_io_stats: Vec<VolumeIoStat>,
}

/// Deterministic provider returning whatever was last set.
#[derive(Debug, Default)]
pub struct FakeProvider {
    values: Mutex<FakeValues>,
    init_calls: AtomicUsize,
    uninit_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(
        cpu_use_percent: f32,
        memory_use_percent: f32,
        process_count: u32,
        disk_io_stats: Vec<VolumeIoStat>,
    ) -> Self {
        Self {
            values: Mutex::new(FakeValues {
                process_count,
                cpu_use_percent,
                memory_use_percent,
                disk_io_stats,
            }),
            ..Self::default()
        }
    }

    pub fn set_process_count(&self, n: u32) {
        self.with_values(|v| v.process_count = n);
    }

    pub fn set_cpu_use_percent(&self, percent: f32) {
        self.with_values(|v| v.cpu_use_percent = percent);
    }

    pub fn set_memory_use_percent(&self, percent: f32) {
        self.with_values(|v| v.memory_use_percent = percent);
    }

    pub fn set_disk_io_stats(&self, stats: Vec<VolumeIoStat>) {
        self.with_values(|v| v.disk_io_stats = stats);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn uninit_calls(&self) -> usize {
        self.uninit_calls.load(Ordering::SeqCst)
    }

    fn with_values<R>(&self, f: impl FnOnce(&mut FakeValues) -> R) -> R {
        let mut guard = self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl MetricsProvider for FakeProvider {
    fn init(&self) -> bool {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn uninit(&self) {
        self.uninit_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn process_count(&self) -> Result<u32, ProviderError> {
        Ok(self.with_values(|v| v.process_count))
    }

    fn cpu_use_percent(&self) -> f32 {
        self.with_values(|v| v.cpu_use_percent)
    }

    fn memory_use_percent(&self) -> f32 {
        self.with_values(|v| v.memory_use_percent)
    }

    fn disk_io_stats(&self) -> Vec<VolumeIoStat> {
        self.with_values(|v| v.disk_io_stats.clone())
    }
}
