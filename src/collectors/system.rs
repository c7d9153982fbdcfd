use crate::collectors::disks::{DiskIoTracker, PlatformVolumes};
use crate::collectors::processes::{count_processes, PlatformProcesses, INITIAL_CAPACITY};
use crate::collectors::{MetricsProvider, ProviderError};
use crate::snapshot::VolumeIoStat;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{CpuExt, System, SystemExt};
use tracing::{debug, error, warn};

/// Live provider for the host the agent runs on.
pub struct SystemProvider {
    // Opened by `init`, reused for every CPU reading; refresh + read happen under the lock.
    cpu_query: Mutex<Option<System>>,
    processes: PlatformProcesses,
    disks: DiskIoTracker<PlatformVolumes>,
}

impl SystemProvider {
    pub fn new() -> Self {
        Self {
            cpu_query: Mutex::new(None),
            processes: PlatformProcesses,
            disks: DiskIoTracker::new(PlatformVolumes),
        }
    }

    fn cpu_query(&self) -> MutexGuard<'_, Option<System>> {
        self.cpu_query
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SystemProvider {
    fn init(&self) -> bool {
        self.disks.init();

        let mut system = System::new();
        // First refresh is the reference point for the next usage reading.
        system.refresh_cpu();
        let mut guard = self.cpu_query();
        if system.cpus().is_empty() {
            warn!("no CPU counters available, CPU usage will read as 0");
            *guard = None;
            return false;
        }
        *guard = Some(system);
        true
    }

    fn uninit(&self) {
        if self.cpu_query().take().is_some() {
            debug!("CPU query closed");
        }
    }

    fn process_count(&self) -> Result<u32, ProviderError> {
        count_processes(&self.processes, INITIAL_CAPACITY)
    }

    fn cpu_use_percent(&self) -> f32 {
        let mut guard = self.cpu_query();
        match guard.as_mut() {
            Some(system) => {
                system.refresh_cpu();
                system.global_cpu_info().cpu_usage()
            }
            None => {
                debug!("CPU query is not open");
                0.0
            }
        }
    }

    fn memory_use_percent(&self) -> f32 {
        let mut system = System::new();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            error!("failed to get memory info");
            return 0.0;
        }
        let available = 100.0 * system.available_memory() as f64 / total as f64;
        (100.0 - available) as f32
    }

    fn disk_io_stats(&self) -> Vec<VolumeIoStat> {
        self.disks.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_reads_zero_before_init_and_after_uninit() {
        let provider = SystemProvider::new();
        assert_eq!(provider.cpu_use_percent(), 0.0);

        provider.init();
        provider.uninit();
        provider.uninit();
        assert_eq!(provider.cpu_use_percent(), 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_readings_are_in_range() {
        let provider = SystemProvider::new();
        assert!(provider.init());

        let memory = provider.memory_use_percent();
        assert!((0.0..=100.0).contains(&memory), "memory = {memory}");
        let cpu = provider.cpu_use_percent();
        assert!((0.0..=100.0).contains(&cpu), "cpu = {cpu}");
        assert!(provider.process_count().unwrap() >= 1);
        for stat in provider.disk_io_stats() {
            assert_eq!((stat.bytes_read, stat.bytes_written), (0, 0));
        }

        provider.uninit();
    }
}
