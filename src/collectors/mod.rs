pub mod disks;
#[cfg(test)]
pub mod fake;
pub mod processes;
pub mod system;

use crate::snapshot::VolumeIoStat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to enumerate processes: {0}")]
    Enumerate(#[from] std::io::Error),
}

/// Point-in-time OS counters feeding one collection cycle.
///
/// `init` opens any handle that is reused across calls and reports `false`
/// when it could not be acquired; the caller keeps going with degraded
/// (zero) readings. `uninit` releases what `init` opened and is safe to call
/// more than once.
pub trait MetricsProvider: Send + Sync {
    fn init(&self) -> bool;
    fn uninit(&self);
    fn process_count(&self) -> Result<u32, ProviderError>;
    fn cpu_use_percent(&self) -> f32;
    fn memory_use_percent(&self) -> f32;
    /// Per-volume deltas since the previous sample; volumes that could not be
    /// queried this time are left out.
    fn disk_io_stats(&self) -> Vec<VolumeIoStat>;
}
