use crate::snapshot::{VolumeId, VolumeIoStat};
use std::sync::Mutex;
use tracing::debug;

/// Cumulative per-volume I/O counters.
pub trait VolumeSource: Send + Sync {
    fn volumes(&self) -> Vec<VolumeId>;
    /// Cumulative `(bytes_read, bytes_written)`, or `None` if the volume
    /// could not be opened or queried right now.
    fn cumulative(&self, volume: &VolumeId) -> Option<(u64, u64)>;
}

#[derive(Debug, Clone)]
struct VolumeBaseline {
    volume: VolumeId,
    cumulative: Option<(u64, u64)>,
}

/// Turns cumulative counters into deltas since the last successful sample.
pub struct DiskIoTracker<S> {
    source: S,
    baselines: Mutex<Vec<VolumeBaseline>>,
}

impl<S: VolumeSource> DiskIoTracker<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            baselines: Mutex::new(Vec::new()),
        }
    }

    /// Enumerates volumes once; every baseline starts unset.
    pub fn init(&self) {
        let volumes = self.source.volumes();
        debug!(volumes = volumes.len(), "volumes enumerated");
        let mut baselines = self.lock();
        *baselines = volumes
            .into_iter()
            .map(|volume| VolumeBaseline {
                volume,
                cumulative: None,
            })
            .collect();
    }

    pub fn stats(&self) -> Vec<VolumeIoStat> {
        let mut baselines = self.lock();
        let mut out = Vec::with_capacity(baselines.len());
        for baseline in baselines.iter_mut() {
            let Some((read, written)) = self.source.cumulative(&baseline.volume) else {
                continue;
            };
            if read == 0 && written == 0 {
                continue;
            }

            let (bytes_read, bytes_written) = match baseline.cumulative {
                None => (0, 0),
                Some((prev_read, prev_written)) => (
                    read.saturating_sub(prev_read),
                    written.saturating_sub(prev_written),
                ),
            };
            baseline.cumulative = Some((read, written));
            out.push(VolumeIoStat::new(
                baseline.volume.clone(),
                bytes_read,
                bytes_written,
            ));
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<VolumeBaseline>> {
        self.baselines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct PlatformVolumes;

#[cfg(target_os = "linux")]
const SECTOR_SIZE: u64 = 512;

#[cfg(target_os = "linux")]
impl VolumeSource for PlatformVolumes {
    fn volumes(&self) -> Vec<VolumeId> {
        let Ok(entries) = std::fs::read_dir("/sys/block") else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with("loop") && !name.starts_with("ram"))
            .collect();
        names.sort();
        names.into_iter().map(VolumeId::new).collect()
    }

    fn cumulative(&self, volume: &VolumeId) -> Option<(u64, u64)> {
        let text = std::fs::read_to_string(format!("/sys/block/{volume}/stat")).ok()?;
        parse_block_stat(&text)
    }
}

/// Sectors read and written are the 3rd and 7th columns of a block `stat` file.
#[cfg(target_os = "linux")]
fn parse_block_stat(text: &str) -> Option<(u64, u64)> {
    let fields: Vec<u64> = text
        .split_whitespace()
        .take(7)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 7 {
        return None;
    }
    Some((
        fields[2].saturating_mul(SECTOR_SIZE),
        fields[6].saturating_mul(SECTOR_SIZE),
    ))
}

#[cfg(target_os = "windows")]
impl VolumeSource for PlatformVolumes {
    fn volumes(&self) -> Vec<VolumeId> {
        use windows::Win32::Storage::FileSystem::GetLogicalDriveStringsW;

        let mut buffer = [0_u16; 256];
        let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) } as usize;
        if len == 0 || len > buffer.len() {
            return Vec::new();
        }
        // "C:\\\0D:\\\0..." -> first letter of each entry
        buffer[..len]
            .split(|c| *c == 0)
            .filter_map(|entry| entry.first())
            .filter_map(|c| char::from_u32(*c as u32))
            .map(VolumeId::from)
            .collect()
    }

    fn cumulative(&self, volume: &VolumeId) -> Option<(u64, u64)> {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::Storage::FileSystem::{
            CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_READ_ATTRIBUTES, FILE_SHARE_READ,
            FILE_SHARE_WRITE, OPEN_EXISTING,
        };
        use windows::Win32::System::Ioctl::{DISK_PERFORMANCE, IOCTL_DISK_PERFORMANCE};
        use windows::Win32::System::IO::DeviceIoControl;

        let path: Vec<u16> = format!("\\\\.\\{volume}:")
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        let handle = unsafe {
            CreateFileW(
                PCWSTR(path.as_ptr()),
                FILE_READ_ATTRIBUTES.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(0),
                HANDLE::default(),
            )
        }
        .ok()?;

        let mut perf = DISK_PERFORMANCE::default();
        let mut returned = 0_u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_DISK_PERFORMANCE,
                None,
                0,
                Some(&mut perf as *mut DISK_PERFORMANCE as *mut _),
                std::mem::size_of::<DISK_PERFORMANCE>() as u32,
                Some(&mut returned),
                None,
            )
        };
        unsafe {
            let _ = CloseHandle(handle);
        }
        if !ok.as_bool() {
            return None;
        }
        Some((perf.BytesRead.max(0) as u64, perf.BytesWritten.max(0) as u64))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
impl VolumeSource for PlatformVolumes {
    fn volumes(&self) -> Vec<VolumeId> {
        Vec::new()
    }

    fn cumulative(&self, _volume: &VolumeId) -> Option<(u64, u64)> {
        None
    }
}
