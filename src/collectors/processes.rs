use crate::collectors::ProviderError;
use std::io;
use tracing::debug;

pub const INITIAL_CAPACITY: usize = 5 * 1024;
const ENTRY_SIZE: usize = std::mem::size_of::<u32>();

/// Source of process ids with a fixed-capacity output buffer.
pub trait ProcessEnumerator: Send + Sync {
    /// Fills `ids` from the front and returns the number of bytes written.
    /// A full buffer means the list may have been truncated.
    fn enumerate(&self, ids: &mut [u32]) -> io::Result<usize>;
}

/// Counts processes, doubling the buffer until the enumerator leaves room to spare.
pub fn count_processes<E: ProcessEnumerator + ?Sized>(
    enumerator: &E,
    initial_capacity: usize,
) -> Result<u32, ProviderError> {
    let mut capacity = initial_capacity.max(1);
    loop {
        let mut ids = vec![0_u32; capacity];
        let needed = enumerator.enumerate(&mut ids)?;
        if needed >= capacity * ENTRY_SIZE {
            debug!(
                capacity,
                next_capacity = capacity * 2,
                "process buffer filled up, retrying with a bigger one"
            );
            capacity *= 2;
            continue;
        }
        return Ok((needed / ENTRY_SIZE) as u32);
    }
}

#[derive(Debug, Default)]
pub struct PlatformProcesses;

#[cfg(target_os = "linux")]
impl ProcessEnumerator for PlatformProcesses {
    fn enumerate(&self, ids: &mut [u32]) -> io::Result<usize> {
        let mut written = 0;
        for entry in std::fs::read_dir("/proc")? {
            if written == ids.len() {
                break;
            }
            let Ok(entry) = entry else {
                continue;
            };
            if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
                ids[written] = pid;
                written += 1;
            }
        }
        Ok(written * ENTRY_SIZE)
    }
}

#[cfg(target_os = "windows")]
impl ProcessEnumerator for PlatformProcesses {
    fn enumerate(&self, ids: &mut [u32]) -> io::Result<usize> {
        use windows::Win32::System::ProcessStatus::K32EnumProcesses;

        let mut needed = 0_u32;
        let ok = unsafe {
            K32EnumProcesses(
                ids.as_mut_ptr(),
                (ids.len() * ENTRY_SIZE) as u32,
                &mut needed,
            )
        };
        if !ok.as_bool() {
            return Err(io::Error::last_os_error());
        }
        Ok(needed as usize)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
impl ProcessEnumerator for PlatformProcesses {
    fn enumerate(&self, ids: &mut [u32]) -> io::Result<usize> {
        use sysinfo::{PidExt, System, SystemExt};

        let mut system = System::new();
        system.refresh_processes();
        let mut written = 0;
        for pid in system.processes().keys().take(ids.len()) {
            ids[written] = pid.as_u32();
            written += 1;
        }
        Ok(written * ENTRY_SIZE)
    }
}
