//! Windows process tree: one ToolHelp snapshot plus `TerminateProcess`.

use super::{ProcessTree, descendants_from_table};
use ::windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE};
use ::windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use ::windows::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};
use std::io;
use tracing::debug;

/// Process tree backed by the ToolHelp process snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsProcessTree;

impl WindowsProcessTree {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTree for WindowsProcessTree {
    fn descendants(&self, pid: u32) -> io::Result<Vec<u32>> {
        let table = snapshot()?;
        Ok(descendants_from_table(pid, &table))
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        // SAFETY: the handle is owned by `OwnedHandle` and closed on drop.
        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(handle) => OwnedHandle(handle),
                Err(e) if e.code() == ERROR_INVALID_PARAMETER.to_hresult() => {
                    debug!("PID {} already exited", pid);
                    return Ok(());
                }
                Err(e) => return Err(to_io(e)),
            };

            match TerminateProcess(handle.0, 1) {
                Ok(()) => {
                    debug!("Terminated PID {}", pid);
                    Ok(())
                }
                // Access is denied once the process is already exiting.
                Err(e) if e.code() == ERROR_ACCESS_DENIED.to_hresult() && !is_alive(pid) => Ok(()),
                Err(e) => Err(to_io(e)),
            }
        }
    }
}

pub(super) fn is_alive(pid: u32) -> bool {
    snapshot()
        .map(|table| table.iter().any(|(p, _)| *p == pid))
        .unwrap_or(false)
}

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// `(pid, parent_pid)` for every process in the system
fn snapshot() -> io::Result<Vec<(u32, u32)>> {
    // SAFETY: `entry` is sized correctly and the snapshot handle is closed on drop.
    unsafe {
        let handle = OwnedHandle(CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).map_err(to_io)?);

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        Process32FirstW(handle.0, &mut entry).map_err(to_io)?;

        let mut table = Vec::new();
        loop {
            table.push((entry.th32ProcessID, entry.th32ParentProcessID));
            if Process32NextW(handle.0, &mut entry).is_err() {
                break;
            }
        }

        Ok(table)
    }
}

fn to_io(e: ::windows::core::Error) -> io::Error {
    io::Error::other(e.message())
}
