//! Unix process tree: children-of queries plus SIGTERM.

use super::{ProcessTree, collect_descendants};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io;
use std::process::Command;
use tracing::debug;

/// Process tree backed by `/proc` on Linux and `pgrep` elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixProcessTree;

impl UnixProcessTree {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTree for UnixProcessTree {
    fn descendants(&self, pid: u32) -> io::Result<Vec<u32>> {
        collect_descendants(pid, children_of)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        match kill(to_pid(pid)?, Signal::SIGTERM) {
            Ok(()) => {
                debug!("Sent SIGTERM to PID {}", pid);
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!("PID {} already exited", pid);
                Ok(())
            }
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

pub(super) fn is_alive(pid: u32) -> bool {
    let Ok(pid) = to_pid(pid) else {
        return false;
    };

    // Signal 0 only checks existence; EPERM means it exists but is not ours.
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn to_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))
}

fn children_of(pid: u32) -> io::Result<Vec<u32>> {
    #[cfg(target_os = "linux")]
    if let Some(children) = proc_children(pid)? {
        return Ok(children);
    }

    pgrep_children(pid)
}

/// Read `/proc/<pid>/task/<tid>/children` for every thread of `pid`.
///
/// Returns `None` when the kernel does not expose the children files.
#[cfg(target_os = "linux")]
fn proc_children(pid: u32) -> io::Result<Option<Vec<u32>>> {
    use std::path::Path;

    if !Path::new("/proc/self/task").exists() {
        return Ok(None);
    }

    let entries = match std::fs::read_dir(format!("/proc/{}/task", pid)) {
        Ok(entries) => entries,
        // Process is gone, so it has no children left.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Some(Vec::new())),
        Err(e) => return Err(e),
    };

    let mut children = Vec::new();
    for entry in entries {
        let path = entry?.path().join("children");
        match std::fs::read_to_string(&path) {
            Ok(content) => children.extend(parse_pid_list(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }
    }

    Ok(Some(children))
}

fn pgrep_children(pid: u32) -> io::Result<Vec<u32>> {
    let output = Command::new("pgrep").arg("-P").arg(pid.to_string()).output()?;

    // pgrep exits with 1 when nothing matched.
    match output.status.code() {
        Some(0) => Ok(parse_pid_list(&String::from_utf8_lossy(&output.stdout))),
        Some(1) => Ok(Vec::new()),
        _ => Err(io::Error::other(format!(
            "pgrep -P {} failed: {}",
            pid,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}

fn parse_pid_list(content: &str) -> Vec<u32> {
    content
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_pid_list() {
        assert_eq!(parse_pid_list("12 13 \n14\n"), vec![12, 13, 14]);
        assert_eq!(parse_pid_list(""), Vec::<u32>::new());
        assert_eq!(parse_pid_list("7 junk 8"), vec![7, 8]);
    }

    #[test]
    fn test_leaf_process_has_no_descendants() {
        let mut child = Command::new("sleep").arg("5").spawn().expect("Failed to spawn");
        let tree = UnixProcessTree::new();

        assert!(tree.descendants(child.id()).unwrap().is_empty());

        tree.terminate(child.id()).unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_terminate_exited_process_is_noop() {
        let mut child = Command::new("true").spawn().expect("Failed to spawn");
        let pid = child.id();
        child.wait().unwrap();

        assert!(UnixProcessTree::new().terminate(pid).is_ok());
    }

    #[test]
    fn test_terminate_tree_reaches_grandchildren() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & sleep 30 & wait")
            .spawn()
            .expect("Failed to spawn");
        std::thread::sleep(Duration::from_millis(300));

        let tree = UnixProcessTree::new();
        let descendants = tree.descendants(child.id()).unwrap();
        assert_eq!(descendants.len(), 2);

        let report = tree.terminate_tree(child.id());
        assert!(report.is_complete());
        assert_eq!(*report.attempted.last().unwrap(), child.id());

        for pid in &descendants {
            assert!(report.attempted.contains(pid));
        }
        child.wait().unwrap();
    }

    #[test]
    fn test_is_alive() {
        assert!(is_alive(std::process::id()));
        assert!(!is_alive(u32::MAX));
    }
}
