//! Process tree discovery and termination.
//!
//! Each platform answers two questions: which processes descend from a pid,
//! and how to ask a single process to terminate. Everything else, including
//! the order in which a tree is torn down, is shared.
//!
//! - Unix asks the OS for the children of one pid at a time and walks the
//!   tree breadth-first.
//! - Windows has no synchronous children-only query, so it takes one snapshot
//!   of the process table and filters it by parent id.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use self::unix::UnixProcessTree;
#[cfg(windows)]
pub use self::windows::WindowsProcessTree;

/// Process tree implementation for the current platform
#[cfg(unix)]
pub type NativeProcessTree = UnixProcessTree;
/// Process tree implementation for the current platform
#[cfg(windows)]
pub type NativeProcessTree = WindowsProcessTree;

use crate::error::{Result, SandctlError};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Platform capability to enumerate and terminate processes
pub trait ProcessTree: Send + Sync {
    /// Every process transitively spawned by `pid`, excluding `pid` itself,
    /// in breadth-first order. A leaf process yields an empty list.
    fn descendants(&self, pid: u32) -> io::Result<Vec<u32>>;

    /// Request graceful termination of a single process. A process that has
    /// already exited is not an error.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Terminate `root` and all of its descendants, children before parents
    /// and `root` last. Individual failures are logged and collected, never
    /// fatal.
    fn terminate_tree(&self, root: u32) -> TerminationReport {
        let mut report = TerminationReport::new(root);

        let descendants = match self.descendants(root) {
            Ok(descendants) => descendants,
            Err(e) => {
                warn!("Could not enumerate children of PID {}: {}", root, e);
                report.enumeration_error = Some(e.to_string());
                Vec::new()
            }
        };

        debug!("PID {} has {} descendant(s): {:?}", root, descendants.len(), descendants);

        // Breadth-first order reversed puts the deepest processes first.
        for pid in descendants.iter().rev().copied().chain(std::iter::once(root)) {
            report.attempted.push(pid);
            if let Err(e) = self.terminate(pid) {
                warn!("Failed to terminate PID {}: {}", pid, e);
                report.failures.push((pid, e.to_string()));
            }
        }

        info!(
            "Terminated process tree of PID {} ({} process(es), {} failure(s))",
            root,
            report.attempted.len(),
            report.failures.len()
        );
        report
    }
}

/// Outcome of `terminate_tree`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationReport {
    pub root: u32,
    /// Pids in the order termination was attempted
    pub attempted: Vec<u32>,
    /// Pids whose termination failed, with the OS error
    pub failures: Vec<(u32, String)>,
    /// Set when the descendants could not be listed
    pub enumeration_error: Option<String>,
}

impl TerminationReport {
    fn new(root: u32) -> Self {
        Self {
            root,
            attempted: Vec::new(),
            failures: Vec::new(),
            enumeration_error: None,
        }
    }

    /// True when every process was enumerated and signalled successfully
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.enumeration_error.is_none()
    }
}

/// Walk the tree below `root` breadth-first using a children-of query.
///
/// Pids already seen are skipped, so a query that reports a pid twice does
/// not loop.
pub fn collect_descendants<F>(root: u32, mut children_of: F) -> io::Result<Vec<u32>>
where
    F: FnMut(u32) -> io::Result<Vec<u32>>,
{
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut found = Vec::new();

    while let Some(pid) = queue.pop_front() {
        for child in children_of(pid)? {
            if seen.insert(child) {
                found.push(child);
                queue.push_back(child);
            }
        }
    }

    Ok(found)
}

/// Descendants of `root` from a snapshot of `(pid, parent_pid)` pairs
pub fn descendants_from_table(root: u32, table: &[(u32, u32)]) -> Vec<u32> {
    let children_of = |parent: u32| -> io::Result<Vec<u32>> {
        Ok(table
            .iter()
            .filter(|(pid, ppid)| *ppid == parent && *pid != parent)
            .map(|(pid, _)| *pid)
            .collect())
    };

    // The closure never fails.
    collect_descendants(root, children_of).unwrap_or_default()
}

/// Whether a process with this pid currently exists
pub fn is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        self::unix::is_alive(pid)
    }

    #[cfg(windows)]
    {
        self::windows::is_alive(pid)
    }
}

/// Poll until `pid` disappears or `timeout` elapses
pub async fn wait_until_stopped(pid: u32, timeout: Duration) -> Result<()> {
    let start = tokio::time::Instant::now();
    let poll = Duration::from_millis(250).min(timeout.max(Duration::from_millis(1)));

    while is_alive(pid) {
        if start.elapsed() >= timeout {
            return Err(SandctlError::timeout(format!(
                "process {} still running after {:.1} seconds",
                pid,
                start.elapsed().as_secs_f64()
            )));
        }
        tokio::time::sleep(poll).await;
    }

    Ok(())
}
