//! Poll state machine, kept free of I/O and rendering.

use super::types::{TaskState, TaskStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What the poll loop should do after observing a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// Keep polling, nothing to redraw
    Continue,
    /// Keep polling, the percentage changed
    Progress(u8),
    Finished,
    Failed,
    /// Stuck in WAITING for longer than allowed
    TimedOut { waited: Duration },
}

impl PollStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStep::Finished | PollStep::Failed | PollStep::TimedOut { .. })
    }
}

/// Tracks one task across polls
#[derive(Debug, Clone)]
pub struct PollTracker {
    waiting_timeout: Duration,
    percent: u8,
    first_seen: Option<DateTime<Utc>>,
}

impl PollTracker {
    pub fn new(waiting_timeout: Duration) -> Self {
        Self {
            waiting_timeout,
            percent: 0,
            first_seen: None,
        }
    }

    /// Last percentage reported
    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn observe(&mut self, status: &TaskStatus, now: DateTime<Utc>) -> PollStep {
        let first_seen = *self.first_seen.get_or_insert(now);

        match status.state {
            TaskState::Waiting => {
                // Without a server start time, count from the first poll.
                let started = status.start_time.unwrap_or(first_seen);
                let waited = (now - started).to_std().unwrap_or_default();

                if waited > self.waiting_timeout {
                    PollStep::TimedOut { waited }
                } else {
                    PollStep::Continue
                }
            }
            TaskState::Running => {
                let percent = status.progress.percent().unwrap_or(self.percent);
                if percent == self.percent {
                    PollStep::Continue
                } else {
                    self.percent = percent;
                    PollStep::Progress(percent)
                }
            }
            TaskState::Finished => {
                self.percent = 100;
                PollStep::Finished
            }
            TaskState::Failed => PollStep::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::TaskProgress;
    use chrono::TimeDelta;
    use proptest::prelude::*;

    fn status(state: TaskState, current: u32, total: u32) -> TaskStatus {
        TaskStatus {
            progress: TaskProgress {
                current,
                total,
                info: String::new(),
            },
            ..TaskStatus::new("t1", state)
        }
    }

    #[test]
    fn test_running_reports_only_changes() {
        let mut tracker = PollTracker::new(Duration::from_secs(120));
        let now = Utc::now();

        assert_eq!(tracker.observe(&status(TaskState::Running, 0, 100), now), PollStep::Continue);
        assert_eq!(
            tracker.observe(&status(TaskState::Running, 50, 100), now),
            PollStep::Progress(50)
        );
        assert_eq!(tracker.observe(&status(TaskState::Running, 1, 2), now), PollStep::Continue);
        assert_eq!(
            tracker.observe(&status(TaskState::Running, 100, 100), now),
            PollStep::Progress(100)
        );
    }

    #[test]
    fn test_unknown_total_keeps_previous_percent() {
        let mut tracker = PollTracker::new(Duration::from_secs(120));
        let now = Utc::now();

        tracker.observe(&status(TaskState::Running, 3, 4), now);
        assert_eq!(tracker.observe(&status(TaskState::Running, 9, 0), now), PollStep::Continue);
        assert_eq!(tracker.percent(), 75);
    }

    #[test]
    fn test_waiting_times_out_from_server_start_time() {
        let mut tracker = PollTracker::new(Duration::from_secs(120));
        let now = Utc::now();

        let mut waiting = status(TaskState::Waiting, 0, 0);
        waiting.start_time = Some(now - TimeDelta::seconds(130));
        assert_eq!(
            tracker.observe(&waiting, now),
            PollStep::TimedOut {
                waited: Duration::from_secs(130)
            }
        );

        waiting.start_time = Some(now - TimeDelta::seconds(60));
        assert_eq!(tracker.observe(&waiting, now), PollStep::Continue);
    }

    #[test]
    fn test_waiting_without_start_time_counts_from_first_poll() {
        let mut tracker = PollTracker::new(Duration::from_secs(10));
        let start = Utc::now();
        let waiting = status(TaskState::Waiting, 0, 0);

        assert_eq!(tracker.observe(&waiting, start), PollStep::Continue);
        assert_eq!(
            tracker.observe(&waiting, start + TimeDelta::seconds(5)),
            PollStep::Continue
        );
        assert_eq!(
            tracker.observe(&waiting, start + TimeDelta::seconds(11)),
            PollStep::TimedOut {
                waited: Duration::from_secs(11)
            }
        );
    }

    #[test]
    fn test_start_time_in_the_future_does_not_time_out() {
        let mut tracker = PollTracker::new(Duration::from_secs(1));
        let now = Utc::now();

        let mut waiting = status(TaskState::Waiting, 0, 0);
        waiting.start_time = Some(now + TimeDelta::seconds(300));
        assert_eq!(tracker.observe(&waiting, now), PollStep::Continue);
    }

    #[test]
    fn test_terminal_states() {
        let mut tracker = PollTracker::new(Duration::from_secs(120));
        let now = Utc::now();

        assert_eq!(tracker.observe(&status(TaskState::Failed, 0, 0), now), PollStep::Failed);
        assert_eq!(tracker.observe(&status(TaskState::Finished, 0, 0), now), PollStep::Finished);
        assert_eq!(tracker.percent(), 100);
        assert!(PollStep::TimedOut { waited: Duration::ZERO }.is_terminal());
        assert!(!PollStep::Progress(10).is_terminal());
    }

    proptest! {
        /// Consecutive progress reports always differ and stay within 0..=100.
        #[test]
        fn prop_progress_reports_are_distinct(samples in prop::collection::vec((0u32..500, 0u32..500), 1..50)) {
            let mut tracker = PollTracker::new(Duration::from_secs(120));
            let now = Utc::now();
            let mut last = 0u8;

            for (current, total) in samples {
                if let PollStep::Progress(percent) = tracker.observe(&status(TaskState::Running, current, total), now) {
                    prop_assert_ne!(percent, last);
                    prop_assert!(percent <= 100);
                    last = percent;
                }
            }
        }
    }
}
