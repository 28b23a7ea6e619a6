//! Progress display for monitored tasks.

use super::tracker::PollStep;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Receives progress updates from the poll loop
pub trait ProgressRender: Send {
    fn set_percent(&mut self, percent: u8);

    /// Called once with the terminal step
    fn finish(&mut self, step: PollStep);
}

/// Percent-only progress bar prefixed with the task description
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(description: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {percent:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(description.to_string());
        bar.enable_steady_tick(Duration::from_secs(1));
        Self { bar }
    }
}

impl ProgressRender for BarProgress {
    fn set_percent(&mut self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn finish(&mut self, step: PollStep) {
        match step {
            PollStep::Finished => {
                self.bar.set_position(100);
                self.bar.finish();
            }
            _ => self.bar.abandon(),
        }
    }
}

/// Renders nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressRender for SilentProgress {
    fn set_percent(&mut self, _percent: u8) {}

    fn finish(&mut self, _step: PollStep) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_tracks_percent() {
        let mut progress = BarProgress::new("Exporting");
        progress.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());

        progress.set_percent(40);
        assert_eq!(progress.bar.position(), 40);

        progress.finish(PollStep::Finished);
        assert_eq!(progress.bar.position(), 100);
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_bar_abandons_on_failure() {
        let mut progress = BarProgress::new("Importing");
        progress.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());

        progress.set_percent(10);
        progress.finish(PollStep::TimedOut {
            waited: Duration::from_secs(130),
        });
        assert_eq!(progress.bar.position(), 10);
        assert!(progress.bar.is_finished());
    }
}
