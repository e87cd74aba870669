//! Progress display for running transfers
//!
//! The item count is unknown until directories are expanded, so progress is
//! a spinner that counts finished items by outcome.

use std::time::Duration;

use sc_core::transfer::{ItemResult, Outcome};
use sc_core::TransferKind;

use super::OutputConfig;

/// Transfer progress spinner
///
/// In quiet or JSON mode, or with `--no-progress`, nothing is drawn.
#[derive(Debug)]
pub struct ProgressBar {
    kind: TransferKind,
    bar: Option<indicatif::ProgressBar>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

impl ProgressBar {
    /// Start a spinner for a transfer of `kind`
    pub fn spinner(config: &OutputConfig, kind: TransferKind) -> Self {
        let bar = if config.quiet || config.json || config.no_progress {
            None
        } else {
            let bar = indicatif::ProgressBar::new_spinner();
            let style = indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(100));
            Some(bar)
        };

        let progress = Self {
            kind,
            bar,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };
        progress.refresh();
        progress
    }

    /// Count one finished item
    pub fn record(&mut self, item: &ItemResult) {
        match &item.outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        self.refresh();
    }

    /// Current status line
    pub fn message(&self) -> String {
        format!(
            "{}: {} done, {} failed, {} skipped",
            self.kind, self.succeeded, self.failed, self.skipped
        )
    }

    fn refresh(&self) {
        if let Some(bar) = &self.bar {
            bar.set_message(self.message());
        }
    }

    /// Finish and clear the spinner
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if progress is drawn
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_core::transfer::SkipReason;

    #[test]
    fn test_progress_hidden_when_quiet() {
        let config = OutputConfig {
            quiet: true,
            ..Default::default()
        };
        assert!(!ProgressBar::spinner(&config, TransferKind::Copy).is_visible());

        let config = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        assert!(!ProgressBar::spinner(&config, TransferKind::Copy).is_visible());
    }

    #[test]
    fn test_progress_counts_outcomes() {
        let config = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        let mut progress = ProgressBar::spinner(&config, TransferKind::Delete);
        progress.record(&ItemResult::new("demo/a", None, Outcome::Succeeded));
        progress.record(&ItemResult::new(
            "demo/b",
            None,
            Outcome::skipped(SkipReason::AlreadyAbsent),
        ));
        assert_eq!(progress.message(), "delete: 1 done, 0 failed, 1 skipped");
    }
}
