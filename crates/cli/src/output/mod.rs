//! Terminal output
//!
//! Pane and result rendering for the shell, a spinner for running
//! transfers, and a formatter for one-shot subcommands.

mod formatter;
mod progress;
mod render;

pub use formatter::Formatter;
pub use progress::ProgressBar;
pub use render::{render_pane, render_profiles, render_result, render_snapshot, RenderOptions, Theme};

/// Output switches from the global CLI flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Snapshots and status as JSON
    pub json: bool,
    pub no_color: bool,
    /// Hide the transfer spinner
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}
