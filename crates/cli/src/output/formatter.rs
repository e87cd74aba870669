//! Status output for one-shot subcommands
//!
//! `profile` and startup errors print through a `Formatter` so `--json`,
//! `--quiet` and `--no-color` behave the same everywhere. The browser
//! itself writes through the shell.

use console::style;
use serde::Serialize;

use super::OutputConfig;

/// Formatter for CLI status output
///
/// In JSON mode every line is a JSON document and nothing is colored.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Confirmation of a completed change
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        let mark = if self.colors_enabled() {
            style("✓").green().to_string()
        } else {
            "✓".to_string()
        };
        println!("{mark} {message}");
    }

    /// Errors go to stderr, even in quiet mode
    pub fn error(&self, message: &str) {
        if self.config.json {
            eprintln!("{}", serde_json::json!({ "error": message }));
        } else if self.colors_enabled() {
            eprintln!("{} {message}", style("✗").red());
        } else {
            eprintln!("✗ {message}");
        }
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Plain line, suppressed by `--quiet`
    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }
}
