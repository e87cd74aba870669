//! Plain-text rendering of browser state
//!
//! The shell prints panes one under the other: a header with the location,
//! then one row per entry with cursor and selection markers.

use comfy_table::{presets, ContentArrangement, Table};
use console::{style, Color};
use sc_core::pane::EntryKind;
use sc_core::transfer::Outcome;
use sc_core::{PaneSnapshot, Profile, Snapshot, TransferResult};

/// Narrowest name column
const MIN_NAME_WIDTH: usize = 12;

/// Color scheme named by the `theme` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    GreenOnBlack,
    /// Cyan directories, yellow selection
    Classic,
    /// No colors, only bold headers
    Mono,
}

impl Theme {
    /// Theme for a configured name, `None` if the name is unknown
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "green_on_black" | "default" => Some(Self::GreenOnBlack),
            "classic" => Some(Self::Classic),
            "mono" | "monochrome" => Some(Self::Mono),
            _ => None,
        }
    }

    fn directory(self) -> Option<Color> {
        match self {
            Self::GreenOnBlack => Some(Color::Blue),
            Self::Classic => Some(Color::Cyan),
            Self::Mono => None,
        }
    }

    fn selected(self) -> Option<Color> {
        match self {
            Self::GreenOnBlack => Some(Color::Green),
            Self::Classic => Some(Color::Yellow),
            Self::Mono => None,
        }
    }
}

/// Rendering switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub colors: bool,
    /// Show last-modified times
    pub times: bool,
    pub theme: Theme,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            colors: true,
            times: true,
            theme: Theme::default(),
        }
    }
}

impl RenderOptions {
    fn paint(&self, text: String, color: Option<Color>) -> String {
        match color {
            Some(color) if self.colors => style(text).fg(color).to_string(),
            _ => text,
        }
    }
}

fn size_column(kind: EntryKind, size: Option<u64>) -> String {
    match kind {
        EntryKind::Bucket => "<BUCKET>".to_string(),
        EntryKind::Directory => "<DIR>".to_string(),
        EntryKind::Object => humansize::format_size(size.unwrap_or(0), humansize::BINARY),
    }
}

/// One pane as text
pub fn render_pane(pane: &PaneSnapshot, active: bool, opts: RenderOptions) -> String {
    let mut header = format!("[{}] {}", if active { "*" } else { " " }, pane.location);
    if let Some(filter) = &pane.filter {
        header.push_str(&format!("  [filter: {filter}]"));
    }
    if pane.selected > 0 {
        header.push_str(&format!(
            "  ({} selected, {})",
            pane.selected,
            humansize::format_size(pane.selected_bytes, humansize::BINARY)
        ));
    }
    let mut lines = vec![if opts.colors && active {
        style(header).bold().to_string()
    } else {
        header
    }];

    if pane.entries.is_empty() {
        lines.push("    (empty)".to_string());
    }

    let width = pane
        .entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_NAME_WIDTH);

    for (index, entry) in pane.entries.iter().enumerate() {
        let cursor = if active && index == pane.cursor { '>' } else { ' ' };
        let mark = if entry.selected { '+' } else { ' ' };
        let padded = format!("{:<width$}", entry.name);
        let name = match entry.kind {
            EntryKind::Directory | EntryKind::Bucket => opts.paint(padded, opts.theme.directory()),
            EntryKind::Object if entry.selected => opts.paint(padded, opts.theme.selected()),
            EntryKind::Object => padded,
        };
        let mut row = format!("{cursor}{mark}  {name} {:>10}", size_column(entry.kind, entry.size));
        if opts.times {
            if let Some(modified) = entry.modified {
                row.push_str(&format!("  {}", modified.strftime("%Y-%m-%d %H:%M")));
            }
        }
        lines.push(row);
    }

    lines.join("\n")
}

/// Both panes and the dispatcher state
pub fn render_snapshot(snapshot: &Snapshot, opts: RenderOptions) -> String {
    use sc_core::Side;

    let mut out = String::new();
    out.push_str(&render_pane(&snapshot.left, snapshot.active == Side::Left, opts));
    out.push_str("\n\n");
    out.push_str(&render_pane(&snapshot.right, snapshot.active == Side::Right, opts));
    out.push('\n');

    let state = serde_json::to_value(snapshot.state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    out.push_str(&format!("[{state}]"));
    if let Some(kind) = snapshot.transfer {
        out.push_str(&format!(" {kind} running"));
    }
    for side in &snapshot.loading {
        out.push_str(&format!(" ({side} loading)"));
    }
    if let Some(prompt) = &snapshot.pending {
        out.push_str(&format!(" {prompt}"));
    }
    out
}

/// Summary line, followed by a table of items that did not succeed
pub fn render_result(result: &TransferResult, opts: RenderOptions) -> String {
    let summary = result.summary();
    let mut out = if opts.colors {
        let styled = if result.failed > 0 {
            style(summary).red()
        } else {
            style(summary).green()
        };
        styled.to_string()
    } else {
        summary
    };

    let troubled: Vec<_> = result
        .items
        .iter()
        .filter(|i| !matches!(i.outcome, Outcome::Succeeded))
        .collect();
    if troubled.is_empty() {
        return out;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled)
        .set_header(vec!["Source", "Target", "Outcome"]);
    for item in troubled {
        table.add_row(vec![
            item.source.clone(),
            item.target.clone().unwrap_or_default(),
            item.outcome.to_string(),
        ]);
    }
    out.push('\n');
    out.push_str(&table.to_string());
    out
}

/// Configured profiles as a table; keys are never printed
pub fn render_profiles(profiles: &[Profile], default: Option<&str>) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled)
        .set_header(vec!["Name", "Endpoint", "Region", "Lookup", "Credentials"]);
    for profile in profiles {
        let name = if default == Some(profile.name.as_str()) {
            format!("{} (default)", profile.name)
        } else {
            profile.name.clone()
        };
        table.add_row(vec![
            name,
            profile.endpoint.clone().unwrap_or_else(|| "aws".to_string()),
            profile.region.clone(),
            profile.bucket_lookup.clone(),
            if profile.static_keys().is_some() {
                "static".to_string()
            } else {
                "provider chain".to_string()
            },
        ]);
    }
    table.to_string()
}
