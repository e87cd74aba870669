//! Per-pane browsing state
//!
//! A pane points at the bucket list or at a prefix, holds the listing it
//! shows, a cursor into the visible entries, a selection of listed keys and
//! a back-navigation stack. Navigation is planned from the pane state, the
//! listing is fetched through the [`Namespace`], and only a successful fetch
//! is applied, so a failed load leaves the pane where it was.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use jiff::Timestamp;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::namespace::{Listing, Namespace};
use crate::path::{parse_location, Location, DEFAULT_DELIMITER};
use crate::traits::{Node, ObjectMeta};
use crate::transfer::SourceRef;

/// Maximum depth of the back-navigation stack
const HISTORY_LIMIT: usize = 64;

/// A change of what a pane shows, planned from its current state
///
/// The listing is fetched separately with [`Navigation::load`], possibly on
/// another task, and handed back to [`PaneState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    location: Location,
    step: Step,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// Show a new location, optionally recording the current one
    Open { remember: bool, focus: Option<String> },
    /// Return to the newest history entry
    Back,
    /// List the current location again; `fresh` skips the cache
    Reload { fresh: bool },
}

impl Navigation {
    /// Show `location` without touching the history
    pub fn open(location: Location) -> Self {
        Self {
            location,
            step: Step::Open {
                remember: false,
                focus: None,
            },
        }
    }

    fn visit(location: Location, focus: Option<String>) -> Self {
        Self {
            location,
            step: Step::Open { remember: true, focus },
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Whether the pane stays where it is
    pub fn is_reload(&self) -> bool {
        matches!(self.step, Step::Reload { .. })
    }

    /// Fetch the listing this navigation shows
    pub async fn load(&self, ns: &Namespace, delimiter: &str) -> Result<Arc<Listing>> {
        match self.step {
            Step::Reload { fresh: true } => ns.refresh(&self.location, delimiter).await,
            _ => ns.list_location(&self.location, delimiter).await,
        }
    }
}

/// What is under the cursor when entering
#[derive(Debug, Clone, PartialEq)]
pub enum Entered {
    /// A bucket or directory to open
    Navigate(Navigation),
    /// An object
    Object(ObjectMeta),
    Nothing,
}

/// One pane of the browser
#[derive(Debug, Clone)]
pub struct PaneState {
    location: Location,
    listing: Option<Arc<Listing>>,
    cursor: usize,
    selection: BTreeSet<String>,
    history: VecDeque<Location>,
    filter: Option<String>,
    delimiter: String,
}

impl Default for PaneState {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl PaneState {
    /// A pane on the bucket list, not yet loaded
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            location: Location::buckets(),
            listing: None,
            cursor: 0,
            selection: BTreeSet::new(),
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            filter: None,
            delimiter: delimiter.into(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn listing(&self) -> Option<&Arc<Listing>> {
        self.listing.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Entries shown after applying the filter
    pub fn visible(&self) -> Vec<&Node> {
        let Some(listing) = &self.listing else {
            return Vec::new();
        };
        match &self.filter {
            None => listing.iter().collect(),
            Some(needle) => {
                let needle = needle.to_lowercase();
                listing
                    .iter()
                    .filter(|n| n.name().to_lowercase().contains(&needle))
                    .collect()
            }
        }
    }

    /// Entry under the cursor
    pub fn current(&self) -> Option<&Node> {
        self.visible().get(self.cursor).copied()
    }

    // ------------------------------------------------------------------
    // Loading and navigation
    // ------------------------------------------------------------------

    /// Plan for the entry under the cursor
    pub fn enter_target(&self) -> Entered {
        let target = match self.current() {
            None => return Entered::Nothing,
            Some(Node::Object { meta, .. }) => return Entered::Object(meta.clone()),
            Some(Node::Bucket(bucket)) => Location::new(bucket.name.clone(), ""),
            Some(Node::Directory { key, .. }) => match &self.location.bucket {
                Some(bucket) => Location::new(bucket.clone(), key.clone()),
                None => return Entered::Nothing,
            },
        };
        Entered::Navigate(Navigation::visit(target, None))
    }

    /// One level up, leaving the cursor on the entry just left
    pub fn parent_target(&self) -> Option<Navigation> {
        let parent = self.location.parent(&self.delimiter)?;
        let left = match &self.location.bucket {
            Some(bucket) if self.location.prefix.is_empty() => bucket.clone(),
            _ => self.location.prefix.clone(),
        };
        Some(Navigation::visit(parent, Some(left)))
    }

    /// The previous location, if any
    pub fn back_target(&self) -> Option<Navigation> {
        let previous = self.history.back()?;
        Some(Navigation {
            location: previous.clone(),
            step: Step::Back,
        })
    }

    /// A `bucket/prefix` path typed by the user
    pub fn goto_target(&self, input: &str) -> Result<Navigation> {
        let location = parse_location(input, &self.delimiter)?;
        Ok(Navigation::visit(location, None))
    }

    /// Re-list the current location; `fresh` drops the cached listing first
    pub fn reload_target(&self, fresh: bool) -> Navigation {
        Navigation {
            location: self.location.clone(),
            step: Step::Reload { fresh },
        }
    }

    /// Show a fetched listing; returns `false` if the pane moved on since
    /// `navigation` was planned and the listing was dropped
    pub fn apply(&mut self, navigation: Navigation, listing: Arc<Listing>) -> bool {
        let Navigation { location, step } = navigation;
        match step {
            Step::Reload { .. } => {
                if location != self.location {
                    return false;
                }
                self.apply_listing(listing);
                return true;
            }
            Step::Back => {
                if self.history.back() != Some(&location) {
                    return false;
                }
                self.history.pop_back();
                self.show(location, listing);
            }
            Step::Open { remember, focus } => {
                if remember && location != self.location {
                    if self.history.len() == HISTORY_LIMIT {
                        self.history.pop_front();
                    }
                    self.history.push_back(self.location.clone());
                }
                self.show(location, listing);
                if let Some(key) = focus {
                    self.focus_key(&key);
                }
            }
        }
        true
    }

    /// Fetch and apply in one go; a failed load leaves the pane unchanged
    pub async fn navigate(&mut self, ns: &Namespace, navigation: Navigation) -> Result<()> {
        let listing = navigation.load(ns, &self.delimiter).await?;
        self.apply(navigation, listing);
        Ok(())
    }

    fn show(&mut self, location: Location, listing: Arc<Listing>) {
        self.location = location;
        self.listing = Some(listing);
        self.cursor = 0;
        self.selection.clear();
        self.filter = None;
    }

    /// Replace the listing, keeping the cursor entry and still-listed selection
    fn apply_listing(&mut self, listing: Arc<Listing>) {
        let focused = self.current().map(|n| n.key().to_string());
        self.selection.retain(|key| listing.find(key).is_some());
        self.listing = Some(listing);
        match focused {
            Some(key) => self.focus_key(&key),
            None => self.clamp_cursor(),
        }
    }

    fn focus_key(&mut self, key: &str) {
        let found = self.visible().iter().position(|n| n.key() == key);
        match found {
            Some(index) => self.cursor = index,
            None => self.clamp_cursor(),
        }
    }

    fn clamp_cursor(&mut self) {
        let len = self.visible().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.visible().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let target = self.cursor.saturating_add_signed(delta);
        self.cursor = target.min(len - 1);
    }

    pub fn cursor_top(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_bottom(&mut self) {
        self.cursor = self.visible().len().saturating_sub(1);
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    fn selectable(node: &Node) -> bool {
        !matches!(node, Node::Bucket(_))
    }

    /// Toggle the entry under the cursor; returns whether anything changed
    pub fn toggle_select(&mut self) -> bool {
        let Some(node) = self.current().filter(|n| Self::selectable(n)) else {
            return false;
        };
        let key = node.key().to_string();
        if !self.selection.remove(&key) {
            self.selection.insert(key);
        }
        true
    }

    /// Select every visible entry
    pub fn select_all(&mut self) -> usize {
        let keys: Vec<String> = self
            .visible()
            .into_iter()
            .filter(|n| Self::selectable(n))
            .map(|n| n.key().to_string())
            .collect();
        let before = self.selection.len();
        self.selection.extend(keys);
        self.selection.len() - before
    }

    /// Add visible entries whose name matches a glob pattern
    ///
    /// Directory names are matched without their trailing delimiter.
    pub fn select_pattern(&mut self, pattern: &str) -> Result<usize> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::InvalidCommand(format!("Invalid pattern '{pattern}': {e}")))?;
        let keys: Vec<String> = self
            .visible()
            .into_iter()
            .filter(|n| Self::selectable(n))
            .filter(|n| {
                let name = n.name();
                pattern.matches(name.strip_suffix(self.delimiter.as_str()).unwrap_or(name))
            })
            .map(|n| n.key().to_string())
            .collect();
        let before = self.selection.len();
        self.selection.extend(keys);
        Ok(self.selection.len() - before)
    }

    pub fn deselect_all(&mut self) {
        self.selection.clear();
    }

    /// Narrow the visible entries to names containing `needle`
    pub fn set_filter(&mut self, needle: Option<String>) {
        self.filter = needle.filter(|n| !n.is_empty());
        self.cursor = 0;
    }

    /// Sources for an operation: the selection, or the cursor entry
    pub fn operation_sources(&self) -> Vec<SourceRef> {
        let (Some(bucket), Some(listing)) = (&self.location.bucket, &self.listing) else {
            return Vec::new();
        };
        let nodes: Vec<&Node> = if self.selection.is_empty() {
            self.current().into_iter().collect()
        } else {
            self.selection.iter().filter_map(|k| listing.find(k)).collect()
        };
        nodes
            .into_iter()
            .filter_map(|node| match node {
                Node::Directory { key, .. } => Some(SourceRef::directory(bucket.clone(), key.clone())),
                Node::Object { meta, .. } => Some(SourceRef::object(bucket.clone(), meta.key.clone())),
                Node::Bucket(_) => None,
            })
            .collect()
    }

    /// Render-ready view of the pane
    pub fn snapshot(&self) -> PaneSnapshot {
        let entries: Vec<EntrySnapshot> = self
            .visible()
            .into_iter()
            .map(|node| EntrySnapshot::from_node(node, self.selection.contains(node.key())))
            .collect();
        let selected_bytes = self
            .listing
            .iter()
            .flat_map(|l| l.objects())
            .filter(|m| self.selection.contains(&m.key))
            .map(|m| m.size)
            .sum();
        PaneSnapshot {
            location: self.location.to_string(),
            bucket: self.location.bucket.clone(),
            prefix: self.location.prefix.clone(),
            cursor: self.cursor,
            entries,
            selected: self.selection.len(),
            selected_bytes,
            filter: self.filter.clone(),
            can_go_back: !self.history.is_empty(),
        }
    }
}

/// Kind of a rendered entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Bucket,
    Directory,
    Object,
}

/// One rendered row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySnapshot {
    pub name: String,
    pub key: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
    pub selected: bool,
}

impl EntrySnapshot {
    fn from_node(node: &Node, selected: bool) -> Self {
        let (kind, size, modified) = match node {
            Node::Bucket(b) => (EntryKind::Bucket, None, b.created),
            Node::Directory { .. } => (EntryKind::Directory, None, None),
            Node::Object { meta, .. } => (EntryKind::Object, Some(meta.size), meta.last_modified),
        };
        Self {
            name: node.name().to_string(),
            key: node.key().to_string(),
            kind,
            size,
            modified,
            selected,
        }
    }
}

/// Render-ready pane state handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaneSnapshot {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub prefix: String,
    pub cursor: usize,
    pub entries: Vec<EntrySnapshot>,
    pub selected: usize,
    pub selected_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub can_go_back: bool,
}
