//! Command dispatcher
//!
//! Translates discrete user commands into pane, namespace and transfer
//! engine calls, and tracks the browser state:
//!
//! ```text
//! Browsing <-> Selecting -> AwaitingConfirmation -> TransferInProgress -> Browsing
//! ```
//!
//! Destructive operations (delete, move, rename, overwriting copies, bucket
//! deletion) always pass through `AwaitingConfirmation`. Only one transfer
//! runs at a time; a second request is rejected with `Busy`.
//!
//! Listings are fetched on background tasks. A pane changing location keeps
//! showing its old listing until the new one arrives through
//! [`Dispatcher::next_loaded`]; commands that read such a pane are refused
//! with `Busy` meanwhile (see [`Dispatcher::is_blocked`]).

use std::path::PathBuf;

use serde::Serialize;
use tokio::task::{AbortHandle, Id, JoinSet};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::namespace::{Listing, Namespace, DEFAULT_VIEW_LIMIT};
use crate::pane::{Entered, Navigation, PaneSnapshot, PaneState};
use crate::path::{ancestor_prefixes, as_prefix, parse_location, Location, DEFAULT_DELIMITER};
use crate::traits::Node;
use crate::transfer::{
    Destination, ItemResult, OverwritePolicy, SourceRef, TransferEngine, TransferHandle, TransferKind,
    TransferRequest, TransferResult,
};

/// Which pane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browser state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Browsing,
    Selecting,
    AwaitingConfirmation,
    TransferInProgress,
}

/// A discrete user command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    MoveCursor(isize),
    CursorTop,
    CursorBottom,
    /// Open the entry under the cursor; objects are viewed
    Enter,
    Parent,
    Back,
    GoTo(String),
    SwitchPane,
    ToggleSelect,
    SelectAll,
    SelectPattern(String),
    DeselectAll,
    /// Run a batch operation on the active pane's selection
    Execute {
        kind: TransferKind,
        policy: Option<OverwritePolicy>,
        /// Download directory, or the file/directory to upload
        local_path: Option<PathBuf>,
    },
    Confirm,
    Cancel,
    Refresh,
    CreateBucket {
        name: String,
        region: Option<String>,
    },
    /// Delete the named bucket, or the bucket under the cursor
    DeleteBucket(Option<String>),
    CreateFolder(String),
    Rename(String),
    View,
    Search(String),
    ClearFilter,
}

impl Command {
    pub fn execute(kind: TransferKind) -> Self {
        Command::Execute {
            kind,
            policy: None,
            local_path: None,
        }
    }
}

/// What a command did, for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Pane state changed; re-render the snapshot
    Updated,
    /// A pane started fetching a new listing
    Loading { side: Side, location: String },
    ConfirmationRequired(String),
    TransferStarted { kind: TransferKind, sources: usize },
    View { bucket: String, key: String, text: String },
    Message(String),
    Cancelled,
}

/// Operation waiting for confirmation
#[derive(Debug)]
enum Pending {
    Transfer(TransferRequest),
    DeleteBucket(String),
}

impl Pending {
    fn prompt(&self) -> String {
        match self {
            Pending::DeleteBucket(name) => format!("Delete bucket {name}?"),
            Pending::Transfer(request) => {
                let what = match request.sources.as_slice() {
                    [single] => single.to_string(),
                    many => format!("{} items", many.len()),
                };
                let to = match &request.destination {
                    Destination::None => String::new(),
                    Destination::Remote { bucket, prefix } => format!(" to {bucket}/{prefix}"),
                    Destination::Local { path } => format!(" to {}", path.display()),
                };
                match (&request.rename_to, request.policy) {
                    (Some(name), _) => format!("Rename {what} to {name}?"),
                    (None, OverwritePolicy::Fail) => format!("{} {what}{to}?", capitalize(request.kind.as_str())),
                    (None, policy) => format!(
                        "{} {what}{to} ({})?",
                        capitalize(request.kind.as_str()),
                        match policy {
                            OverwritePolicy::OverwriteIfNewer => "overwriting older files",
                            _ => "overwriting existing files",
                        }
                    ),
                }
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub delimiter: String,
    /// Ask before every copy, upload and download
    pub confirm_copy: bool,
    /// Largest object `View` shows
    pub view_limit: u64,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            confirm_copy: false,
            view_limit: DEFAULT_VIEW_LIMIT,
        }
    }
}

impl DispatcherOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delimiter: config.namespace.delimiter.clone(),
            confirm_copy: config.defaults.confirm_copy,
            ..Self::default()
        }
    }
}

/// Render-ready view of the whole browser
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: DispatchState,
    pub active: Side,
    pub left: PaneSnapshot,
    pub right: PaneSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferKind>,
    /// Panes waiting for a listing
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loading: Vec<Side>,
}

/// A background listing that finished
#[derive(Debug)]
pub struct Loaded {
    pub side: Side,
    /// The user asked for this listing; show the pane
    pub announce: bool,
    pub result: Result<()>,
}

/// A listing being fetched for a pane
struct Load {
    id: Id,
    abort: AbortHandle,
    navigation: Navigation,
    announce: bool,
}

type LoadOutput = (Side, Result<std::sync::Arc<Listing>>);

/// Drives two panes, the namespace model and the transfer engine
pub struct Dispatcher {
    namespace: Namespace,
    engine: TransferEngine,
    panes: [PaneState; 2],
    active: Side,
    state: DispatchState,
    pending: Option<Pending>,
    transfer: Option<TransferHandle>,
    last_result: Option<TransferResult>,
    loads: [Option<Load>; 2],
    tasks: JoinSet<LoadOutput>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(engine: TransferEngine, options: DispatcherOptions) -> Self {
        let namespace = engine.namespace().clone();
        Self {
            namespace,
            engine,
            panes: [
                PaneState::new(options.delimiter.clone()),
                PaneState::new(options.delimiter.clone()),
            ],
            active: Side::Left,
            state: DispatchState::Browsing,
            pending: None,
            transfer: None,
            last_result: None,
            loads: [None, None],
            tasks: JoinSet::new(),
            options,
        }
    }

    /// Load the starting location of both panes
    pub async fn init(&mut self, left: Location, right: Location) -> Result<()> {
        self.panes[Side::Left.index()]
            .navigate(&self.namespace, Navigation::open(left))
            .await?;
        self.panes[Side::Right.index()]
            .navigate(&self.namespace, Navigation::open(right))
            .await?;
        Ok(())
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn active_side(&self) -> Side {
        self.active
    }

    pub fn pane(&self, side: Side) -> &PaneState {
        &self.panes[side.index()]
    }

    pub fn active_pane(&self) -> &PaneState {
        self.pane(self.active)
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Result of the most recently finished transfer
    pub fn last_result(&self) -> Option<&TransferResult> {
        self.last_result.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            active: self.active,
            left: self.pane(Side::Left).snapshot(),
            right: self.pane(Side::Right).snapshot(),
            pending: self.pending.as_ref().map(Pending::prompt),
            transfer: self.transfer.as_ref().map(TransferHandle::kind),
            loading: [Side::Left, Side::Right]
                .into_iter()
                .filter(|side| self.loads[side.index()].is_some())
                .collect(),
        }
    }

    /// Whether `command` reads a pane that is changing location
    pub fn is_blocked(&self, command: &Command) -> bool {
        self.reads(command).into_iter().any(|side| self.moving(side))
    }

    /// Panes whose listing `command` reads
    fn reads(&self, command: &Command) -> Vec<Side> {
        match command {
            Command::SwitchPane
            | Command::GoTo(_)
            | Command::Refresh
            | Command::Confirm
            | Command::Cancel
            | Command::CreateBucket { .. }
            | Command::DeleteBucket(Some(_)) => Vec::new(),
            Command::Execute {
                kind: TransferKind::Copy | TransferKind::Move,
                ..
            } => vec![self.active, self.active.other()],
            _ => vec![self.active],
        }
    }

    fn moving(&self, side: Side) -> bool {
        self.loads[side.index()]
            .as_ref()
            .is_some_and(|load| !load.navigation.is_reload())
    }

    /// Apply one command
    ///
    /// Errors leave the browser in its previous state.
    pub async fn dispatch(&mut self, command: Command) -> Result<Response> {
        debug!(?command, state = ?self.state, "Dispatching command");
        if self.state == DispatchState::AwaitingConfirmation
            && !matches!(command, Command::Confirm | Command::Cancel)
        {
            return Err(Error::InvalidCommand(
                "Confirm or cancel the pending operation first".into(),
            ));
        }
        if let Some(side) = self.reads(&command).into_iter().find(|side| self.moving(*side)) {
            return Err(Error::Busy(format!("The {side} pane is still loading")));
        }

        let result = self.apply(command).await;
        self.settle();
        result
    }

    async fn apply(&mut self, command: Command) -> Result<Response> {
        let side = self.active.index();
        let ns = &self.namespace;

        match command {
            Command::MoveCursor(delta) => {
                self.panes[side].move_cursor(delta);
                Ok(Response::Updated)
            }
            Command::CursorTop => {
                self.panes[side].cursor_top();
                Ok(Response::Updated)
            }
            Command::CursorBottom => {
                self.panes[side].cursor_bottom();
                Ok(Response::Updated)
            }
            Command::Enter => match self.panes[side].enter_target() {
                Entered::Object(meta) => self.view(&meta.key).await,
                Entered::Navigate(navigation) => Ok(self.spawn_load(self.active, navigation, true)),
                Entered::Nothing => Ok(Response::Updated),
            },
            Command::Parent => match self.panes[side].parent_target() {
                Some(navigation) => Ok(self.spawn_load(self.active, navigation, true)),
                None => Ok(Response::Updated),
            },
            Command::Back => match self.panes[side].back_target() {
                Some(navigation) => Ok(self.spawn_load(self.active, navigation, true)),
                None => Ok(Response::Updated),
            },
            Command::GoTo(path) => {
                let navigation = self.panes[side].goto_target(&path)?;
                Ok(self.spawn_load(self.active, navigation, true))
            }
            Command::SwitchPane => {
                self.active = self.active.other();
                Ok(Response::Updated)
            }
            Command::ToggleSelect => {
                self.panes[side].toggle_select();
                Ok(Response::Updated)
            }
            Command::SelectAll => {
                self.panes[side].select_all();
                Ok(Response::Updated)
            }
            Command::SelectPattern(pattern) => {
                let added = self.panes[side].select_pattern(&pattern)?;
                Ok(Response::Message(format!("Selected {added} more")))
            }
            Command::DeselectAll => {
                self.panes[side].deselect_all();
                Ok(Response::Updated)
            }
            Command::Search(needle) => {
                self.panes[side].set_filter(Some(needle));
                Ok(Response::Updated)
            }
            Command::ClearFilter => {
                self.panes[side].set_filter(None);
                Ok(Response::Updated)
            }
            Command::Refresh => {
                self.reload_pane(self.active.other());
                let navigation = self.panes[side].reload_target(true);
                Ok(self.spawn_load(self.active, navigation, true))
            }
            Command::View => {
                let key = match self.panes[side].current() {
                    Some(Node::Object { meta, .. }) => meta.key.clone(),
                    _ => return Err(Error::InvalidCommand("Only objects can be viewed".into())),
                };
                self.view(&key).await
            }
            Command::Execute {
                kind,
                policy,
                local_path,
            } => {
                self.ensure_idle()?;
                let request = self.build_request(kind, policy.unwrap_or_default(), local_path)?;
                let confirm = request.needs_confirmation() || (self.options.confirm_copy && !kind.is_destructive());
                if confirm {
                    Ok(self.ask(Pending::Transfer(request)))
                } else {
                    self.start_transfer(request)
                }
            }
            Command::Rename(name) => {
                self.ensure_idle()?;
                let request = self.rename_request(&name)?;
                Ok(self.ask(Pending::Transfer(request)))
            }
            Command::DeleteBucket(name) => {
                self.ensure_idle()?;
                let name = match name {
                    Some(name) => name,
                    None => match self.panes[side].current() {
                        Some(Node::Bucket(bucket)) => bucket.name.clone(),
                        _ => return Err(Error::InvalidCommand("No bucket under the cursor".into())),
                    },
                };
                Ok(self.ask(Pending::DeleteBucket(name)))
            }
            Command::CreateBucket { name, region } => {
                let location = parse_location(&name, &self.options.delimiter)?;
                if !location.prefix.is_empty() || location.bucket.as_deref() != Some(name.as_str()) {
                    return Err(Error::InvalidCommand(format!("Invalid bucket name: {name}")));
                }
                ns.store().create_bucket(&name, region).await?;
                info!(bucket = %name, "Created bucket");
                ns.invalidate_buckets();
                self.reload_panes();
                Ok(Response::Message(format!("Created bucket {name}")))
            }
            Command::CreateFolder(name) => self.create_folder(&name).await,
            Command::Confirm => {
                let pending = self
                    .pending
                    .take()
                    .ok_or_else(|| Error::InvalidCommand("Nothing to confirm".into()))?;
                match pending {
                    Pending::Transfer(request) => self.start_transfer(request),
                    Pending::DeleteBucket(name) => self.delete_bucket(&name).await,
                }
            }
            Command::Cancel => {
                if self.pending.take().is_some() {
                    return Ok(Response::Cancelled);
                }
                if let Some(handle) = &self.transfer {
                    handle.cancel();
                    return Ok(Response::Message(
                        "Cancelling; items already running will finish".into(),
                    ));
                }
                if self.cancel_loads() > 0 {
                    return Ok(Response::Message("Stopped loading".into()));
                }
                self.panes[side].deselect_all();
                Ok(Response::Updated)
            }
        }
    }

    /// Recompute the state from pending work and selections
    fn settle(&mut self) {
        self.state = if self.transfer.is_some() {
            DispatchState::TransferInProgress
        } else if self.pending.is_some() {
            DispatchState::AwaitingConfirmation
        } else if self.panes.iter().any(PaneState::has_selection) {
            DispatchState::Selecting
        } else {
            DispatchState::Browsing
        };
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.transfer.is_some() || self.engine.is_busy() {
            return Err(Error::Busy("A transfer is already running".into()));
        }
        Ok(())
    }

    fn ask(&mut self, pending: Pending) -> Response {
        let prompt = pending.prompt();
        self.pending = Some(pending);
        Response::ConfirmationRequired(prompt)
    }

    fn build_request(
        &self,
        kind: TransferKind,
        policy: OverwritePolicy,
        local_path: Option<PathBuf>,
    ) -> Result<TransferRequest> {
        let active = self.pane(self.active);
        let other = self.pane(self.active.other());

        let request = match kind {
            TransferKind::Copy | TransferKind::Move => {
                let Some(bucket) = &other.location().bucket else {
                    return Err(Error::InvalidCommand(
                        "Open a bucket in the other pane first".into(),
                    ));
                };
                TransferRequest::new(
                    kind,
                    active.operation_sources(),
                    Destination::remote(bucket.clone(), other.location().prefix.clone()),
                )
            }
            TransferKind::Delete => TransferRequest::delete(active.operation_sources()),
            TransferKind::Download => {
                let path = local_path
                    .ok_or_else(|| Error::InvalidCommand("Download needs a local directory".into()))?;
                TransferRequest::new(kind, active.operation_sources(), Destination::local(path))
            }
            TransferKind::Upload => {
                let path = local_path
                    .ok_or_else(|| Error::InvalidCommand("Upload needs a local path".into()))?;
                let Some(bucket) = &active.location().bucket else {
                    return Err(Error::InvalidCommand("Open a bucket to upload into".into()));
                };
                TransferRequest::new(
                    kind,
                    vec![SourceRef::local(path)],
                    Destination::remote(bucket.clone(), active.location().prefix.clone()),
                )
            }
        }
        .with_policy(policy);

        request.validate()?;
        Ok(request)
    }

    fn rename_request(&self, name: &str) -> Result<TransferRequest> {
        let pane = self.active_pane();
        let delimiter = self.options.delimiter.as_str();
        let bare = name.strip_suffix(delimiter).unwrap_or(name);
        if bare.is_empty() || bare.contains(delimiter) {
            return Err(Error::InvalidCommand(format!("Invalid name: {name}")));
        }
        let Some(bucket) = &pane.location().bucket else {
            return Err(Error::InvalidCommand("Buckets cannot be renamed".into()));
        };
        let source = match pane.current() {
            Some(Node::Object { meta, .. }) => SourceRef::object(bucket.clone(), meta.key.clone()),
            Some(Node::Directory { key, .. }) => SourceRef::directory(bucket.clone(), key.clone()),
            _ => return Err(Error::InvalidCommand("Nothing to rename".into())),
        };
        let request = TransferRequest::new(
            TransferKind::Move,
            vec![source],
            Destination::remote(bucket.clone(), pane.location().prefix.clone()),
        )
        .renamed(bare);
        request.validate()?;
        Ok(request)
    }

    fn start_transfer(&mut self, request: TransferRequest) -> Result<Response> {
        let kind = request.kind;
        let sources = request.sources.len();
        let handle = self.engine.start(request)?;
        info!(%kind, sources, "Transfer started");
        self.transfer = Some(handle);
        Ok(Response::TransferStarted { kind, sources })
    }

    async fn view(&self, key: &str) -> Result<Response> {
        let pane = self.active_pane();
        let Some(bucket) = pane.location().bucket.clone() else {
            return Err(Error::InvalidCommand("Only objects can be viewed".into()));
        };
        let data = self
            .namespace
            .read_object(&bucket, key, self.options.view_limit)
            .await?;
        Ok(Response::View {
            bucket,
            key: key.to_string(),
            text: String::from_utf8_lossy(&data).into_owned(),
        })
    }

    async fn create_folder(&mut self, name: &str) -> Result<Response> {
        self.ensure_idle()?;
        let delimiter = self.options.delimiter.clone();
        let bare = name.trim_matches(|c| delimiter.contains(c));
        if bare.is_empty() {
            return Err(Error::InvalidCommand("Folder name cannot be empty".into()));
        }
        let pane = self.active_pane();
        let Some(bucket) = pane.location().bucket.clone() else {
            return Err(Error::InvalidCommand("Open a bucket to create a folder in".into()));
        };
        let key = format!("{}{}", pane.location().prefix, as_prefix(bare, &delimiter));

        self.namespace
            .store()
            .put_object(&bucket, &key, Vec::new(), None)
            .await?;
        for prefix in ancestor_prefixes(&key, &delimiter) {
            self.namespace.invalidate(&bucket, &prefix);
        }
        info!(%bucket, %key, "Created folder");
        self.reload_panes();
        Ok(Response::Message(format!("Created {bucket}/{key}")))
    }

    async fn delete_bucket(&mut self, name: &str) -> Result<Response> {
        self.namespace.store().delete_bucket(name).await?;
        info!(bucket = %name, "Deleted bucket");
        self.namespace.cache().invalidate_bucket(name);
        self.namespace.invalidate_buckets();

        self.reload_panes();
        for side in [Side::Left, Side::Right] {
            if self.pane(side).location().bucket.as_deref() == Some(name) {
                self.spawn_load(side, Navigation::open(Location::buckets()), true);
            }
        }
        Ok(Response::Message(format!("Deleted bucket {name}")))
    }

    // ------------------------------------------------------------------
    // Background listings
    // ------------------------------------------------------------------

    /// Fetch the listing for `navigation` on a background task, replacing
    /// any load already running for the pane
    fn spawn_load(&mut self, side: Side, navigation: Navigation, announce: bool) -> Response {
        if let Some(previous) = self.loads[side.index()].take() {
            previous.abort.abort();
        }
        let namespace = self.namespace.clone();
        let delimiter = self.options.delimiter.clone();
        let target = navigation.clone();
        let abort = self.tasks.spawn(async move {
            let listing = target.load(&namespace, &delimiter).await;
            (side, listing)
        });
        let location = navigation.location().to_string();
        debug!(%side, %location, "Loading listing");
        self.loads[side.index()] = Some(Load {
            id: abort.id(),
            abort,
            navigation,
            announce,
        });
        Response::Loading { side, location }
    }

    /// Re-list a pane after a mutation; a load already running is restarted
    /// so it cannot return pre-mutation data
    fn reload_pane(&mut self, side: Side) {
        let (navigation, announce) = match &self.loads[side.index()] {
            Some(load) => (load.navigation.clone(), load.announce),
            None => (self.pane(side).reload_target(false), false),
        };
        self.spawn_load(side, navigation, announce);
    }

    fn reload_panes(&mut self) {
        self.reload_pane(Side::Left);
        self.reload_pane(Side::Right);
    }

    /// Stop the loads the user asked for; returns how many were stopped
    pub fn cancel_loads(&mut self) -> usize {
        let mut stopped = 0;
        for slot in &mut self.loads {
            if slot.as_ref().is_some_and(|load| load.announce) {
                if let Some(load) = slot.take() {
                    load.abort.abort();
                    stopped += 1;
                }
            }
        }
        stopped
    }

    /// Whether any pane is waiting for a listing
    pub fn is_loading(&self) -> bool {
        self.loads.iter().any(Option::is_some)
    }

    /// Wait for the next current listing and apply it to its pane
    ///
    /// Returns `None` when no load is running. Cancel safe: a listing is
    /// applied in the same poll that receives it.
    pub async fn next_loaded(&mut self) -> Option<Loaded> {
        while self.is_loading() {
            let (id, output) = match self.tasks.join_next_with_id().await? {
                Ok((id, output)) => (id, Ok(output)),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => (e.id(), Err(e)),
            };
            let Some(index) = self.loads.iter().position(|l| l.as_ref().is_some_and(|l| l.id == id)) else {
                continue;
            };
            let Some(load) = self.loads[index].take() else {
                continue;
            };
            let side = if index == 0 { Side::Left } else { Side::Right };

            let result = match output {
                Ok((_, Ok(listing))) => {
                    if !self.panes[index].apply(load.navigation, listing) {
                        debug!(%side, "Pane moved on; dropped listing");
                    }
                    Ok(())
                }
                Ok((_, Err(e))) => Err(e),
                Err(e) => Err(Error::General(format!("Listing task failed: {e}"))),
            };
            if let Err(e) = &result {
                warn!(%side, error = %e, "Could not load pane");
            }
            self.settle();
            return Some(Loaded {
                side,
                announce: load.announce,
                result,
            });
        }
        None
    }

    /// Wait until no pane is loading
    pub async fn wait_loads(&mut self) -> Vec<Loaded> {
        let mut loaded = Vec::new();
        while let Some(done) = self.next_loaded().await {
            loaded.push(done);
        }
        loaded
    }

    // ------------------------------------------------------------------
    // Transfer progress
    // ------------------------------------------------------------------

    /// Item results reported since the last call
    pub fn poll_progress(&mut self) -> Vec<ItemResult> {
        self.transfer
            .as_mut()
            .map(TransferHandle::drain_progress)
            .unwrap_or_default()
    }

    /// Finish the running transfer if it is done, without waiting
    pub async fn try_complete_transfer(&mut self) -> Result<Option<TransferResult>> {
        if !self.transfer.as_ref().is_some_and(TransferHandle::is_finished) {
            return Ok(None);
        }
        self.finish_transfer().await.map(Some)
    }

    /// Wait for the running transfer, if any, and finish it
    ///
    /// Also waits for the pane reloads the transfer triggers.
    pub async fn wait_transfer(&mut self) -> Result<Option<TransferResult>> {
        if self.transfer.is_none() {
            return Ok(None);
        }
        let result = self.finish_transfer().await;
        for loaded in self.wait_loads().await {
            debug!(side = %loaded.side, ok = loaded.result.is_ok(), "Pane reloaded");
        }
        result.map(Some)
    }

    async fn finish_transfer(&mut self) -> Result<TransferResult> {
        let Some(handle) = self.transfer.take() else {
            return Err(Error::InvalidCommand("No transfer is running".into()));
        };
        let outcome = handle.wait().await;

        for pane in &mut self.panes {
            pane.deselect_all();
        }
        self.reload_panes();
        self.settle();

        let result = outcome?;
        info!(summary = %result.summary(), "Transfer complete");
        self.last_result = Some(result.clone());
        Ok(result)
    }
}
