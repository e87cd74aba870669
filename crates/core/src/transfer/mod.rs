//! Batch transfer requests and results
//!
//! A [`TransferRequest`] names what to copy, move, delete, upload or
//! download. The [`TransferEngine`] expands it into independent work items
//! and reports one [`ItemResult`] per item plus an aggregate
//! [`TransferResult`].

mod engine;
mod local;

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

pub use engine::{TransferEngine, TransferHandle};

/// Operation applied to every item of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Copy,
    Move,
    Delete,
    Upload,
    Download,
}

impl TransferKind {
    /// Whether the operation removes data at the source
    pub fn is_destructive(self) -> bool {
        matches!(self, TransferKind::Move | TransferKind::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferKind::Copy => "copy",
            TransferKind::Move => "move",
            TransferKind::Delete => "delete",
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens when the destination already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Leave the destination untouched and skip the item
    #[default]
    Fail,
    Overwrite,
    /// Replace only when the source was modified after the destination
    OverwriteIfNewer,
}

impl FromStr for OverwritePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail" => Ok(OverwritePolicy::Fail),
            "overwrite" => Ok(OverwritePolicy::Overwrite),
            "overwrite-if-newer" | "if-newer" | "newer" => Ok(OverwritePolicy::OverwriteIfNewer),
            other => Err(Error::InvalidCommand(format!(
                "Unknown overwrite policy '{other}' (expected fail, overwrite or if-newer)"
            ))),
        }
    }
}

/// One source named by a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    Object { bucket: String, key: String },
    /// Synthetic directory, expanded to every object under the prefix
    Directory { bucket: String, prefix: String },
    /// Local file, or a local directory walked recursively
    Local { path: PathBuf },
}

impl SourceRef {
    pub fn object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        SourceRef::Object {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn directory(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        SourceRef::Directory {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        SourceRef::Local { path: path.into() }
    }

    fn is_remote(&self) -> bool {
        !matches!(self, SourceRef::Local { .. })
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRef::Object { bucket, key } => write!(f, "{bucket}/{key}"),
            SourceRef::Directory { bucket, prefix } => write!(f, "{bucket}/{prefix}"),
            SourceRef::Local { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Where items land
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    /// Delete has no destination
    #[default]
    None,
    Remote { bucket: String, prefix: String },
    Local { path: PathBuf },
}

impl Destination {
    pub fn remote(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Destination::Remote {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Destination::Local { path: path.into() }
    }
}

/// A batch operation, consumed once by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub kind: TransferKind,
    pub sources: Vec<SourceRef>,
    pub destination: Destination,
    #[serde(default)]
    pub policy: OverwritePolicy,
    /// New final name for a single-source request (rename)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<String>,
}

impl TransferRequest {
    pub fn new(kind: TransferKind, sources: Vec<SourceRef>, destination: Destination) -> Self {
        Self {
            kind,
            sources,
            destination,
            policy: OverwritePolicy::default(),
            rename_to: None,
        }
    }

    pub fn delete(sources: Vec<SourceRef>) -> Self {
        Self::new(TransferKind::Delete, sources, Destination::None)
    }

    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.rename_to = Some(name.into());
        self
    }

    /// Whether the request must be confirmed before it runs
    pub fn needs_confirmation(&self) -> bool {
        self.kind.is_destructive() || self.policy != OverwritePolicy::Fail
    }

    /// Reject source/destination shapes the operation cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::InvalidCommand("Nothing selected".into()));
        }
        let sources_ok = match self.kind {
            TransferKind::Upload => self.sources.iter().all(|s| !s.is_remote()),
            _ => self.sources.iter().all(SourceRef::is_remote),
        };
        if !sources_ok {
            return Err(Error::InvalidCommand(format!(
                "{} cannot take {} sources",
                self.kind,
                if self.kind == TransferKind::Upload { "remote" } else { "local" }
            )));
        }
        let destination_ok = match (self.kind, &self.destination) {
            (TransferKind::Delete, _) => true,
            (TransferKind::Download, Destination::Local { .. }) => true,
            (TransferKind::Copy | TransferKind::Move | TransferKind::Upload, Destination::Remote { .. }) => true,
            _ => false,
        };
        if !destination_ok {
            return Err(Error::InvalidCommand(format!(
                "{} needs a {} destination",
                self.kind,
                if self.kind == TransferKind::Download { "local" } else { "remote" }
            )));
        }
        if self.rename_to.is_some() && self.sources.len() != 1 {
            return Err(Error::InvalidCommand("Rename takes exactly one source".into()));
        }
        Ok(())
    }
}

/// Why an item was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Destination present and the policy is `fail`
    Exists,
    /// Destination is at least as recent as the source
    NotNewer,
    /// Cancelled before the item started
    Cancelled,
    /// Delete target was already gone
    AlreadyAbsent,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::Exists => "exists",
            SkipReason::NotNewer => "not newer",
            SkipReason::Cancelled => "cancelled",
            SkipReason::AlreadyAbsent => "already absent",
        }
    }
}

/// Terminal outcome of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { kind: ErrorKind, message: String },
    Skipped { reason: SkipReason },
}

impl Outcome {
    pub fn failed(err: &Error) -> Self {
        Outcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Outcome::Skipped { reason }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "ok"),
            Outcome::Failed { kind, message } => write!(f, "failed ({kind}): {message}"),
            Outcome::Skipped { reason } => write!(f, "skipped ({})", reason.label()),
        }
    }
}

/// Result of one work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub outcome: Outcome,
    /// Bytes written to the destination
    pub bytes: u64,
    /// Backend attempts made, including retries
    pub attempts: u32,
}

impl ItemResult {
    pub fn new(source: impl Into<String>, target: Option<String>, outcome: Outcome) -> Self {
        Self {
            source: source.into(),
            target,
            outcome,
            bytes: 0,
            attempts: 0,
        }
    }
}

/// Aggregate result of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub kind: TransferKind,
    pub items: Vec<ItemResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Bytes written across all succeeded items
    pub bytes: u64,
    pub cancelled: bool,
}

impl TransferResult {
    pub fn new(kind: TransferKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            bytes: 0,
            cancelled: false,
        }
    }

    pub fn record(&mut self, item: ItemResult) {
        match item.outcome {
            Outcome::Succeeded => {
                self.succeeded += 1;
                self.bytes += item.bytes;
            }
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
        self.items.push(item);
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items that were copied but whose source could not be removed
    pub fn partial_failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|i| {
            matches!(
                i.outcome,
                Outcome::Failed {
                    kind: ErrorKind::PartialFailure,
                    ..
                }
            )
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// One-line summary for status display
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}: {} succeeded, {} failed, {} skipped",
            self.kind, self.succeeded, self.failed, self.skipped
        );
        let partial = self.partial_failures().count();
        if partial > 0 {
            line.push_str(&format!(" ({partial} copied but not deleted)"));
        }
        if self.cancelled {
            line.push_str(" [cancelled]");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_shapes() {
        let copy = TransferRequest::new(
            TransferKind::Copy,
            vec![SourceRef::object("demo", "a")],
            Destination::local("/tmp"),
        );
        assert!(copy.validate().is_err());

        let upload = TransferRequest::new(
            TransferKind::Upload,
            vec![SourceRef::object("demo", "a")],
            Destination::remote("demo", ""),
        );
        assert!(upload.validate().is_err());

        let delete = TransferRequest::delete(vec![SourceRef::directory("demo", "logs/")]);
        assert!(delete.validate().is_ok());
        assert!(TransferRequest::delete(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_confirmation_rules() {
        let copy = TransferRequest::new(
            TransferKind::Copy,
            vec![SourceRef::object("demo", "a")],
            Destination::remote("archive", ""),
        );
        assert!(!copy.needs_confirmation());
        assert!(copy.clone().with_policy(OverwritePolicy::Overwrite).needs_confirmation());
        assert!(TransferRequest::delete(vec![SourceRef::object("demo", "a")]).needs_confirmation());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("fail".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Fail);
        assert_eq!(
            "if-newer".parse::<OverwritePolicy>().unwrap(),
            OverwritePolicy::OverwriteIfNewer
        );
        assert!("sometimes".parse::<OverwritePolicy>().is_err());
    }

    #[test]
    fn test_result_counts_and_summary() {
        let mut result = TransferResult::new(TransferKind::Move);
        let mut ok = ItemResult::new("demo/a", Some("archive/a".into()), Outcome::Succeeded);
        ok.bytes = 10;
        result.record(ok);
        result.record(ItemResult::new(
            "demo/b",
            Some("archive/b".into()),
            Outcome::failed(&Error::PartialFailure("demo/b".into())),
        ));
        result.record(ItemResult::new("demo/c", None, Outcome::skipped(SkipReason::Exists)));

        assert_eq!((result.succeeded, result.failed, result.skipped), (1, 1, 1));
        assert_eq!(result.bytes, 10);
        assert_eq!(
            result.summary(),
            "move: 1 succeeded, 1 failed, 1 skipped (1 copied but not deleted)"
        );
    }
}
