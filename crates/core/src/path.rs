//! Path parsing and key-prefix arithmetic
//!
//! A pane location is `bucket[/prefix]`, or the bucket list when no bucket is
//! set. Keys are flat strings; the helpers here derive the virtual hierarchy
//! (parent prefix, display name, ancestors) from a delimiter.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default key delimiter
pub const DEFAULT_DELIMITER: &str = "/";

/// Where a pane points: the bucket list, or a prefix inside a bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Bucket name; `None` means the bucket list view
    pub bucket: Option<String>,

    /// Key prefix, empty at the bucket root, otherwise ends with the delimiter
    pub prefix: String,
}

impl Location {
    /// The bucket list view
    pub fn buckets() -> Self {
        Self::default()
    }

    /// A prefix inside a bucket
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            prefix: prefix.into(),
        }
    }

    pub fn is_bucket_list(&self) -> bool {
        self.bucket.is_none()
    }

    /// One level up: prefix parent, then the bucket root, then the bucket list
    pub fn parent(&self, delimiter: &str) -> Option<Self> {
        let bucket = self.bucket.as_ref()?;
        if self.prefix.is_empty() {
            return Some(Self::buckets());
        }
        Some(Self::new(bucket.clone(), parent_prefix(&self.prefix, delimiter)))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.bucket {
            None => write!(f, "/"),
            Some(bucket) => write!(f, "{bucket}/{}", self.prefix),
        }
    }
}

/// Parse `bucket[/prefix]` into a location
///
/// A leading `/` or an empty string denotes the bucket list. The bucket is
/// always separated by the first `/`, whatever the key delimiter, matching
/// how locations are displayed; `delimiter` only shapes the prefix, which is
/// normalized to end with it.
pub fn parse_location(input: &str, delimiter: &str) -> Result<Location> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return Ok(Location::buckets());
    }

    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let (bucket, prefix) = match trimmed.split_once('/') {
        Some((bucket, rest)) => (bucket, rest),
        None => (trimmed, ""),
    };

    if bucket.is_empty() {
        return Err(Error::InvalidPath("Bucket name cannot be empty".into()));
    }
    if !is_valid_bucket_name(bucket) {
        return Err(Error::InvalidPath(format!("Invalid bucket name: {bucket}")));
    }

    Ok(Location::new(bucket, as_prefix(prefix, delimiter)))
}

/// Normalize a path fragment to a prefix (empty, or ending with the delimiter)
pub fn as_prefix(fragment: &str, delimiter: &str) -> String {
    if fragment.is_empty() || fragment.ends_with(delimiter) {
        fragment.to_string()
    } else {
        format!("{fragment}{delimiter}")
    }
}

/// Prefix containing `key`, e.g. `a/b/c.txt` -> `a/b/`, `a/b/` -> `a/`
pub fn parent_prefix(key: &str, delimiter: &str) -> String {
    let trimmed = key.strip_suffix(delimiter).unwrap_or(key);
    match trimmed.rfind(delimiter) {
        Some(pos) => trimmed[..pos + delimiter.len()].to_string(),
        None => String::new(),
    }
}

/// Last path segment, keeping a trailing delimiter for directory keys
pub fn base_name<'a>(key: &'a str, delimiter: &str) -> &'a str {
    let parent_len = parent_prefix(key, delimiter).len();
    &key[parent_len..]
}

/// Every prefix whose listing can change when `key` appears or disappears,
/// from the immediate parent up to the bucket root
pub fn ancestor_prefixes(key: &str, delimiter: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = parent_prefix(key, delimiter);
    loop {
        let done = current.is_empty();
        prefixes.push(current.clone());
        if done {
            break;
        }
        current = parent_prefix(&current, delimiter);
    }
    prefixes
}

/// Lenient bucket name check: lowercase letters, digits, dots and hyphens
fn is_valid_bucket_name(name: &str) -> bool {
    (1..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' || c == '_')
}
