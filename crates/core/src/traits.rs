//! ObjectStore trait definition
//!
//! This trait defines the storage backend consumed by the namespace model
//! and the transfer engine. It allows the core to be decoupled from the
//! specific S3 SDK implementation. Calls are awaited to completion by the
//! core, which owns all concurrency around them.

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storage class of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageClass {
    #[default]
    Standard,
    ReducedRedundancy,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    Glacier,
    GlacierIr,
    DeepArchive,
    Other(String),
}

impl StorageClass {
    pub fn as_str(&self) -> &str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::Glacier => "GLACIER",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::Other(s) => s,
        }
    }
}

impl From<&str> for StorageClass {
    fn from(value: &str) -> Self {
        match value {
            "" | "STANDARD" => StorageClass::Standard,
            "REDUCED_REDUNDANCY" => StorageClass::ReducedRedundancy,
            "STANDARD_IA" => StorageClass::StandardIa,
            "ONEZONE_IA" => StorageClass::OnezoneIa,
            "INTELLIGENT_TIERING" => StorageClass::IntelligentTiering,
            "GLACIER" => StorageClass::Glacier,
            "GLACIER_IR" => StorageClass::GlacierIr,
            "DEEP_ARCHIVE" => StorageClass::DeepArchive,
            other => StorageClass::Other(other.to_string()),
        }
    }
}

impl From<String> for StorageClass {
    fn from(value: String) -> Self {
        StorageClass::from(value.as_str())
    }
}

impl From<StorageClass> for String {
    fn from(value: StorageClass) -> Self {
        value.as_str().to_string()
    }
}

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Full object key
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// ETag (usually MD5 for single-part uploads), quotes stripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Storage class
    #[serde(default)]
    pub storage_class: StorageClass,

    /// Content type, when the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ObjectMeta {
    /// Create metadata for a key with the given size
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
            storage_class: StorageClass::Standard,
            content_type: None,
        }
    }
}

/// A bucket as shown in the bucket list view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: None,
        }
    }
}

/// A virtual namespace entry
///
/// Directories are synthetic: they exist only as a common key prefix and
/// carry no size or etag. Directory keys always end with the delimiter, so a
/// directory and an object never share the exact same full key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Common key prefix, e.g. `logs/2024/sub/`
    Directory { key: String, name: String },

    /// Concrete object
    Object { name: String, meta: ObjectMeta },

    /// Bucket (only in the bucket list view)
    Bucket(BucketInfo),
}

impl Node {
    /// Build a directory node for `key` as seen from `prefix`
    pub fn directory(prefix: &str, key: impl Into<String>) -> Self {
        let key = key.into();
        let name = key.strip_prefix(prefix).unwrap_or(&key).to_string();
        Node::Directory { key, name }
    }

    /// Build an object node as seen from `prefix`
    pub fn object(prefix: &str, meta: ObjectMeta) -> Self {
        let name = meta
            .key
            .strip_prefix(prefix)
            .unwrap_or(&meta.key)
            .to_string();
        Node::Object { name, meta }
    }

    /// Full key (bucket name for buckets)
    pub fn key(&self) -> &str {
        match self {
            Node::Directory { key, .. } => key,
            Node::Object { meta, .. } => &meta.key,
            Node::Bucket(b) => &b.name,
        }
    }

    /// Display name relative to the listed prefix
    pub fn name(&self) -> &str {
        match self {
            Node::Directory { name, .. } | Node::Object { name, .. } => name,
            Node::Bucket(b) => &b.name,
        }
    }

    /// Whether this node can be entered (directory or bucket)
    pub fn is_container(&self) -> bool {
        !matches!(self, Node::Object { .. })
    }

    pub fn as_object(&self) -> Option<&ObjectMeta> {
        match self {
            Node::Object { meta, .. } => Some(meta),
            _ => None,
        }
    }
}

/// One page of a listing, as returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    /// Prefix the page was listed under
    pub prefix: String,

    /// Child nodes in provider order
    pub nodes: Vec<Node>,

    /// Continuation token; `None` on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

/// Parameters for a single `list_objects` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,

    /// Prefix to filter by (empty for the bucket root)
    pub prefix: String,

    /// Delimiter for grouping; `None` lists every key under the prefix
    pub delimiter: Option<String>,

    /// Continuation token from the previous page
    pub continuation_token: Option<String>,

    /// Maximum number of keys to return per request
    pub max_keys: Option<i32>,
}

impl ListRequest {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn max_keys(mut self, max_keys: Option<i32>) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// Trait for S3-compatible storage operations
///
/// This trait is implemented by the S3 adapter and by [`crate::MemoryStore`],
/// and can be mocked for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List buckets
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Fetch one page of keys under a prefix
    async fn list_objects(&self, request: &ListRequest) -> Result<ListingPage>;

    /// Get object metadata
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta>;

    /// Server-side copy
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMeta>;

    /// Delete one object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Store an object
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectMeta>;

    /// Get object content as bytes
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Create a bucket, optionally constrained to a region
    async fn create_bucket(&self, name: &str, region: Option<String>) -> Result<()>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_node_name() {
        let node = Node::directory("logs/2024/", "logs/2024/sub/");
        assert_eq!(node.key(), "logs/2024/sub/");
        assert_eq!(node.name(), "sub/");
        assert!(node.is_container());
        assert!(node.as_object().is_none());
    }

    #[test]
    fn test_object_node_name() {
        let node = Node::object("logs/2024/", ObjectMeta::new("logs/2024/a.txt", 10));
        assert_eq!(node.key(), "logs/2024/a.txt");
        assert_eq!(node.name(), "a.txt");
        assert!(!node.is_container());
        assert_eq!(node.as_object().map(|m| m.size), Some(10));
    }

    #[test]
    fn test_storage_class_round_trip() {
        assert_eq!(StorageClass::from("GLACIER"), StorageClass::Glacier);
        assert_eq!(StorageClass::from(""), StorageClass::Standard);
        let custom = StorageClass::from("COLD");
        assert_eq!(custom.as_str(), "COLD");

        let json = serde_json::to_string(&StorageClass::StandardIa).unwrap();
        assert_eq!(json, "\"STANDARD_IA\"");
    }

    #[test]
    fn test_list_request_builder() {
        let req = ListRequest::new("demo", "logs/")
            .delimiter("/")
            .max_keys(Some(2))
            .continuation_token(Some("t1".into()));
        assert_eq!(req.delimiter.as_deref(), Some("/"));
        assert_eq!(req.max_keys, Some(2));
        assert_eq!(req.continuation_token.as_deref(), Some("t1"));
    }
}
