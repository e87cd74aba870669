//! In-memory ObjectStore
//!
//! A complete backend held in process memory: buckets, keys, pagination and
//! delimiter grouping behave like an S3 `ListObjectsV2` endpoint. It powers
//! the `--memory` demo mode and the test suites, which is why it can inject
//! faults and latency and count calls per operation.

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::error::{Error, ErrorKind, Result};
use crate::traits::{BucketInfo, ListRequest, ListingPage, Node, ObjectMeta, ObjectStore};

/// Default number of entries per listing page
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Backend operations, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListBuckets,
    List,
    Head,
    Copy,
    Delete,
    Put,
    Get,
    CreateBucket,
    DeleteBucket,
}

#[derive(Debug, Clone)]
struct Fault {
    kind: ErrorKind,
    /// Remaining failures; `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    meta: ObjectMeta,
}

#[derive(Debug, Default)]
struct Bucket {
    created: Option<Timestamp>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    faults: HashMap<(StoreOp, String), Fault>,
    calls: HashMap<StoreOp, usize>,
}

/// In-memory storage backend
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
    latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
        }
    }

    /// Cap listing pages at `page_size` entries regardless of the request
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a bucket synchronously
    pub fn add_bucket(&self, name: &str) {
        self.state().buckets.entry(name.to_string()).or_insert_with(|| Bucket {
            created: Some(Timestamp::now()),
            objects: BTreeMap::new(),
        });
    }

    /// Store an object synchronously, creating the bucket if needed
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> ObjectMeta {
        self.insert_at(bucket, key, data, Timestamp::now())
    }

    /// Store an object with an explicit last-modified time
    pub fn insert_at(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        last_modified: Timestamp,
    ) -> ObjectMeta {
        self.add_bucket(bucket);
        let data = data.into();
        let meta = object_meta(key, &data, last_modified);
        let mut state = self.state();
        if let Some(b) = state.buckets.get_mut(bucket) {
            b.objects.insert(
                key.to_string(),
                StoredObject {
                    data,
                    meta: meta.clone(),
                },
            );
        }
        meta
    }

    /// Content of an object, if present
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.data.clone())
    }

    /// Remove an object synchronously; returns whether it existed
    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        self.state()
            .buckets
            .get_mut(bucket)
            .is_some_and(|b| b.objects.remove(key).is_some())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object_data(bucket, key).is_some()
    }

    /// All keys of a bucket in order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.state()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make `op` on `target` fail with `kind`
    ///
    /// `target` is the key for object operations (the source key for copy),
    /// the prefix for listings and the bucket name for bucket operations.
    /// With `times = Some(n)` the first `n` calls fail and later calls succeed.
    pub fn inject_fault(&self, op: StoreOp, target: &str, kind: ErrorKind, times: Option<u32>) {
        self.state().faults.insert(
            (op, target.to_string()),
            Fault {
                kind,
                remaining: times,
            },
        );
    }

    /// Number of calls made for `op`
    pub fn calls(&self, op: StoreOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp, target: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;

        let key = (op, target.to_string());
        let (kind, exhausted) = match state.faults.get_mut(&key) {
            None => return Ok(()),
            Some(fault) => match fault.remaining.as_mut() {
                None => (fault.kind, false),
                Some(0) => (fault.kind, true),
                Some(n) => {
                    *n -= 1;
                    (fault.kind, false)
                }
            },
        };
        if exhausted {
            state.faults.remove(&key);
            return Ok(());
        }
        Err(fault_error(kind, &format!("injected {op:?} fault on '{target}'")))
    }
}

fn fault_error(kind: ErrorKind, message: &str) -> Error {
    let message = message.to_string();
    match kind {
        ErrorKind::NotFound => Error::NotFound(message),
        ErrorKind::AccessDenied => Error::AccessDenied(message),
        ErrorKind::Transient => Error::Transient(message),
        ErrorKind::Conflict => Error::Conflict(message),
        ErrorKind::PartialFailure => Error::PartialFailure(message),
        ErrorKind::Busy => Error::Busy(message),
        ErrorKind::Cancelled => Error::Cancelled,
        ErrorKind::InvalidInput => Error::InvalidPath(message),
        ErrorKind::Other => Error::General(message),
    }
}

fn object_meta(key: &str, data: &[u8], last_modified: Timestamp) -> ObjectMeta {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    let mut meta = ObjectMeta::new(key, data.len() as u64);
    meta.etag = Some(format!("{:016x}", hasher.finish()));
    meta.last_modified = Some(last_modified);
    meta
}

fn no_bucket(bucket: &str) -> Error {
    Error::NotFound(format!("Bucket not found: {bucket}"))
}

fn no_key(bucket: &str, key: &str) -> Error {
    Error::NotFound(format!("{bucket}/{key}"))
}

/// Entries of one listing page: objects, or common prefixes when a delimiter is set
fn list_page(bucket: &Bucket, request: &ListRequest, page_size: usize) -> ListingPage {
    let prefix = request.prefix.as_str();
    let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
    let limit = request
        .max_keys
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n > 0)
        .map_or(page_size, |n| n.min(page_size));
    let after = request.continuation_token.as_deref();

    let mut nodes = Vec::new();
    let mut last_marker: Option<String> = None;
    let mut truncated = false;

    for (key, object) in bucket.objects.range(prefix.to_string()..) {
        if !key.starts_with(prefix) {
            break;
        }
        if let Some(after) = after {
            let under_token_prefix =
                delimiter.is_some_and(|d| after.ends_with(d)) && key.starts_with(after);
            if key.as_str() <= after || under_token_prefix {
                continue;
            }
        }

        let rest = &key[prefix.len()..];
        let entry = match delimiter.and_then(|d| rest.find(d).map(|i| (d, i))) {
            Some((d, idx)) => {
                let common = format!("{prefix}{}", &rest[..idx + d.len()]);
                if last_marker.as_deref() == Some(common.as_str()) {
                    continue;
                }
                Node::directory(prefix, common)
            }
            None => Node::object(prefix, object.meta.clone()),
        };

        if nodes.len() == limit {
            truncated = true;
            break;
        }
        last_marker = Some(entry.key().to_string());
        nodes.push(entry);
    }

    ListingPage {
        prefix: prefix.to_string(),
        nodes,
        continuation_token: if truncated { last_marker } else { None },
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.enter(StoreOp::ListBuckets, "").await?;
        Ok(self
            .state()
            .buckets
            .iter()
            .map(|(name, b)| BucketInfo {
                name: name.clone(),
                created: b.created,
            })
            .collect())
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<ListingPage> {
        self.enter(StoreOp::List, &request.prefix).await?;
        let state = self.state();
        let bucket = state
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| no_bucket(&request.bucket))?;
        Ok(list_page(bucket, request, self.page_size))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.enter(StoreOp::Head, key).await?;
        let state = self.state();
        let b = state.buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;
        b.objects
            .get(key)
            .map(|o| o.meta.clone())
            .ok_or_else(|| no_key(bucket, key))
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMeta> {
        self.enter(StoreOp::Copy, src_key).await?;
        let mut state = self.state();
        let data = state
            .buckets
            .get(src_bucket)
            .ok_or_else(|| no_bucket(src_bucket))?
            .objects
            .get(src_key)
            .map(|o| o.data.clone())
            .ok_or_else(|| no_key(src_bucket, src_key))?;
        let dst = state
            .buckets
            .get_mut(dst_bucket)
            .ok_or_else(|| no_bucket(dst_bucket))?;
        let meta = object_meta(dst_key, &data, Timestamp::now());
        dst.objects.insert(
            dst_key.to_string(),
            StoredObject {
                data,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.enter(StoreOp::Delete, key).await?;
        let mut state = self.state();
        let b = state.buckets.get_mut(bucket).ok_or_else(|| no_bucket(bucket))?;
        // Deleting a missing key succeeds, as it does on S3
        b.objects.remove(key);
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectMeta> {
        self.enter(StoreOp::Put, key).await?;
        let mut state = self.state();
        let b = state.buckets.get_mut(bucket).ok_or_else(|| no_bucket(bucket))?;
        let mut meta = object_meta(key, &data, Timestamp::now());
        meta.content_type = content_type;
        b.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.enter(StoreOp::Get, key).await?;
        let state = self.state();
        let b = state.buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;
        b.objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| no_key(bucket, key))
    }

    async fn create_bucket(&self, name: &str, _region: Option<String>) -> Result<()> {
        self.enter(StoreOp::CreateBucket, name).await?;
        let mut state = self.state();
        if state.buckets.contains_key(name) {
            return Err(Error::Conflict(format!("Bucket already exists: {name}")));
        }
        state.buckets.insert(
            name.to_string(),
            Bucket {
                created: Some(Timestamp::now()),
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.enter(StoreOp::DeleteBucket, name).await?;
        let mut state = self.state();
        let bucket = state.buckets.get(name).ok_or_else(|| no_bucket(name))?;
        if !bucket.objects.is_empty() {
            return Err(Error::Conflict(format!("Bucket not empty: {name}")));
        }
        state.buckets.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for key in ["logs/2024/a.txt", "logs/2024/b.txt", "logs/2024/sub/c.txt", "top.txt"] {
            store.insert("demo", key, key.as_bytes());
        }
        store
    }

    #[tokio::test]
    async fn test_list_with_delimiter_groups_prefixes() {
        let store = seeded();
        let page = store
            .list_objects(&ListRequest::new("demo", "logs/2024/").delimiter("/"))
            .await
            .unwrap();

        let keys: Vec<&str> = page.nodes.iter().map(Node::key).collect();
        assert_eq!(keys, vec!["logs/2024/a.txt", "logs/2024/b.txt", "logs/2024/sub/"]);
        assert!(page.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_list_without_delimiter_is_flat() {
        let store = seeded();
        let page = store
            .list_objects(&ListRequest::new("demo", "logs/"))
            .await
            .unwrap();
        assert_eq!(page.nodes.len(), 3);
        assert!(page.nodes.iter().all(|n| n.as_object().is_some()));
    }

    #[tokio::test]
    async fn test_pagination_skips_whole_common_prefix() {
        let store = MemoryStore::new().with_page_size(1);
        for key in ["a/1", "a/2", "a/3", "b.txt"] {
            store.insert("demo", key, "x");
        }

        let first = store
            .list_objects(&ListRequest::new("demo", "").delimiter("/"))
            .await
            .unwrap();
        assert_eq!(first.nodes[0].key(), "a/");
        let token = first.continuation_token.clone();
        assert_eq!(token.as_deref(), Some("a/"));

        let second = store
            .list_objects(&ListRequest::new("demo", "").delimiter("/").continuation_token(token))
            .await
            .unwrap();
        assert_eq!(second.nodes[0].key(), "b.txt");
        assert!(second.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_missing_bucket_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .list_objects(&ListRequest::new("nope", ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fault_injection_counts_down() {
        let store = seeded();
        store.inject_fault(StoreOp::Get, "top.txt", ErrorKind::Transient, Some(2));

        assert!(store.get_object("demo", "top.txt").await.unwrap_err().is_transient());
        assert!(store.get_object("demo", "top.txt").await.is_err());
        assert_eq!(store.get_object("demo", "top.txt").await.unwrap(), b"top.txt");
        assert_eq!(store.calls(StoreOp::Get), 3);
    }

    #[tokio::test]
    async fn test_copy_and_delete() {
        let store = seeded();
        store.add_bucket("archive");
        store
            .copy_object("demo", "top.txt", "archive", "copied.txt")
            .await
            .unwrap();
        assert_eq!(store.object_data("archive", "copied.txt").unwrap(), b"top.txt");

        store.delete_object("demo", "top.txt").await.unwrap();
        assert!(!store.contains("demo", "top.txt"));
        store.delete_object("demo", "top.txt").await.unwrap();
        assert_eq!(store.calls(StoreOp::Delete), 2);

        let err = store.delete_object("nosuch", "top.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = MemoryStore::new();
        store.create_bucket("fresh", None).await.unwrap();
        assert_eq!(
            store.create_bucket("fresh", None).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        store.put_object("fresh", "k", vec![1], None).await.unwrap();
        assert!(store.delete_bucket("fresh").await.is_err());
        store.delete_object("fresh", "k").await.unwrap();
        store.delete_bucket("fresh").await.unwrap();
        assert!(store.list_buckets().await.unwrap().is_empty());
    }
}
