//! Virtual hierarchical namespace over a flat key space
//!
//! `Namespace` answers "what exists under this prefix" without exposing
//! pagination. Complete listings are cached in a [`ListingCache`] shared with
//! the transfer engine, which invalidates the prefixes it mutates. Backend
//! errors are propagated as-is; retry lives in the transfer engine and in
//! the user's manual refresh.

mod cache;
mod synth;

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use jiff::Timestamp;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::path::Location;
use crate::traits::{ListRequest, ListingPage, Node, ObjectMeta, ObjectStore};

pub use cache::{CacheStats, Fetch, ListingCache, ListingKey};
pub use synth::{synthesize, Synthesizer};

/// Largest object `read_object` returns by default
pub const DEFAULT_VIEW_LIMIT: u64 = 1024 * 1024;

/// A complete, merged listing of one location
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub location: Location,
    pub delimiter: String,
    nodes: Vec<Node>,
    /// Number of backend pages merged into this listing
    pub pages: usize,
    pub fetched_at: Timestamp,
}

impl Listing {
    pub fn new(location: Location, delimiter: impl Into<String>, nodes: Vec<Node>, pages: usize) -> Self {
        Self {
            location,
            delimiter: delimiter.into(),
            nodes,
            pages,
            fetched_at: Timestamp::now(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Lazy, restartable walk over the listed nodes
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Node with the given full key
    pub fn find(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key() == key)
    }

    /// Objects only, skipping directories
    pub fn objects(&self) -> impl Iterator<Item = &ObjectMeta> {
        self.nodes.iter().filter_map(Node::as_object)
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Namespace model over one storage backend
#[derive(Clone)]
pub struct Namespace {
    store: Arc<dyn ObjectStore>,
    cache: ListingCache,
    page_size: Option<i32>,
}

impl Namespace {
    pub fn new(store: Arc<dyn ObjectStore>, cache: ListingCache) -> Self {
        Self {
            store,
            cache,
            page_size: None,
        }
    }

    /// Ask the backend for at most `page_size` keys per page
    pub fn with_page_size(mut self, page_size: Option<i32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    /// Children of `prefix` in `bucket`, grouped by `delimiter`
    ///
    /// Served from the cache when valid; otherwise every page is fetched,
    /// merged and stored, unless the prefix was invalidated mid-fetch.
    pub async fn list(&self, bucket: &str, prefix: &str, delimiter: &str) -> Result<Arc<Listing>> {
        if delimiter.is_empty() {
            return Err(Error::InvalidPath("Listing delimiter cannot be empty".into()));
        }
        let key = ListingKey::new(bucket, prefix, delimiter);
        if let Some(listing) = self.cache.get(&key) {
            return Ok(listing);
        }

        let fetch = self.cache.begin_fetch();
        let request = ListRequest::new(bucket, prefix)
            .delimiter(delimiter)
            .max_keys(self.page_size);

        let mut synth = Synthesizer::new(prefix, delimiter);
        let mut pages = 0usize;
        let mut stream = std::pin::pin!(self.pages(request));
        while let Some(page) = stream.try_next().await? {
            pages += 1;
            synth.push_page(page);
        }

        let listing = Arc::new(Listing::new(
            Location::new(bucket, prefix),
            delimiter,
            synth.finish(),
            pages,
        ));
        debug!(bucket, prefix, pages, nodes = listing.len(), "Fetched listing");
        self.cache.insert_if_current(key, Arc::clone(&listing), &fetch);
        Ok(listing)
    }

    /// Bucket list view, cached like any other listing
    pub async fn list_buckets(&self) -> Result<Arc<Listing>> {
        let key = ListingKey::buckets();
        if let Some(listing) = self.cache.get(&key) {
            return Ok(listing);
        }

        let fetch = self.cache.begin_fetch();
        let buckets = self.store.list_buckets().await?;
        let nodes = buckets.into_iter().map(Node::Bucket).collect();
        let listing = Arc::new(Listing::new(Location::buckets(), "", nodes, 1));
        self.cache.insert_if_current(key, Arc::clone(&listing), &fetch);
        Ok(listing)
    }

    /// Listing of a pane location: the bucket list or a prefix
    pub async fn list_location(&self, location: &Location, delimiter: &str) -> Result<Arc<Listing>> {
        match &location.bucket {
            None => self.list_buckets().await,
            Some(bucket) => self.list(bucket, &location.prefix, delimiter).await,
        }
    }

    /// Drop the cached listing of `location`, then list it again
    pub async fn refresh(&self, location: &Location, delimiter: &str) -> Result<Arc<Listing>> {
        match &location.bucket {
            None => self.cache.invalidate_buckets(),
            Some(bucket) => self.cache.invalidate(bucket, &location.prefix),
        }
        self.list_location(location, delimiter).await
    }

    /// Every object under `prefix`, fetched fresh without a delimiter
    ///
    /// Never consults or fills the cache, so destructive operations act on
    /// the current key set.
    pub async fn list_recursive(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let request = ListRequest::new(bucket, prefix).max_keys(self.page_size);
        let mut objects = Vec::new();
        let mut stream = std::pin::pin!(self.pages(request));
        while let Some(page) = stream.try_next().await? {
            objects.extend(page.nodes.into_iter().filter_map(|n| match n {
                Node::Object { meta, .. } => Some(meta),
                _ => None,
            }));
        }
        debug!(bucket, prefix, objects = objects.len(), "Expanded prefix");
        Ok(objects)
    }

    /// Raw backend pages for `request`, following continuation tokens
    pub fn pages(&self, request: ListRequest) -> impl Stream<Item = Result<ListingPage>> + Send + '_ {
        stream::try_unfold(Some(request), move |next| async move {
            let Some(request) = next else {
                return Ok(None);
            };
            let page = self.store.list_objects(&request).await?;
            let following = match &page.continuation_token {
                None => None,
                Some(token) if request.continuation_token.as_ref() == Some(token) => {
                    return Err(Error::General(format!(
                        "Backend repeated continuation token for {}/{}",
                        request.bucket, request.prefix
                    )));
                }
                Some(token) => Some(request.clone().continuation_token(Some(token.clone()))),
            };
            Ok(Some((page, following)))
        })
    }

    /// Drop the cached listing of one prefix
    pub fn invalidate(&self, bucket: &str, prefix: &str) {
        self.cache.invalidate(bucket, prefix);
    }

    pub fn invalidate_buckets(&self) {
        self.cache.invalidate_buckets();
    }

    /// Content of an object, refusing objects larger than `limit` bytes
    pub async fn read_object(&self, bucket: &str, key: &str, limit: u64) -> Result<Vec<u8>> {
        let meta = self.store.head_object(bucket, key).await?;
        if meta.size > limit {
            return Err(Error::TooLarge {
                size: meta.size,
                limit,
            });
        }
        self.store.get_object(bucket, key).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{MemoryStore, StoreOp};
    use crate::traits::{BucketInfo, MockObjectStore};

    fn demo_store(page_size: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::new().with_page_size(page_size);
        for key in ["logs/2024/a.txt", "logs/2024/b.txt", "logs/2024/sub/c.txt"] {
            store.insert("demo", key, key.as_bytes());
        }
        Arc::new(store)
    }

    fn names(listing: &Listing) -> Vec<&str> {
        listing.iter().map(Node::name).collect()
    }

    #[tokio::test]
    async fn test_list_synthesizes_directories() {
        let store = demo_store(1000);
        let ns = Namespace::new(store, ListingCache::default());

        let listing = ns.list("demo", "logs/2024/", "/").await.unwrap();
        assert_eq!(names(&listing), vec!["sub/", "a.txt", "b.txt"]);
        assert_eq!(listing.objects().count(), 2);
        assert_eq!(listing.location, Location::new("demo", "logs/2024/"));
    }

    #[tokio::test]
    async fn test_page_size_does_not_change_result() {
        let reference = Namespace::new(demo_store(1000), ListingCache::default())
            .list("demo", "logs/2024/", "/")
            .await
            .unwrap();

        for page_size in 1..=4 {
            let ns = Namespace::new(demo_store(page_size), ListingCache::default());
            let listing = ns.list("demo", "logs/2024/", "/").await.unwrap();
            assert_eq!(names(&listing), names(&reference), "page size {page_size}");
        }

        let paged = Namespace::new(demo_store(1), ListingCache::default())
            .list("demo", "logs/2024/", "/")
            .await
            .unwrap();
        assert_eq!(paged.pages, 3);
    }

    #[tokio::test]
    async fn test_second_list_is_served_from_cache() {
        let mut mock = MockObjectStore::new();
        mock.expect_list_objects().times(1).returning(|req| {
            Ok(ListingPage {
                prefix: req.prefix.clone(),
                nodes: vec![Node::object("", ObjectMeta::new("a.txt", 1))],
                continuation_token: None,
            })
        });
        let ns = Namespace::new(Arc::new(mock), ListingCache::default());

        let first = ns.list("demo", "", "/").await.unwrap();
        let second = ns.list("demo", "", "/").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_expired_listing_is_fetched_again() {
        let mut mock = MockObjectStore::new();
        mock.expect_list_objects().times(2).returning(|req| {
            Ok(ListingPage {
                prefix: req.prefix.clone(),
                nodes: vec![Node::object("", ObjectMeta::new("a.txt", 1))],
                continuation_token: None,
            })
        });
        let ttl = Duration::from_millis(30);
        let ns = Namespace::new(Arc::new(mock), ListingCache::new(Some(ttl)));

        let first = ns.list("demo", "", "/").await.unwrap();
        let cached = ns.list("demo", "", "/").await.unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        tokio::time::sleep(ttl * 2).await;
        let refetched = ns.list("demo", "", "/").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refetched));
        assert_eq!(names(&refetched), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let store = demo_store(1000);
        let ns = Namespace::new(store.clone(), ListingCache::default());

        ns.list("demo", "logs/2024/", "/").await.unwrap();
        store.insert("demo", "logs/2024/new.txt", "n");
        let stale = ns.list("demo", "logs/2024/", "/").await.unwrap();
        assert!(stale.find("logs/2024/new.txt").is_none());

        ns.invalidate("demo", "logs/2024/");
        let fresh = ns.list("demo", "logs/2024/", "/").await.unwrap();
        assert!(fresh.find("logs/2024/new.txt").is_some());
        assert_eq!(store.calls(StoreOp::List), 2);
    }

    #[tokio::test]
    async fn test_errors_propagate_without_retry() {
        let store = demo_store(1000);
        store.inject_fault(StoreOp::List, "logs/", ErrorKind::Transient, None);
        let ns = Namespace::new(store.clone(), ListingCache::default());

        let err = ns.list("demo", "logs/", "/").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.calls(StoreOp::List), 1);

        let err = ns.list("missing", "", "/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_access_denied_is_distinct() {
        let mut mock = MockObjectStore::new();
        mock.expect_list_objects()
            .returning(|_| Err(Error::AccessDenied("demo".into())));
        let ns = Namespace::new(Arc::new(mock), ListingCache::default());

        let err = ns.list("demo", "", "/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_repeated_token_is_an_error() {
        let mut mock = MockObjectStore::new();
        mock.expect_list_objects().returning(|_| {
            Ok(ListingPage {
                prefix: String::new(),
                nodes: Vec::new(),
                continuation_token: Some("same".into()),
            })
        });
        let ns = Namespace::new(Arc::new(mock), ListingCache::default());
        assert!(ns.list("demo", "", "/").await.is_err());
    }

    #[tokio::test]
    async fn test_list_recursive_bypasses_cache() {
        let store = demo_store(2);
        let ns = Namespace::new(store.clone(), ListingCache::default());

        let keys: Vec<String> = ns
            .list_recursive("demo", "logs/")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["logs/2024/a.txt", "logs/2024/b.txt", "logs/2024/sub/c.txt"]);

        ns.list_recursive("demo", "logs/").await.unwrap();
        assert_eq!(ns.cache().stats().entries, 0);
        assert_eq!(store.calls(StoreOp::List), 4);
    }

    #[tokio::test]
    async fn test_bucket_list_view() {
        let mut mock = MockObjectStore::new();
        mock.expect_list_buckets()
            .times(2)
            .returning(|| Ok(vec![BucketInfo::new("archive"), BucketInfo::new("demo")]));
        let ns = Namespace::new(Arc::new(mock), ListingCache::default());

        let listing = ns.list_location(&Location::buckets(), "/").await.unwrap();
        assert_eq!(names(&listing), vec!["archive", "demo"]);
        assert!(listing.iter().all(Node::is_container));

        ns.list_buckets().await.unwrap();
        ns.refresh(&Location::buckets(), "/").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_object_limit() {
        let store = demo_store(1000);
        store.insert("demo", "big.bin", vec![0u8; 64]);
        let ns = Namespace::new(store, ListingCache::default());

        assert_eq!(ns.read_object("demo", "logs/2024/a.txt", 1024).await.unwrap(), b"logs/2024/a.txt");
        let err = ns.read_object("demo", "big.bin", 16).await.unwrap_err();
        assert!(matches!(err, Error::TooLarge { size: 64, limit: 16 }));
    }
}
