//! Per-call timeout decorator for any ObjectStore
//!
//! Every backend call goes through `TimedStore`, so a hung request surfaces
//! as `Error::Transient` and enters the normal retry path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::{BucketInfo, ListRequest, ListingPage, ObjectMeta, ObjectStore};

/// Wraps a backend and bounds every call by `timeout`
pub struct TimedStore {
    inner: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, call: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(call, timeout_ms = self.timeout.as_millis() as u64, "Backend call timed out");
                Err(Error::Transient(format!(
                    "{call} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for TimedStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.bounded("list_buckets", self.inner.list_buckets()).await
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<ListingPage> {
        self.bounded("list_objects", self.inner.list_objects(request))
            .await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.bounded("head_object", self.inner.head_object(bucket, key))
            .await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMeta> {
        self.bounded(
            "copy_object",
            self.inner
                .copy_object(src_bucket, src_key, dst_bucket, dst_key),
        )
        .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.bounded("delete_object", self.inner.delete_object(bucket, key))
            .await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectMeta> {
        self.bounded(
            "put_object",
            self.inner.put_object(bucket, key, data, content_type),
        )
        .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.bounded("get_object", self.inner.get_object(bucket, key))
            .await
    }

    async fn create_bucket(&self, name: &str, region: Option<String>) -> Result<()> {
        self.bounded("create_bucket", self.inner.create_bucket(name, region))
            .await
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.bounded("delete_bucket", self.inner.delete_bucket(name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_becomes_transient() {
        let slow = MemoryStore::new().with_latency(Duration::from_secs(5));
        slow.insert("demo", "k", "v");
        let timed = TimedStore::new(Arc::new(slow), Duration::from_millis(100));

        let err = timed.get_object("demo", "k").await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("get_object timed out"));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let store = MemoryStore::new();
        store.insert("demo", "k", "v");
        let timed = TimedStore::new(Arc::new(store), Duration::from_secs(5));

        assert_eq!(timed.get_object("demo", "k").await.unwrap(), b"v");
        assert_eq!(
            timed.get_object("demo", "missing").await.unwrap_err().kind(),
            crate::error::ErrorKind::NotFound
        );
    }
}
