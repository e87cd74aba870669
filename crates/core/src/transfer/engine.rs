//! Transfer engine
//!
//! Requests are expanded into independent work items (directories become
//! every object under them, listed fresh) and run on a bounded pool of tokio
//! tasks. Each item applies the overwrite policy, retries transient failures
//! with exponential backoff and reports its own terminal outcome, so one
//! failing item never aborts the rest of the batch.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::local::{self, Existing};
use super::{
    Destination, ItemResult, Outcome, OverwritePolicy, SkipReason, SourceRef, TransferKind,
    TransferRequest, TransferResult,
};
use crate::config::{RetryConfig, TransferConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::namespace::Namespace;
use crate::path::{ancestor_prefixes, as_prefix, base_name, parent_prefix, DEFAULT_DELIMITER};
use crate::traits::ObjectMeta;

/// One side of a work item
#[derive(Debug, Clone)]
enum Endpoint {
    Remote {
        bucket: String,
        key: String,
        /// Metadata from the expansion listing, when known
        meta: Option<ObjectMeta>,
    },
    Local(PathBuf),
    None,
}

impl Endpoint {
    fn remote(bucket: &str, key: impl Into<String>) -> Self {
        Endpoint::Remote {
            bucket: bucket.to_string(),
            key: key.into(),
            meta: None,
        }
    }

    fn label(&self) -> Option<String> {
        match self {
            Endpoint::Remote { bucket, key, .. } => Some(format!("{bucket}/{key}")),
            Endpoint::Local(path) => Some(path.display().to_string()),
            Endpoint::None => None,
        }
    }
}

#[derive(Debug, Clone)]
struct WorkItem {
    source: Endpoint,
    target: Endpoint,
}

impl WorkItem {
    fn result(&self, outcome: Outcome) -> ItemResult {
        ItemResult::new(
            self.source.label().unwrap_or_default(),
            self.target.label(),
            outcome,
        )
    }
}

/// What a single item did
enum Step {
    Done(u64),
    Skip(SkipReason),
}

/// Released when the running transfer finishes
struct ActiveGuard(Arc<AtomicBool>);

impl ActiveGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy("A transfer is already running".into()))?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Executes transfer requests against one namespace, one request at a time
#[derive(Clone)]
pub struct TransferEngine {
    namespace: Namespace,
    config: TransferConfig,
    delimiter: String,
    active: Arc<AtomicBool>,
}

impl TransferEngine {
    pub fn new(namespace: Namespace, config: TransferConfig) -> Self {
        Self {
            namespace,
            config,
            delimiter: DEFAULT_DELIMITER.to_string(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Whether a request is currently running
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Run a request to completion on the current task
    ///
    /// Fails with `Busy` while another request runs and with `InvalidCommand`
    /// for malformed requests; item failures are reported in the result.
    pub async fn execute(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: Option<mpsc::UnboundedSender<ItemResult>>,
    ) -> Result<TransferResult> {
        request.validate()?;
        let _guard = ActiveGuard::acquire(&self.active)?;
        Ok(self.run(request, cancel, progress).await)
    }

    /// Spawn a request in the background
    pub fn start(&self, request: TransferRequest) -> Result<TransferHandle> {
        request.validate()?;
        let guard = ActiveGuard::acquire(&self.active)?;

        let kind = request.kind;
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            engine.run(request, token, Some(tx)).await
        });

        Ok(TransferHandle {
            kind,
            cancel,
            progress: rx,
            task,
        })
    }

    async fn run(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: Option<mpsc::UnboundedSender<ItemResult>>,
    ) -> TransferResult {
        let mut result = TransferResult::new(request.kind);
        let worker = Arc::new(Worker {
            namespace: self.namespace.clone(),
            retry: self.config.retry.clone(),
            kind: request.kind,
            policy: request.policy,
            delimiter: self.delimiter.clone(),
            progress,
        });

        let (items, rejected) = self.expand(&request, &cancel).await;
        for item in rejected {
            worker.emit(&item);
            result.record(item);
        }
        debug!(kind = %request.kind, items = items.len(), "Expanded transfer request");

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        let mut finished: Vec<(usize, ItemResult)> = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let skipped = item.result(Outcome::skipped(SkipReason::Cancelled));
                worker.emit(&skipped);
                finished.push((index, skipped));
                continue;
            };

            let placeholder = item.result(Outcome::Succeeded);
            let worker = Arc::clone(&worker);
            let handle = tasks.spawn(async move {
                let outcome = worker.run_item(item).await;
                drop(permit);
                worker.emit(&outcome);
                (index, outcome)
            });
            pending.insert(handle.id(), (index, placeholder));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, done)) => {
                    pending.remove(&id);
                    finished.push(done);
                }
                Err(e) => {
                    if let Some((index, mut item)) = pending.remove(&e.id()) {
                        item.outcome = Outcome::Failed {
                            kind: ErrorKind::Other,
                            message: format!("Transfer task failed: {e}"),
                        };
                        worker.emit(&item);
                        finished.push((index, item));
                    }
                }
            }
        }

        finished.sort_by_key(|(index, _)| *index);
        for (_, item) in finished {
            result.record(item);
        }
        result.cancelled = cancel.is_cancelled();

        info!(
            kind = %result.kind,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            cancelled = result.cancelled,
            "Transfer finished"
        );
        result
    }

    /// Expand sources into work items; sources that cannot be expanded
    /// become terminal results
    async fn expand(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
    ) -> (Vec<WorkItem>, Vec<ItemResult>) {
        let mut items = Vec::new();
        let mut rejected = Vec::new();

        for source in &request.sources {
            let label = source.to_string();
            if cancel.is_cancelled() {
                rejected.push(ItemResult::new(label, None, Outcome::skipped(SkipReason::Cancelled)));
                continue;
            }
            match self.expand_source(request, source).await {
                Ok(mut expanded) => items.append(&mut expanded),
                Err(e) if request.kind == TransferKind::Delete && e.kind() == ErrorKind::NotFound => {
                    rejected.push(ItemResult::new(label, None, Outcome::skipped(SkipReason::AlreadyAbsent)));
                }
                Err(e) => {
                    warn!(source = %label, error = %e, "Could not expand transfer source");
                    rejected.push(ItemResult::new(label, None, Outcome::failed(&e)));
                }
            }
        }
        (items, rejected)
    }

    async fn expand_source(&self, request: &TransferRequest, source: &SourceRef) -> Result<Vec<WorkItem>> {
        let delim = self.delimiter.as_str();
        let rename = request.rename_to.as_deref();

        match source {
            SourceRef::Object { bucket, key } => {
                let relative = rename.unwrap_or_else(|| base_name(key, delim)).to_string();
                Ok(vec![WorkItem {
                    source: Endpoint::remote(bucket, key.as_str()),
                    target: self.target(&request.destination, &relative)?,
                }])
            }
            SourceRef::Directory { bucket, prefix } => {
                let prefix = as_prefix(prefix, delim);
                let mut attempts = 0;
                let objects = with_retry(&self.config.retry, "list", &prefix, &mut attempts, || {
                    self.namespace.list_recursive(bucket, &prefix)
                })
                .await?;
                if objects.is_empty() {
                    return Err(Error::NotFound(format!("{bucket}/{prefix}")));
                }

                let root = match rename {
                    Some(name) => as_prefix(name, delim),
                    None => base_name(&prefix, delim).to_string(),
                };
                objects
                    .into_iter()
                    .map(|meta| {
                        let relative = format!("{root}{}", &meta.key[prefix.len()..]);
                        Ok(WorkItem {
                            target: self.target(&request.destination, &relative)?,
                            source: Endpoint::Remote {
                                bucket: bucket.clone(),
                                key: meta.key.clone(),
                                meta: Some(meta),
                            },
                        })
                    })
                    .collect()
            }
            SourceRef::Local { path } => {
                let name = rename
                    .map(str::to_string)
                    .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .ok_or_else(|| Error::InvalidPath(format!("No file name in {}", path.display())))?;
                let metadata = tokio::fs::metadata(path).await?;
                if !metadata.is_dir() {
                    return Ok(vec![WorkItem {
                        source: Endpoint::Local(path.clone()),
                        target: self.target(&request.destination, &name)?,
                    }]);
                }

                let root = path.clone();
                let delimiter = self.delimiter.clone();
                let files = tokio::task::spawn_blocking(move || local::walk_files(&root, &delimiter))
                    .await
                    .map_err(|e| Error::General(format!("Directory walk failed: {e}")))??;
                files
                    .into_iter()
                    .map(|(file, relative)| {
                        Ok(WorkItem {
                            source: Endpoint::Local(file),
                            target: self.target(&request.destination, &format!("{name}{delim}{relative}"))?,
                        })
                    })
                    .collect()
            }
        }
    }

    fn target(&self, destination: &Destination, relative: &str) -> Result<Endpoint> {
        match destination {
            Destination::None => Ok(Endpoint::None),
            Destination::Remote { bucket, prefix } => Ok(Endpoint::remote(
                bucket,
                format!("{}{relative}", as_prefix(prefix, &self.delimiter)),
            )),
            Destination::Local { path } => Ok(Endpoint::Local(local::local_target(
                path,
                relative,
                &self.delimiter,
            )?)),
        }
    }
}

/// Shared state of the tasks running one request
struct Worker {
    namespace: Namespace,
    retry: RetryConfig,
    kind: TransferKind,
    policy: OverwritePolicy,
    delimiter: String,
    progress: Option<mpsc::UnboundedSender<ItemResult>>,
}

impl Worker {
    fn emit(&self, item: &ItemResult) {
        if let Some(tx) = &self.progress {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(item.clone());
        }
    }

    async fn run_item(&self, item: WorkItem) -> ItemResult {
        let mut attempts = 0;
        let step = match (&item.source, &item.target) {
            (Endpoint::Remote { bucket, key, meta }, Endpoint::Remote { bucket: dst_bucket, key: dst_key, .. }) => {
                match self.kind {
                    TransferKind::Move => {
                        self.move_object(bucket, key, meta.as_ref(), dst_bucket, dst_key, &mut attempts)
                            .await
                    }
                    _ => {
                        self.copy_object(bucket, key, meta.as_ref(), dst_bucket, dst_key, &mut attempts)
                            .await
                    }
                }
            }
            (Endpoint::Remote { bucket, key, .. }, Endpoint::None) => {
                self.delete_object(bucket, key, &mut attempts).await
            }
            (Endpoint::Remote { bucket, key, .. }, Endpoint::Local(path)) => {
                self.download(bucket, key, path, &mut attempts).await
            }
            (Endpoint::Local(path), Endpoint::Remote { bucket, key, .. }) => {
                self.upload(path, bucket, key, &mut attempts).await
            }
            _ => Err(Error::InvalidCommand(format!("Unsupported {} item", self.kind))),
        };

        let mut result = item.result(Outcome::Succeeded);
        result.attempts = attempts;
        match step {
            Ok(Step::Done(bytes)) => {
                result.bytes = bytes;
                debug!(source = %result.source, target = ?result.target, "Item succeeded");
            }
            Ok(Step::Skip(reason)) => {
                debug!(source = %result.source, reason = reason.label(), "Item skipped");
                result.outcome = Outcome::skipped(reason);
            }
            Err(e) => {
                warn!(source = %result.source, error = %e, "Item failed");
                result.outcome = Outcome::failed(&e);
            }
        }
        result
    }

    async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        meta: Option<&ObjectMeta>,
        dst_bucket: &str,
        dst_key: &str,
        attempts: &mut u32,
    ) -> Result<Step> {
        if bucket == dst_bucket && key == dst_key {
            return Err(Error::InvalidCommand(format!(
                "Source and destination are the same object: {bucket}/{key}"
            )));
        }

        let store = self.namespace.store();
        let existing = self.remote_existing(dst_bucket, dst_key, attempts).await?;
        let skip = self
            .overwrite_check(existing, move || async move {
                match meta {
                    Some(meta) => Ok(meta.last_modified),
                    None => {
                        let mut lookups = 0;
                        let meta = with_retry(&self.retry, "head", key, &mut lookups, || {
                            store.head_object(bucket, key)
                        })
                        .await?;
                        Ok(meta.last_modified)
                    }
                }
            })
            .await?;
        if let Some(reason) = skip {
            return Ok(Step::Skip(reason));
        }

        let copied = with_retry(&self.retry, "copy", key, attempts, || {
            store.copy_object(bucket, key, dst_bucket, dst_key)
        })
        .await?;
        self.invalidate_around(dst_bucket, dst_key);
        Ok(Step::Done(copied.size))
    }

    async fn move_object(
        &self,
        bucket: &str,
        key: &str,
        meta: Option<&ObjectMeta>,
        dst_bucket: &str,
        dst_key: &str,
        attempts: &mut u32,
    ) -> Result<Step> {
        let copied = self
            .copy_object(bucket, key, meta, dst_bucket, dst_key, attempts)
            .await?;
        let Step::Done(bytes) = copied else {
            return Ok(copied);
        };

        let store = self.namespace.store();
        with_retry(&self.retry, "delete", key, attempts, || store.delete_object(bucket, key))
            .await
            .map_err(|e| {
                Error::PartialFailure(format!(
                    "copied to {dst_bucket}/{dst_key} but source {bucket}/{key} was not deleted: {e}"
                ))
            })?;
        self.invalidate_around(bucket, key);
        Ok(Step::Done(bytes))
    }

    /// Delete one key; a key that is already gone is skipped
    ///
    /// Object stores acknowledge deletes of missing keys, so absence is
    /// decided by a HEAD before the delete is sent.
    async fn delete_object(&self, bucket: &str, key: &str, attempts: &mut u32) -> Result<Step> {
        if self.remote_existing(bucket, key, attempts).await? == Existing::Absent {
            return Ok(Step::Skip(SkipReason::AlreadyAbsent));
        }
        let store = self.namespace.store();
        match with_retry(&self.retry, "delete", key, attempts, || store.delete_object(bucket, key)).await {
            Ok(()) => {
                self.invalidate_around(bucket, key);
                Ok(Step::Done(0))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Step::Skip(SkipReason::AlreadyAbsent)),
            Err(e) => Err(e),
        }
    }

    async fn upload(&self, path: &Path, bucket: &str, key: &str, attempts: &mut u32) -> Result<Step> {
        let existing = self.remote_existing(bucket, key, attempts).await?;
        let skip = self
            .overwrite_check(existing, move || async move {
                Ok(match local::existing(path).await? {
                    Existing::Present(modified) => modified,
                    Existing::Absent => None,
                })
            })
            .await?;
        if let Some(reason) = skip {
            return Ok(Step::Skip(reason));
        }

        let data = tokio::fs::read(path).await?;
        let content_type = local::content_type(path);
        let store = self.namespace.store();
        let stored = with_retry(&self.retry, "put", key, attempts, || {
            store.put_object(bucket, key, data.clone(), content_type.clone())
        })
        .await?;
        self.invalidate_around(bucket, key);
        Ok(Step::Done(stored.size))
    }

    async fn download(&self, bucket: &str, key: &str, path: &Path, attempts: &mut u32) -> Result<Step> {
        // Folder marker: materialize the directory only
        if key.ends_with(self.delimiter.as_str()) {
            tokio::fs::create_dir_all(path).await?;
            return Ok(Step::Done(0));
        }

        let store = self.namespace.store();
        let existing = local::existing(path).await?;
        let skip = self
            .overwrite_check(existing, move || async move {
                let mut lookups = 0;
                let meta = with_retry(&self.retry, "head", key, &mut lookups, || store.head_object(bucket, key))
                    .await?;
                Ok(meta.last_modified)
            })
            .await?;
        if let Some(reason) = skip {
            return Ok(Step::Skip(reason));
        }

        let data = with_retry(&self.retry, "get", key, attempts, || store.get_object(bucket, key)).await?;
        local::write_atomic(path, &data).await?;
        Ok(Step::Done(data.len() as u64))
    }

    async fn remote_existing(&self, bucket: &str, key: &str, attempts: &mut u32) -> Result<Existing> {
        let store = self.namespace.store();
        match with_retry(&self.retry, "head", key, attempts, || store.head_object(bucket, key)).await {
            Ok(meta) => Ok(Existing::Present(meta.last_modified)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Existing::Absent),
            Err(e) => Err(e),
        }
    }

    /// Apply the overwrite policy to a present destination
    async fn overwrite_check<F, Fut>(&self, existing: Existing, source_modified: F) -> Result<Option<SkipReason>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Timestamp>>>,
    {
        let Existing::Present(target_modified) = existing else {
            return Ok(None);
        };
        match self.policy {
            OverwritePolicy::Fail => Ok(Some(SkipReason::Exists)),
            OverwritePolicy::Overwrite => Ok(None),
            OverwritePolicy::OverwriteIfNewer => match (source_modified().await?, target_modified) {
                (Some(source), Some(target)) if source > target => Ok(None),
                _ => Ok(Some(SkipReason::NotNewer)),
            },
        }
    }

    /// Drop every cached listing that can show `key`
    fn invalidate_around(&self, bucket: &str, key: &str) {
        for prefix in ancestor_prefixes(key, &self.delimiter) {
            self.namespace.invalidate(bucket, &prefix);
        }
        // Folder marker keys are also listed as their own prefix
        if key.ends_with(self.delimiter.as_str()) {
            self.namespace.invalidate(bucket, key);
        }
        debug!(bucket, parent = %parent_prefix(key, &self.delimiter), "Invalidated listings");
    }
}

/// Run `op`, retrying transient failures with exponential backoff
async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    call: &str,
    target: &str,
    attempts: &mut u32,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        *attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff(attempt - 1);
                warn!(
                    call,
                    target,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A transfer running in the background
pub struct TransferHandle {
    kind: TransferKind,
    cancel: CancellationToken,
    progress: mpsc::UnboundedReceiver<ItemResult>,
    task: JoinHandle<TransferResult>,
}

impl TransferHandle {
    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// Stop starting new items; in-flight items run to completion
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Item results reported since the last call
    pub fn drain_progress(&mut self) -> Vec<ItemResult> {
        let mut items = Vec::new();
        while let Ok(item) = self.progress.try_recv() {
            items.push(item);
        }
        items
    }

    /// Wait for the aggregate result
    pub async fn wait(self) -> Result<TransferResult> {
        self.task
            .await
            .map_err(|e| Error::General(format!("Transfer task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::{MemoryStore, StoreOp};
    use crate::namespace::ListingCache;
    use crate::traits::{MockObjectStore, ObjectStore};
    use tempfile::TempDir;

    fn fast_config() -> TransferConfig {
        TransferConfig {
            max_in_flight: 4,
            call_timeout_ms: 1000,
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
        }
    }

    fn engine_over(store: &Arc<MemoryStore>) -> TransferEngine {
        let backend: Arc<dyn ObjectStore> = store.clone();
        TransferEngine::new(Namespace::new(backend, ListingCache::default()), fast_config())
    }

    fn objects(bucket: &str, keys: &[&str]) -> Vec<SourceRef> {
        keys.iter().map(|k| SourceRef::object(bucket, *k)).collect()
    }

    fn copy_to(sources: Vec<SourceRef>, bucket: &str, prefix: &str) -> TransferRequest {
        TransferRequest::new(TransferKind::Copy, sources, Destination::remote(bucket, prefix))
    }

    async fn run(engine: &TransferEngine, request: TransferRequest) -> TransferResult {
        engine
            .execute(request, CancellationToken::new(), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        let keys: Vec<String> = (0..6).map(|i| format!("data/{i}.bin")).collect();
        for key in &keys {
            store.insert("demo", key, key.as_bytes());
        }
        store.inject_fault(StoreOp::Copy, "data/3.bin", ErrorKind::AccessDenied, None);

        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let result = run(&engine_over(&store), copy_to(objects("demo", &refs), "archive", "")).await;

        assert_eq!((result.succeeded, result.failed, result.skipped), (5, 1, 0));
        let failed = result.items.iter().find(|i| i.outcome.is_failed()).unwrap();
        assert_eq!(failed.source, "demo/data/3.bin");
        assert!(matches!(failed.outcome, Outcome::Failed { kind: ErrorKind::AccessDenied, .. }));
        assert_eq!(failed.attempts, 2, "one head lookup and one copy, no retry");
    }

    #[tokio::test]
    async fn test_move_delete_failure_is_partial() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "a.txt", "alpha");
        store.inject_fault(StoreOp::Delete, "a.txt", ErrorKind::AccessDenied, None);

        let request = TransferRequest::new(
            TransferKind::Move,
            objects("demo", &["a.txt"]),
            Destination::remote("archive", ""),
        );
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.failed, 1);
        assert_eq!(result.partial_failures().count(), 1);
        assert_eq!(store.object_data("demo", "a.txt").unwrap(), b"alpha");
        assert_eq!(store.object_data("archive", "a.txt").unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_move_removes_source() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "logs/a.txt", "alpha");

        let request = TransferRequest::new(
            TransferKind::Move,
            objects("demo", &["logs/a.txt"]),
            Destination::remote("archive", "old"),
        );
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.succeeded, 1);
        assert!(!store.contains("demo", "logs/a.txt"));
        assert!(store.contains("archive", "old/a.txt"));
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped_and_untouched() {
        let store = Arc::new(MemoryStore::new());
        store.insert("demo", "a.txt", "new content");
        store.insert("archive", "a.txt", "original");

        let result = run(&engine_over(&store), copy_to(objects("demo", &["a.txt"]), "archive", "")).await;

        assert_eq!(result.skipped, 1);
        assert_eq!(result.items[0].outcome, Outcome::skipped(SkipReason::Exists));
        assert_eq!(store.object_data("archive", "a.txt").unwrap(), b"original");
        assert_eq!(store.calls(StoreOp::Copy), 0);
    }

    #[tokio::test]
    async fn test_overwrite_if_newer() {
        let store = Arc::new(MemoryStore::new());
        let old = Timestamp::from_second(1_700_000_000).unwrap();
        let new = Timestamp::from_second(1_700_100_000).unwrap();
        store.insert_at("demo", "fresh.txt", "fresh", new);
        store.insert_at("archive", "fresh.txt", "stale", old);
        store.insert_at("demo", "stale.txt", "stale", old);
        store.insert_at("archive", "stale.txt", "fresh", new);

        let request = copy_to(objects("demo", &["fresh.txt", "stale.txt"]), "archive", "")
            .with_policy(OverwritePolicy::OverwriteIfNewer);
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.items[1].outcome, Outcome::skipped(SkipReason::NotNewer));
        assert_eq!(store.object_data("archive", "fresh.txt").unwrap(), b"fresh");
        assert_eq!(store.object_data("archive", "stale.txt").unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let store = Arc::new(MemoryStore::new());
        store.insert("demo", "a.txt", "new");
        store.insert("archive", "a.txt", "old");

        let request = copy_to(objects("demo", &["a.txt"]), "archive", "").with_policy(OverwritePolicy::Overwrite);
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(store.object_data("archive", "a.txt").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        for key in ["tmp/a", "tmp/b", "keep"] {
            store.insert("demo", key, "x");
        }
        let engine = engine_over(&store);
        let request = TransferRequest::delete(vec![
            SourceRef::directory("demo", "tmp/"),
            SourceRef::object("demo", "keep"),
        ]);

        let first = run(&engine, request.clone()).await;
        assert_eq!((first.succeeded, first.failed, first.skipped), (3, 0, 0));
        assert!(store.keys("demo").is_empty());

        let second = run(&engine, request).await;
        assert_eq!((second.succeeded, second.failed, second.skipped), (0, 0, 2));
        assert!(second
            .items
            .iter()
            .all(|i| i.outcome == Outcome::skipped(SkipReason::AlreadyAbsent)));
    }

    /// Store double with S3 semantics: deleting a missing key succeeds and
    /// only HEAD tells whether a key exists
    fn s3_like(present: &'static [&'static str]) -> MockObjectStore {
        let mut mock = MockObjectStore::new();
        mock.expect_head_object().returning(move |bucket, key| {
            if bucket == "demo" && present.iter().any(|p| *p == key) {
                Ok(ObjectMeta::new(key, 3))
            } else {
                Err(Error::NotFound(format!("{bucket}/{key}")))
            }
        });
        mock
    }

    fn engine_over_mock(mock: MockObjectStore) -> TransferEngine {
        TransferEngine::new(Namespace::new(Arc::new(mock), ListingCache::default()), fast_config())
    }

    #[tokio::test]
    async fn test_delete_skips_missing_key_when_backend_acknowledges_it() {
        let mut mock = s3_like(&["here"]);
        mock.expect_delete_object().times(1).returning(|bucket, key| {
            assert_eq!((bucket, key), ("demo", "here"));
            Ok(())
        });
        let engine = engine_over_mock(mock);

        let result = run(&engine, TransferRequest::delete(objects("demo", &["here", "gone"]))).await;

        assert_eq!((result.succeeded, result.failed, result.skipped), (1, 0, 1));
        assert_eq!(result.items[1].source, "demo/gone");
        assert_eq!(result.items[1].outcome, Outcome::skipped(SkipReason::AlreadyAbsent));
    }

    #[tokio::test]
    async fn test_move_deletes_source_after_copy_with_s3_semantics() {
        let mut mock = s3_like(&["a.txt"]);
        mock.expect_copy_object()
            .times(1)
            .returning(|_, _, _, dst_key| Ok(ObjectMeta::new(dst_key, 3)));
        mock.expect_delete_object().times(1).returning(|bucket, key| {
            assert_eq!((bucket, key), ("demo", "a.txt"));
            Ok(())
        });
        let engine = engine_over_mock(mock);
        let request = TransferRequest::new(
            TransferKind::Move,
            objects("demo", &["a.txt"]),
            Destination::remote("archive", ""),
        );

        let result = run(&engine, request).await;

        assert_eq!((result.succeeded, result.failed, result.skipped), (1, 0, 0));
        assert_eq!(result.items[0].bytes, 3);
    }

    #[tokio::test]
    async fn test_move_of_missing_source_fails_without_delete() {
        let mut mock = s3_like(&[]);
        mock.expect_copy_object()
            .returning(|bucket, key, _, _| Err(Error::NotFound(format!("{bucket}/{key}"))));
        mock.expect_delete_object().times(0);
        let engine = engine_over_mock(mock);
        let request = TransferRequest::new(
            TransferKind::Move,
            objects("demo", &["gone"]),
            Destination::remote("archive", ""),
        );

        let result = run(&engine, request).await;

        assert_eq!(result.failed, 1);
        assert!(matches!(
            result.items[0].outcome,
            Outcome::Failed { kind: ErrorKind::NotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "a.txt", "alpha");
        store.inject_fault(StoreOp::Copy, "a.txt", ErrorKind::Transient, Some(2));

        let result = run(&engine_over(&store), copy_to(objects("demo", &["a.txt"]), "archive", "")).await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(store.calls(StoreOp::Copy), 3);
        assert_eq!(result.items[0].attempts, 4);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "a.txt", "alpha");
        store.inject_fault(StoreOp::Copy, "a.txt", ErrorKind::Transient, None);

        let result = run(&engine_over(&store), copy_to(objects("demo", &["a.txt"]), "archive", "")).await;

        assert_eq!(result.failed, 1);
        assert!(matches!(result.items[0].outcome, Outcome::Failed { kind: ErrorKind::Transient, .. }));
        assert_eq!(store.calls(StoreOp::Copy), 3);
    }

    #[tokio::test]
    async fn test_directory_copy_keeps_structure() {
        let store = Arc::new(MemoryStore::new().with_page_size(2));
        store.add_bucket("archive");
        for key in ["logs/2024/a.txt", "logs/2024/sub/c.txt", "logs/2024/sub/d/e.txt"] {
            store.insert("demo", key, key.as_bytes());
        }

        let request = copy_to(vec![SourceRef::directory("demo", "logs/2024/")], "archive", "backup/");
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.succeeded, 3);
        assert_eq!(
            store.keys("archive"),
            vec!["backup/2024/a.txt", "backup/2024/sub/c.txt", "backup/2024/sub/d/e.txt"]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_fails_for_copy() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("demo");
        store.add_bucket("archive");

        let request = copy_to(vec![SourceRef::directory("demo", "nope/")], "archive", "");
        let result = run(&engine_over(&store), request).await;
        assert_eq!(result.failed, 1);
        assert!(matches!(result.items[0].outcome, Outcome::Failed { kind: ErrorKind::NotFound, .. }));
    }

    #[tokio::test]
    async fn test_rename_within_prefix() {
        let store = Arc::new(MemoryStore::new());
        store.insert("demo", "docs/draft.md", "text");

        let request = TransferRequest::new(
            TransferKind::Move,
            objects("demo", &["docs/draft.md"]),
            Destination::remote("demo", "docs/"),
        )
        .renamed("final.md");
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(store.keys("demo"), vec!["docs/final.md"]);
    }

    #[tokio::test]
    async fn test_move_onto_itself_is_refused() {
        let store = Arc::new(MemoryStore::new());
        store.insert("demo", "a.txt", "alpha");

        let request = TransferRequest::new(
            TransferKind::Move,
            objects("demo", &["a.txt"]),
            Destination::remote("demo", ""),
        )
        .with_policy(OverwritePolicy::Overwrite);
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.failed, 1);
        assert!(store.contains("demo", "a.txt"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "a", "1");
        store.insert("demo", "b", "2");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine_over(&store)
            .execute(copy_to(objects("demo", &["a", "b"]), "archive", ""), cancel, None)
            .await
            .unwrap();

        assert_eq!(result.skipped, 2);
        assert!(result.cancelled);
        assert_eq!(store.calls(StoreOp::Copy), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_keeps_finished_items() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        store.add_bucket("archive");
        let keys = ["a", "b", "c", "d"];
        for key in keys {
            store.insert("demo", key, key);
        }
        let mut config = fast_config();
        config.max_in_flight = 1;
        let backend: Arc<dyn ObjectStore> = store.clone();
        let engine = TransferEngine::new(Namespace::new(backend, ListingCache::default()), config);

        let mut handle = engine.start(copy_to(objects("demo", &keys), "archive", "")).unwrap();
        let first = loop {
            if let Some(item) = handle.drain_progress().into_iter().next() {
                break item;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert!(first.outcome.is_succeeded());
        handle.cancel();
        let result = handle.wait().await.unwrap();

        assert_eq!(result.total(), 4);
        assert!(result.cancelled);
        assert!(result.succeeded >= 1);
        assert!(result.skipped >= 1);
        assert_eq!(result.failed, 0);
    }

    #[tokio::test]
    async fn test_second_transfer_is_busy() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        store.add_bucket("archive");
        store.insert("demo", "a", "1");
        let engine = engine_over(&store);

        let handle = engine.start(copy_to(objects("demo", &["a"]), "archive", "")).unwrap();
        assert!(engine.is_busy());
        let err = engine
            .start(copy_to(objects("demo", &["a"]), "archive", "other/"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Busy);

        handle.wait().await.unwrap();
        assert!(!engine.is_busy());
        assert!(engine.start(copy_to(objects("demo", &["a"]), "archive", "other/")).is_ok());
    }

    #[tokio::test]
    async fn test_progress_is_streamed_per_item() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "a", "1");
        store.insert("demo", "b", "2");
        let engine = engine_over(&store);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = engine
            .execute(copy_to(objects("demo", &["a", "b"]), "archive", ""), CancellationToken::new(), Some(tx))
            .await
            .unwrap();

        let mut streamed = Vec::new();
        while let Ok(item) = rx.try_recv() {
            streamed.push(item.source);
        }
        streamed.sort();
        assert_eq!(streamed, vec!["demo/a", "demo/b"]);
        assert_eq!(result.succeeded, 2);
    }

    #[tokio::test]
    async fn test_copy_invalidates_destination_listing() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        store.insert("demo", "a.txt", "alpha");
        let engine = engine_over(&store);
        let ns = engine.namespace().clone();

        let before = ns.list("archive", "in/", "/").await.unwrap();
        assert!(before.is_empty());
        let root = ns.list("archive", "", "/").await.unwrap();
        assert!(root.is_empty());

        run(&engine, copy_to(objects("demo", &["a.txt"]), "archive", "in/")).await;

        let after = ns.list("archive", "in/", "/").await.unwrap();
        assert!(after.find("in/a.txt").is_some());
        let root = ns.list("archive", "", "/").await.unwrap();
        assert!(root.find("in/").is_some());
    }

    #[tokio::test]
    async fn test_download_and_upload_round_trip() {
        let store = Arc::new(MemoryStore::new());
        store.insert("demo", "logs/a.txt", "alpha");
        store.insert("demo", "logs/sub/b.txt", "beta");
        store.insert("demo", "logs/empty/", "");
        let engine = engine_over(&store);
        let temp = TempDir::new().unwrap();

        let download = TransferRequest::new(
            TransferKind::Download,
            vec![SourceRef::directory("demo", "logs/")],
            Destination::local(temp.path()),
        );
        let result = run(&engine, download).await;
        assert_eq!(result.succeeded, 3);
        assert_eq!(std::fs::read(temp.path().join("logs/a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(temp.path().join("logs/sub/b.txt")).unwrap(), b"beta");
        assert!(temp.path().join("logs/empty").is_dir());

        store.add_bucket("archive");
        let upload = TransferRequest::new(
            TransferKind::Upload,
            vec![SourceRef::local(temp.path().join("logs"))],
            Destination::remote("archive", "restored/"),
        );
        let result = run(&engine, upload).await;
        assert_eq!(result.succeeded, 2);
        assert_eq!(store.object_data("archive", "restored/logs/sub/b.txt").unwrap(), b"beta");
    }

    #[tokio::test]
    async fn test_download_refuses_existing_file() {
        let store = Arc::new(MemoryStore::new());
        store.insert("demo", "a.txt", "remote");
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "local").unwrap();

        let request = TransferRequest::new(
            TransferKind::Download,
            objects("demo", &["a.txt"]),
            Destination::local(temp.path()),
        );
        let result = run(&engine_over(&store), request).await;

        assert_eq!(result.skipped, 1);
        assert_eq!(std::fs::read(temp.path().join("a.txt")).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_item() {
        let store = Arc::new(MemoryStore::new());
        store.add_bucket("archive");
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("here.txt"), "x").unwrap();

        let request = TransferRequest::new(
            TransferKind::Upload,
            vec![
                SourceRef::local(temp.path().join("gone.txt")),
                SourceRef::local(temp.path().join("here.txt")),
            ],
            Destination::remote("archive", ""),
        );
        let result = run(&engine_over(&store), request).await;

        assert_eq!((result.succeeded, result.failed), (1, 1));
        let meta = store.head_object("archive", "here.txt").await.unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_up_front() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(&store);
        let request = TransferRequest::new(TransferKind::Download, objects("demo", &["a"]), Destination::None);

        let err = engine
            .execute(request, CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!engine.is_busy());
    }
}
