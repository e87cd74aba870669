//! Behavioural tests for the namespace model, transfer engine and dispatcher,
//! run against the in-memory backend.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sc_core::config::{RetryConfig, TransferConfig};
use sc_core::memory::StoreOp;
use sc_core::transfer::{Destination, Outcome, SkipReason};
use sc_core::{
    Command, DispatchState, Dispatcher, DispatcherOptions, ErrorKind, ListingCache, Location, MemoryStore,
    Namespace, Node, ObjectStore, OverwritePolicy, Response, SourceRef, TimedStore, TransferEngine, TransferKind,
    TransferRequest, TransferResult,
};
use tokio_util::sync::CancellationToken;

fn config() -> TransferConfig {
    TransferConfig {
        max_in_flight: 4,
        call_timeout_ms: 1000,
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        },
    }
}

fn namespace(store: &Arc<MemoryStore>) -> Namespace {
    let backend: Arc<dyn ObjectStore> = store.clone();
    Namespace::new(backend, ListingCache::default())
}

async fn run(ns: &Namespace, request: TransferRequest) -> TransferResult {
    TransferEngine::new(ns.clone(), config())
        .execute(request, CancellationToken::new(), None)
        .await
        .unwrap()
}

/// Keys spread over several levels, including a folder marker
fn tree_keys() -> Vec<String> {
    let mut keys = vec![
        "root.txt".to_string(),
        "logs/".to_string(),
        "logs/2023/old.txt".to_string(),
        "logs/2024/a.txt".to_string(),
        "logs/2024/b.txt".to_string(),
        "logs/2024/sub/c.txt".to_string(),
        "logs/readme.md".to_string(),
    ];
    for i in 0..15 {
        keys.push(format!("logs/bulk/{i:02}.bin"));
        keys.push(format!("logs/f{i:02}.txt"));
    }
    keys
}

fn store_with(keys: &[String], page_size: usize) -> Arc<MemoryStore> {
    let store = MemoryStore::new().with_page_size(page_size);
    for key in keys {
        store.insert("demo", key, key.as_bytes());
    }
    Arc::new(store)
}

/// Distinct next segments under `prefix`, with directories keeping the delimiter
fn expected_segments(keys: &[String], prefix: &str) -> BTreeSet<String> {
    keys.iter()
        .filter_map(|k| k.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .map(|rest| match rest.find('/') {
            Some(i) => rest[..=i].to_string(),
            None => rest.to_string(),
        })
        .collect()
}

#[tokio::test]
async fn synthesized_listing_matches_next_segments_for_any_page_size() {
    let keys = tree_keys();
    for prefix in ["", "logs/", "logs/2024/"] {
        let expected = expected_segments(&keys, prefix);
        for page_size in [1, 2, 3, 7, 1000] {
            let store = store_with(&keys, page_size);
            let listing = namespace(&store).list("demo", prefix, "/").await.unwrap();

            let names: Vec<String> = listing.iter().map(|n| n.name().to_string()).collect();
            let unique: BTreeSet<String> = names.iter().cloned().collect();
            assert_eq!(names.len(), unique.len(), "duplicate under '{prefix}' with page size {page_size}");
            assert_eq!(unique, expected, "prefix '{prefix}', page size {page_size}");

            let first_object = listing.iter().position(|n| !n.is_container()).unwrap_or(listing.len());
            assert!(
                listing.iter().skip(first_object).all(|n| !n.is_container()),
                "directories must precede objects"
            );
        }
    }
}

#[tokio::test]
async fn recursive_listing_is_independent_of_page_size() {
    let keys = tree_keys();
    let mut seen = Vec::new();
    for page_size in [1, 4, 1000] {
        let store = store_with(&keys, page_size);
        let objects = namespace(&store).list_recursive("demo", "logs/").await.unwrap();
        let listed: Vec<String> = objects.into_iter().map(|m| m.key).collect();
        seen.push(listed);
    }
    assert!(seen.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(seen[0].len(), keys.iter().filter(|k| k.starts_with("logs/")).count());
}

#[tokio::test]
async fn mutation_invalidates_cached_listing() {
    let store = store_with(&["logs/2024/a.txt".to_string()], 1000);
    store.add_bucket("archive");
    let ns = namespace(&store);

    let before = ns.list("archive", "", "/").await.unwrap();
    assert!(before.is_empty());

    // A write that bypasses the engine is not visible until invalidation
    store.insert("archive", "sneaky.txt", "s");
    assert!(ns.list("archive", "", "/").await.unwrap().is_empty());

    let result = run(
        &ns,
        TransferRequest::new(
            TransferKind::Copy,
            vec![SourceRef::object("demo", "logs/2024/a.txt")],
            Destination::remote("archive", ""),
        ),
    )
    .await;
    assert!(result.is_clean());

    let after = ns.list("archive", "", "/").await.unwrap();
    let names: Vec<&str> = after.iter().map(Node::name).collect();
    assert_eq!(names, vec!["a.txt", "sneaky.txt"]);
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn one_denied_item_fails_alone() {
    let keys: Vec<String> = (0..12).map(|i| format!("batch/{i:02}.dat")).collect();
    let store = store_with(&keys, 5);
    store.add_bucket("archive");
    store.inject_fault(StoreOp::Copy, "batch/07.dat", ErrorKind::AccessDenied, None);

    let sources = keys.iter().map(|k| SourceRef::object("demo", k.as_str())).collect();
    let result = run(
        &namespace(&store),
        TransferRequest::new(TransferKind::Copy, sources, Destination::remote("archive", "")),
    )
    .await;

    assert_eq!(result.total(), 12);
    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded, 11);
    assert_eq!(store.keys("archive").len(), 11);
    assert!(result.summary().starts_with("copy: 11 succeeded, 1 failed, 0 skipped"));
}

#[tokio::test]
async fn failed_delete_after_copy_is_partial_failure() {
    let store = store_with(&["logs/2024/a.txt".to_string()], 1000);
    store.add_bucket("archive");
    store.inject_fault(StoreOp::Delete, "logs/2024/a.txt", ErrorKind::AccessDenied, None);

    let result = run(
        &namespace(&store),
        TransferRequest::new(
            TransferKind::Move,
            vec![SourceRef::object("demo", "logs/2024/a.txt")],
            Destination::remote("archive", ""),
        ),
    )
    .await;

    assert!(matches!(
        result.items[0].outcome,
        Outcome::Failed {
            kind: ErrorKind::PartialFailure,
            ..
        }
    ));
    assert!(store.contains("demo", "logs/2024/a.txt"));
    assert!(store.contains("archive", "a.txt"));
    assert!(result.summary().contains("1 copied but not deleted"));
}

#[tokio::test]
async fn fail_policy_leaves_destination_untouched() {
    let store = store_with(&["a.txt".to_string()], 1000);
    store.insert("archive", "a.txt", "original destination bytes");

    let request = TransferRequest::new(
        TransferKind::Copy,
        vec![SourceRef::object("demo", "a.txt")],
        Destination::remote("archive", ""),
    )
    .with_policy(OverwritePolicy::Fail);
    let result = run(&namespace(&store), request).await;

    assert_eq!(result.items[0].outcome, Outcome::Skipped { reason: SkipReason::Exists });
    assert_eq!(
        store.object_data("archive", "a.txt").unwrap(),
        b"original destination bytes"
    );
    assert_eq!(store.calls(StoreOp::Copy), 0);
}

#[tokio::test]
async fn repeated_delete_batch_is_idempotent() {
    let keys: Vec<String> = vec!["x/1".into(), "x/2".into(), "x/3".into()];
    let store = store_with(&keys, 1000);
    let ns = namespace(&store);
    let sources: Vec<SourceRef> = keys.iter().map(|k| SourceRef::object("demo", k.as_str())).collect();

    let first = run(&ns, TransferRequest::delete(sources.clone())).await;
    assert_eq!(first.succeeded, 3);

    let mut again = sources;
    again.push(SourceRef::directory("demo", "x/"));
    let second = run(&ns, TransferRequest::delete(again)).await;
    assert_eq!((second.succeeded, second.failed, second.skipped), (0, 0, 4));
    assert!(second
        .items
        .iter()
        .all(|i| i.outcome == Outcome::Skipped { reason: SkipReason::AlreadyAbsent }));
}

#[tokio::test]
async fn call_timeout_counts_as_transient() {
    let slow = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(200)));
    slow.add_bucket("demo");
    let backend: Arc<dyn ObjectStore> = slow.clone();
    let timed: Arc<dyn ObjectStore> = Arc::new(TimedStore::new(backend, Duration::from_millis(10)));
    let ns = Namespace::new(timed, ListingCache::default());

    let err = ns.list("demo", "", "/").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.is_transient());
}

#[tokio::test]
async fn dual_pane_copy_scenario() {
    let keys: Vec<String> = ["logs/2024/a.txt", "logs/2024/b.txt", "logs/2024/sub/c.txt"]
        .into_iter()
        .map(String::from)
        .collect();
    let store = store_with(&keys, 2);
    store.add_bucket("archive");
    let engine = TransferEngine::new(namespace(&store), config());
    let mut dispatcher = Dispatcher::new(engine, DispatcherOptions::default());
    dispatcher
        .init(Location::new("demo", "logs/2024/"), Location::new("archive", ""))
        .await
        .unwrap();

    let listing = dispatcher.active_pane().listing().unwrap().clone();
    let shown: Vec<(&str, bool)> = listing.iter().map(|n| (n.name(), n.is_container())).collect();
    assert_eq!(shown, vec![("sub/", true), ("a.txt", false), ("b.txt", false)]);

    for command in [
        Command::MoveCursor(1),
        Command::ToggleSelect,
        Command::MoveCursor(1),
        Command::ToggleSelect,
    ] {
        dispatcher.dispatch(command).await.unwrap();
    }
    assert_eq!(dispatcher.state(), DispatchState::Selecting);

    let started = dispatcher.dispatch(Command::execute(TransferKind::Copy)).await.unwrap();
    assert!(matches!(started, Response::TransferStarted { sources: 2, .. }));

    let result = dispatcher.wait_transfer().await.unwrap().unwrap();
    assert_eq!((result.succeeded, result.failed, result.skipped), (2, 0, 0));
    assert_eq!(dispatcher.state(), DispatchState::Browsing);

    let right = dispatcher.snapshot().right;
    let names: Vec<&str> = right.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}
