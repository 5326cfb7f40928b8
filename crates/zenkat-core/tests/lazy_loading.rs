//! End-to-end behavior of the engine over on-disk and in-memory trees.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pretty_assertions::assert_eq;
use zenkat_core::{
    Eagerness, EngineOptions, ErrorKind, HydrationState, Predicate, SourceErrorKind, TreeState,
    Wait,
};

#[tokio::test]
async fn test_docs_tree_walkthrough() {
    let dir = docs_dir();
    let engine = fs_engine(&dir);

    // Nothing is loaded until a request needs it
    let tree = engine.get_tree("docs", opts(Eagerness::None)).await.unwrap();
    assert_eq!(tree.tree_state, TreeState::Unloaded);
    assert!(tree.data.root_node.is_none());

    let tree = engine.get_tree("docs", opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(tree.tree_state, TreeState::LoadedMetadataOnly);
    assert_eq!(tree.data.virtual_path, "/docs");

    let nodes = engine.list_nodes("docs", opts(Eagerness::Metadata)).await.unwrap();
    let paths: Vec<_> = nodes.data.iter().map(|n| n.virtual_path.as_str()).collect();
    assert_eq!(paths, vec!["/a.md", "/sub", "/sub/b.md"]);
    assert!(nodes
        .data
        .iter()
        .filter(|n| n.hydration.is_some())
        .all(|n| n.hydration == Some(HydrationState::Dehydrated)));

    let a = id("docs", "a.md");
    let node = engine
        .get_node("docs", a.as_str(), opts(Eagerness::Full))
        .await
        .unwrap();
    assert!(node.complete);
    assert_eq!(node.tree_state, TreeState::LoadedPartial);
    let content = node.data.content.expect("content attached");
    assert_eq!(content.text(), Some(A_MD));
    assert_eq!(node.data.summary.hydration, Some(HydrationState::Hydrated));

    let listed = engine.list_nodes("docs", opts(Eagerness::Full)).await.unwrap();
    assert!(listed.complete);
    assert_eq!(listed.tree_state, TreeState::LoadedFull);
}

#[tokio::test]
async fn test_missing_content_shrinks_as_files_hydrate() {
    let engine = memory_engine(docs_memory());
    let missing = Predicate::MissingContent;

    let before = engine.query("docs", &missing, opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(before.data.len(), 2);

    let a = id("docs", "a.md");
    engine
        .get_node("docs", a.as_str(), opts(Eagerness::Full))
        .await
        .unwrap();

    let after = engine.query("docs", &missing, opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(after.data.len(), 1);
    assert_eq!(after.data[0].summary().name, "b.md");
}

#[tokio::test]
async fn test_content_query_with_full_hydrates_everything() {
    let dir = docs_dir();
    let engine = fs_engine(&dir);
    let predicate = Predicate::parse_json(r#"{"content_contains": "More text"}"#).unwrap();

    let answer = engine.query("docs", &predicate, opts(Eagerness::Full)).await.unwrap();
    assert!(answer.complete);
    assert_eq!(answer.tree_state, TreeState::LoadedFull);
    let names: Vec<_> = answer.data.iter().map(|hit| hit.summary().name.as_str()).collect();
    assert_eq!(names, vec!["b.md"]);
}

#[tokio::test]
async fn test_hydration_before_crawl_is_rejected_without_io() {
    let source = docs_memory();
    let engine = memory_engine(source.clone());

    let err = engine
        .hydrator()
        .hydrate("docs", &id("docs", "a.md"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotMetadataLoaded);
    assert_eq!(source.list_calls(), 0);
    assert_eq!(source.read_calls(), 0);
}

#[tokio::test]
async fn test_evict_is_inverse_of_hydrate() {
    let engine = memory_engine(docs_memory());
    engine.crawler().crawl("docs").await.unwrap();
    let a = id("docs", "a.md");

    engine.hydrator().hydrate("docs", &a).await.unwrap();
    assert_eq!(engine.stats("docs").unwrap().hydrated, 1);

    assert!(engine.hydrator().evict("docs", &a).unwrap());
    let node = engine.store().get_node("docs", &a).unwrap();
    assert_eq!(node.hydration_state(), Some(HydrationState::Dehydrated));
    assert_eq!(engine.stats("docs").unwrap().resident_bytes, 0);
    assert_eq!(
        engine.registry().lookup("docs").unwrap().state,
        TreeState::LoadedMetadataOnly
    );

    // Evicting again is a no-op
    assert!(!engine.hydrator().evict("docs", &a).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_crawls_share_one_walk() {
    let source = docs_memory();
    source.set_latency(Duration::from_millis(50));
    let engine = Arc::new(memory_engine(source.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.get_tree("docs", opts(Eagerness::Metadata)).await })
        })
        .collect();

    let mut roots = Vec::new();
    for task in tasks {
        let answer = task.await.unwrap().unwrap();
        roots.push(answer.data.root_node.unwrap());
    }
    roots.dedup();
    assert_eq!(roots.len(), 1);
    // One listing for the root and one for `sub`
    assert_eq!(source.list_calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hydrations_share_one_read() {
    let source = docs_memory();
    let engine = Arc::new(memory_engine(source.clone()));
    engine.crawler().crawl("docs").await.unwrap();
    let a = id("docs", "a.md");

    source.hold_reads();
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let a = a.clone();
            tokio::spawn(async move {
                engine
                    .get_node("docs", a.as_str(), opts(Eagerness::Full))
                    .await
            })
        })
        .collect();

    for _ in 0..100 {
        if source.read_calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.read_calls(), 1);
    assert!(engine.hydrator().in_flight("docs", &a));
    let node = engine.store().get_node("docs", &a).unwrap();
    assert_eq!(node.hydration_state(), Some(HydrationState::Hydrating));

    source.release_reads();
    for task in tasks {
        let answer = task.await.unwrap().unwrap();
        assert_eq!(answer.data.content.unwrap().text(), Some(A_MD));
    }
    assert_eq!(source.read_calls(), 1);
}

#[tokio::test]
async fn test_crawl_failure_reverts_and_retries() {
    let source = docs_memory();
    source.fail_path("sub", SourceErrorKind::PermissionDenied);
    let engine = memory_engine(source.clone());

    let err = engine.get_tree("docs", opts(Eagerness::Metadata)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CrawlError);
    assert_eq!(
        engine.registry().lookup("docs").unwrap().state,
        TreeState::Unloaded
    );

    source.clear_failures();
    let tree = engine.get_tree("docs", opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(tree.tree_state, TreeState::LoadedMetadataOnly);
}

#[tokio::test]
async fn test_hydration_failure_reverts_and_retries() {
    let source = docs_memory();
    let engine = memory_engine(source.clone());
    engine.crawler().crawl("docs").await.unwrap();
    let a = id("docs", "a.md");

    source.fail_path("a.md", SourceErrorKind::Other);
    let err = engine
        .get_node("docs", a.as_str(), opts(Eagerness::Full))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HydrationError);
    let node = engine.store().get_node("docs", &a).unwrap();
    assert_eq!(node.hydration_state(), Some(HydrationState::Dehydrated));

    source.clear_failures();
    let answer = engine
        .get_node("docs", a.as_str(), opts(Eagerness::Full))
        .await
        .unwrap();
    assert!(answer.data.content.is_some());
}

#[tokio::test]
async fn test_slow_crawl_times_out_then_completes() {
    let source = docs_memory();
    source.set_latency(Duration::from_millis(100));
    let engine = memory_engine(source);

    let short = zenkat_core::QueryOptions::new(
        Eagerness::Metadata,
        Wait::block(Duration::from_millis(20)),
    );
    let err = engine.get_tree("docs", short).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.key().as_deref(), Some("docs"));

    // The crawl kept running and a later blocking request sees it finish
    let tree = engine.get_tree("docs", opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(tree.tree_state, TreeState::LoadedMetadataOnly);
}

#[tokio::test]
async fn test_no_wait_returns_pending_and_loads_in_background() {
    let source = docs_memory();
    source.set_latency(Duration::from_millis(30));
    let engine = memory_engine(source);

    let no_wait = engine.query_options(Some(Eagerness::Metadata), false);
    let err = engine.list_nodes("docs", no_wait).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pending);
    assert!(engine.crawler().in_flight("docs"));

    let nodes = engine.list_nodes("docs", opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(nodes.data.len(), 3);
}

#[tokio::test]
async fn test_memory_budget_demotes_fully_loaded_tree() {
    // docs holds 8 bytes; a 10 byte file elsewhere pushes the total over 15
    let engine = engine_with(EngineOptions {
        memory_budget: 15,
        ..Default::default()
    });
    let docs = Arc::new(
        zenkat_core::MemorySource::new()
            .with_file("a.md", "aaaa")
            .with_file("b.md", "bbbb"),
    );
    let other = Arc::new(zenkat_core::MemorySource::new().with_file("c.md", "cccccccccc"));
    engine.register("docs", "/docs", docs).unwrap();
    engine.register("other", "/other", other).unwrap();

    let listed = engine.list_nodes("docs", opts(Eagerness::Full)).await.unwrap();
    assert_eq!(listed.tree_state, TreeState::LoadedFull);

    // Touch b.md so a.md is the least recently used
    let b = id("docs", "b.md");
    engine
        .get_node("docs", b.as_str(), opts(Eagerness::Full))
        .await
        .unwrap();

    engine.list_nodes("other", opts(Eagerness::Full)).await.unwrap();

    assert_eq!(
        engine.registry().lookup("docs").unwrap().state,
        TreeState::LoadedPartial
    );
    let a = engine.store().get_node("docs", &id("docs", "a.md")).unwrap();
    assert_eq!(a.hydration_state(), Some(HydrationState::Dehydrated));
    assert_eq!(engine.hydrator().metrics().evictions, 1);
    assert!(engine.hydrator().budget().current_bytes() <= 15);
}

#[tokio::test]
async fn test_unload_resets_tree() {
    let dir = docs_dir();
    let engine = fs_engine(&dir);
    engine.list_nodes("docs", opts(Eagerness::Full)).await.unwrap();

    engine.unload("docs").unwrap();
    let tree = engine.get_tree("docs", opts(Eagerness::None)).await.unwrap();
    assert_eq!(tree.tree_state, TreeState::Unloaded);
    assert_eq!(engine.hydrator().budget().current_bytes(), 0);

    // Reloads lazily on the next request
    let tree = engine.get_tree("docs", opts(Eagerness::Metadata)).await.unwrap();
    assert_eq!(tree.tree_state, TreeState::LoadedMetadataOnly);
}

#[tokio::test]
async fn test_node_ids_are_stable_across_reloads() {
    let dir = docs_dir();
    let engine = fs_engine(&dir);
    let first = engine.list_nodes("docs", opts(Eagerness::Metadata)).await.unwrap();
    engine.unload("docs").unwrap();
    let second = engine.list_nodes("docs", opts(Eagerness::Metadata)).await.unwrap();

    let ids = |nodes: &[zenkat_core::NodeSummary]| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first.data), ids(&second.data));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reregister_during_crawl_joins_the_running_walk() {
    let source = docs_memory();
    source.set_latency(Duration::from_millis(50));
    let engine = Arc::new(memory_engine(source.clone()));

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.get_tree("docs", opts(Eagerness::Metadata)).await })
    };
    for _ in 0..100 {
        if engine.crawler().in_flight("docs") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(engine.crawler().in_flight("docs"));

    // Same location and virtual path, as an idempotent PUT /tree would send
    engine.register("docs", "/docs", source.clone()).unwrap();
    let second = engine.get_tree("docs", opts(Eagerness::Metadata)).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.data.root_node, second.data.root_node);
    assert_eq!(second.tree_state, TreeState::LoadedMetadataOnly);
    assert_eq!(source.list_calls(), 2);
}

#[tokio::test]
async fn test_content_query_over_budget_is_incomplete() {
    // Each file is 11 bytes, so only one fits in the budget at a time
    let engine = engine_with(EngineOptions {
        memory_budget: 12,
        ..Default::default()
    });
    let source = Arc::new(
        zenkat_core::MemorySource::new()
            .with_file("a.md", "needle aaaa")
            .with_file("b.md", "needle bbbb"),
    );
    engine.register("docs", "/docs", source).unwrap();

    let predicate = Predicate::parse_json(r#"{"content_contains": "needle"}"#).unwrap();
    let answer = engine.query("docs", &predicate, opts(Eagerness::Full)).await.unwrap();

    assert!(!answer.complete);
    assert_eq!(answer.tree_state, TreeState::LoadedPartial);
    assert_eq!(answer.data.len(), 1);

    let listed = engine.list_nodes("docs", opts(Eagerness::Full)).await.unwrap();
    assert!(!listed.complete);
}

#[tokio::test]
async fn test_no_wait_get_node_is_pending_while_hydrating() {
    let source = docs_memory();
    let engine = Arc::new(memory_engine(source.clone()));
    engine.crawler().crawl("docs").await.unwrap();
    let a = id("docs", "a.md");

    source.hold_reads();
    let blocking = {
        let engine = Arc::clone(&engine);
        let a = a.clone();
        tokio::spawn(async move {
            engine
                .get_node("docs", a.as_str(), opts(Eagerness::Full))
                .await
        })
    };
    for _ in 0..100 {
        if engine.hydrator().in_flight("docs", &a) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(engine.hydrator().in_flight("docs", &a));

    let no_wait = engine.query_options(Some(Eagerness::Full), false);
    let err = engine.get_node("docs", a.as_str(), no_wait).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pending);

    source.release_reads();
    let answer = blocking.await.unwrap().unwrap();
    assert_eq!(answer.data.content.unwrap().text(), Some(A_MD));
    assert_eq!(source.read_calls(), 1);
}
