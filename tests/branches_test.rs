/// Branch detection over a live index: stored divergence facts, sibling
/// queries and the on-demand variant.
mod common;

use common::{MockBackend, MockCache, index_with, turns_from, wait_for_hydration};

#[tokio::test(flavor = "multi_thread")]
async fn test_detect_branches_stores_divergence_facts() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c", "d"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x", "y"]));
    backend.set_log("alice", "prefix", 1, turns_from(3000, &["a", "b", "c"]));
    backend.set_log("alice", "unrelated", 1, turns_from(4000, &["z", "q"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;

    index.detect_branches("main");

    assert_eq!(index.get("fork").unwrap().diverges_at, Some(2));
    assert_eq!(index.get("prefix").unwrap().diverges_at, Some(3), "strict prefix diverges at shared length");
    assert_eq!(index.get("unrelated").unwrap().diverges_at, None);
    assert_eq!(index.get("main").unwrap().diverges_at, None, "the reference has no fact on itself");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_detect_branches_bumps_version_and_resets_on_new_reference() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;

    let before = index.version();
    index.detect_branches("main");
    assert!(index.version() > before, "divergence facts are observable state");
    assert_eq!(index.get("fork").unwrap().diverges_at, Some(2));

    // Re-detecting against the other log replaces every fact.
    index.detect_branches("fork");
    assert_eq!(index.get("main").unwrap().diverges_at, Some(2));
    assert_eq!(index.get("fork").unwrap().diverges_at, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_detect_branches_with_unhydrated_reference_only_clears() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x"]));
    backend.fail_fetch("ghost");
    backend.set_log("alice", "ghost", 1, turns_from(3000, &["a", "b"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;

    index.detect_branches("main");
    assert_eq!(index.get("fork").unwrap().diverges_at, Some(2));

    // ghost never hydrated; detecting against it clears the stale facts and
    // stores nothing new.
    index.detect_branches("ghost");
    assert_eq!(index.get("fork").unwrap().diverges_at, None);
    assert_eq!(index.get("main").unwrap().diverges_at, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_siblings_of_returns_post_divergence_suffixes() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c", "d"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x", "y"]));
    backend.set_log("alice", "late-fork", 1, turns_from(5000, &["a", "b", "c", "w"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;
    index.detect_branches("main");

    let siblings = index.siblings_of("main", 10);
    assert_eq!(siblings.len(), 2);
    // Most recent activity first.
    assert_eq!(siblings[0].name, "late-fork");
    assert_eq!(siblings[0].diverges_at, 3);
    assert_eq!(siblings[0].turns.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), vec!["w"]);
    assert_eq!(siblings[1].name, "fork");
    assert_eq!(
        siblings[1].turns.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
        vec!["x", "y"]
    );

    let limited = index.siblings_of("main", 1);
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].name, "late-fork");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_siblings_of_other_base_falls_back_to_on_demand() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c", "d"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x", "y"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;
    index.detect_branches("main");

    // Asking about a base that is not the stored reference must not reuse
    // facts computed for "main".
    let siblings = index.siblings_of("fork", 10);
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].name, "main");
    assert_eq!(siblings[0].diverges_at, 2);
    // And the stored facts stay untouched.
    assert_eq!(index.get("fork").unwrap().diverges_at, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_siblings_of_arbitrary_does_not_mutate_state() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;
    let version = index.version();

    let siblings = index.siblings_of_arbitrary("main", 10);
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].diverges_at, 2);
    assert_eq!(index.version(), version, "read-only query");
    assert_eq!(index.get("fork").unwrap().diverges_at, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_revision_change_clears_divergence_fact() {
    let backend = MockBackend::new();
    backend.set_log("alice", "main", 1, turns_from(1000, &["a", "b", "c"]));
    backend.set_log("alice", "fork", 1, turns_from(2000, &["a", "b", "x"]));
    let index = index_with(backend.clone(), MockCache::new());

    index.refresh("alice").await.unwrap();
    wait_for_hydration(&index).await;
    index.detect_branches("main");
    assert_eq!(index.get("fork").unwrap().diverges_at, Some(2));

    backend.set_log("alice", "fork", 2, turns_from(2000, &["a", "b", "x", "more"]));
    index.refresh("alice").await.unwrap();

    // Invalidation drops the fact; it only comes back via detect_branches.
    assert_eq!(index.get("fork").unwrap().diverges_at, None);
}
