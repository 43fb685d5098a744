use futures::future::join_all;
use serde_json::json;

use mcp_hub_lib::{AppError, AppType, McpQueryClient};

#[path = "support.rs"]
mod support;
use support::create_fake_state;

fn candidate(id: &str) -> serde_json::Value {
    json!({"id": id, "server": {"type": "stdio", "command": "npx", "args": ["-y", id]}})
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_share_one_fetch() {
    let (state, _stores) = create_fake_state();
    let client = McpQueryClient::new(state);

    let reads = (0..8).map(|_| {
        let client = client.clone();
        async move { client.list_servers().await }
    });
    let results = join_all(reads).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(client.fetch_count(), 1);
}

#[tokio::test]
async fn cached_snapshot_is_reused_until_a_mutation() {
    let (state, _stores) = create_fake_state();
    let client = McpQueryClient::new(state);

    assert!(client.list_servers().await.expect("first read").is_empty());
    client.list_servers().await.expect("second read");
    assert_eq!(client.fetch_count(), 1);

    client
        .upsert_server(candidate("memory"))
        .await
        .expect("upsert");
    let snapshot = client.list_servers().await.expect("read after upsert");
    assert_eq!(client.fetch_count(), 2);
    assert!(snapshot.contains_key("memory"));
}

#[tokio::test]
async fn mutation_notifies_subscribers() {
    let (state, stores) = create_fake_state();
    let client = McpQueryClient::new(state);
    let mut changes = client.subscribe();

    client
        .upsert_server(candidate("memory"))
        .await
        .expect("upsert");
    assert!(changes.has_changed().expect("sender alive"));
    let first = *changes.borrow_and_update();

    let apps = client
        .set_app_enabled("memory", AppType::Claude, true)
        .await
        .expect("enable");
    assert!(apps.claude);
    assert!(stores.claude.contains("memory"));
    assert!(changes.has_changed().expect("sender alive"));
    assert!(*changes.borrow_and_update() > first);

    let snapshot = client.list_servers().await.expect("read");
    assert!(snapshot["memory"].apps.claude);
}

#[tokio::test]
async fn rejected_candidate_keeps_cache() {
    let (state, _stores) = create_fake_state();
    let client = McpQueryClient::new(state);
    client.list_servers().await.expect("warm cache");
    let changes = client.subscribe();

    let err = client
        .upsert_server(json!({"id": "", "server": {"command": "x"}}))
        .await
        .expect_err("blank id");
    assert!(matches!(err, AppError::ValidationFailed(_)));

    assert!(!changes.has_changed().expect("sender alive"));
    client.list_servers().await.expect("read");
    assert_eq!(client.fetch_count(), 1);
}

#[tokio::test]
async fn failed_toggle_does_not_invalidate() {
    let (state, stores) = create_fake_state();
    let client = McpQueryClient::new(state);
    client
        .upsert_server(candidate("memory"))
        .await
        .expect("upsert");
    client.list_servers().await.expect("warm cache");
    let changes = client.subscribe();
    stores.gemini.set_failing(true);

    let err = client
        .set_app_enabled("memory", AppType::Gemini, true)
        .await
        .expect_err("gemini fails");
    assert!(matches!(err, AppError::LiveWrite { .. }));
    assert!(!changes.has_changed().expect("sender alive"));
}

#[tokio::test]
async fn partial_delete_still_refreshes_the_snapshot() {
    let (state, stores) = create_fake_state();
    let client = McpQueryClient::new(state);
    client
        .upsert_server(candidate("memory"))
        .await
        .expect("upsert");
    client
        .set_app_enabled("memory", AppType::Claude, true)
        .await
        .expect("enable claude");
    client
        .set_app_enabled("memory", AppType::Codex, true)
        .await
        .expect("enable codex");
    client.list_servers().await.expect("warm cache");
    stores.codex.set_failing(true);

    let err = client.delete_server("memory").await.expect_err("partial");
    assert!(matches!(err, AppError::PartialFailure(_)));

    let snapshot = client.list_servers().await.expect("read");
    let apps = &snapshot["memory"].apps;
    assert!(!apps.claude);
    assert!(apps.codex);
}
