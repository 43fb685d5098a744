use serde_json::json;

use mcp_hub_lib::{AppError, AppType, DeleteOutcome, FieldError, McpApps, McpService};

#[path = "support.rs"]
mod support;
use support::create_fake_state;

fn stdio_candidate(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Memory",
        "server": {"type": "stdio", "command": "npx", "args": ["-y", "@modelcontextprotocol/server-memory"]},
        "tags": ["memory"]
    })
}

#[test]
fn upsert_new_server_starts_disabled_everywhere() {
    let (state, stores) = create_fake_state();

    let outcome = McpService::upsert_server(&state, &stdio_candidate("memory"))
        .expect("upsert succeeds");
    assert!(outcome.created);
    assert!(outcome.report.is_success());
    assert_eq!(outcome.server.apps, McpApps::default());

    let all = McpService::get_all_servers(&state).expect("list");
    let stored = all.get("memory").expect("stored");
    assert_eq!(stored.definition.name.as_deref(), Some("Memory"));
    assert_eq!(stored.definition.tags, vec!["memory".to_string()]);
    assert_eq!(stored.apps, McpApps::default());

    for app in AppType::ALL {
        assert!(!stores.get(app).contains("memory"));
    }
}

#[test]
fn upsert_with_enabled_true_enables_every_app() {
    let (state, stores) = create_fake_state();
    let mut candidate = stdio_candidate("memory");
    candidate["enabled"] = json!(true);

    let outcome = McpService::upsert_server(&state, &candidate).expect("upsert");
    assert!(outcome.created);
    assert_eq!(outcome.report.applied.len(), 3);
    assert!(outcome.server.apps.claude && outcome.server.apps.codex && outcome.server.apps.gemini);
    for app in AppType::ALL {
        assert!(stores.get(app).contains("memory"), "{app} should hold the entry");
    }
}

#[test]
fn upsert_with_enabled_true_only_flips_acknowledged_apps() {
    let (state, stores) = create_fake_state();
    stores.gemini.set_failing(true);
    let mut candidate = stdio_candidate("memory");
    candidate["enabled"] = json!(true);

    let outcome = McpService::upsert_server(&state, &candidate).expect("upsert");
    assert_eq!(outcome.report.failed_apps(), vec![AppType::Gemini]);
    assert_eq!(
        outcome.server.apps,
        McpApps {
            claude: true,
            codex: true,
            gemini: false
        }
    );
}

#[test]
fn invalid_candidate_leaves_registry_untouched() {
    let (state, _stores) = create_fake_state();

    let err = McpService::upsert_server(
        &state,
        &json!({"id": "remote", "server": {"type": "http", "url": "nope"}}),
    )
    .expect_err("invalid url");

    match err {
        AppError::ValidationFailed(errors) => assert!(errors
            .contains(|e| matches!(e, FieldError::InvalidConnection { field, .. } if field == "server.url"))),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(McpService::get_all_servers(&state).expect("list").is_empty());
}

#[test]
fn update_rewrites_enabled_apps_and_keeps_matrix() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");
    McpService::toggle_app(&state, "memory", AppType::Codex, true).expect("enable codex");

    let updated = json!({
        "id": "memory",
        "server": {"type": "stdio", "command": "uvx", "args": ["mcp-memory"]}
    });
    let outcome = McpService::upsert_server(&state, &updated).expect("update");
    assert!(!outcome.created);
    assert_eq!(outcome.report.applied, vec![AppType::Codex]);
    assert!(outcome.server.apps.codex);
    assert!(!outcome.server.apps.claude);

    match stores.codex.get("memory").expect("codex entry") {
        mcp_hub_lib::McpServerSpec::Stdio(s) => assert_eq!(s.command, "uvx"),
        other => panic!("unexpected spec: {other:?}"),
    }
    assert!(!stores.claude.contains("memory"));
}

#[test]
fn toggle_on_then_off_removes_entry() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");

    let apps = McpService::toggle_app(&state, "memory", AppType::Claude, true).expect("enable");
    assert!(apps.claude);
    assert!(stores.claude.contains("memory"));

    let apps = McpService::toggle_app(&state, "memory", AppType::Claude, false).expect("disable");
    assert!(!apps.claude);
    assert!(!stores.claude.contains("memory"));

    let stored = McpService::get_server(&state, "memory")
        .expect("get")
        .expect("exists");
    assert!(!stored.apps.claude);
}

#[test]
fn toggle_missing_server_is_not_found() {
    let (state, stores) = create_fake_state();
    let err = McpService::toggle_app(&state, "missing-id", AppType::Claude, true)
        .expect_err("missing id");
    assert!(matches!(err, AppError::NotFound(id) if id == "missing-id"));
    assert_eq!(stores.claude.write_count(), 0);
}

#[test]
fn toggle_store_failure_leaves_cell_unchanged() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");
    stores.codex.set_failing(true);

    let err = McpService::toggle_app(&state, "memory", AppType::Codex, true)
        .expect_err("codex store fails");
    assert!(matches!(err, AppError::LiveWrite { ref app, .. } if app == "codex"));

    let stored = McpService::get_server(&state, "memory").unwrap().unwrap();
    assert!(!stored.apps.codex);
}

#[test]
fn delete_twice_is_a_noop_the_second_time() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");
    McpService::toggle_app(&state, "memory", AppType::Claude, true).expect("enable");
    McpService::toggle_app(&state, "memory", AppType::Gemini, true).expect("enable");

    assert_eq!(
        McpService::delete_server(&state, "memory").expect("first delete"),
        DeleteOutcome::Removed
    );
    assert!(!stores.claude.contains("memory"));
    assert!(!stores.gemini.contains("memory"));
    assert!(McpService::get_server(&state, "memory").expect("get").is_none());

    assert_eq!(
        McpService::delete_server(&state, "memory").expect("second delete"),
        DeleteOutcome::NothingToDelete
    );
}

#[test]
fn partial_delete_keeps_failed_apps_and_retries_only_them() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");
    for app in AppType::ALL {
        McpService::toggle_app(&state, "memory", app, true).expect("enable");
    }
    stores.codex.set_failing(true);

    let err = McpService::delete_server(&state, "memory").expect_err("codex fails");
    let AppError::PartialFailure(report) = err else {
        panic!("expected partial failure");
    };
    assert_eq!(report.failed_apps(), vec![AppType::Codex]);

    let stored = McpService::get_server(&state, "memory")
        .expect("get")
        .expect("row kept");
    assert_eq!(
        stored.apps,
        McpApps {
            claude: false,
            codex: true,
            gemini: false
        }
    );
    assert!(!stores.claude.contains("memory"));
    assert!(stores.codex.contains("memory"));

    stores.codex.set_failing(false);
    let claude_writes = stores.claude.write_count();
    assert_eq!(
        McpService::delete_server(&state, "memory").expect("retry"),
        DeleteOutcome::Removed
    );
    assert_eq!(stores.claude.write_count(), claude_writes, "claude not retried");
    assert!(!stores.codex.contains("memory"));
}

#[test]
fn sync_app_projects_only_enabled_servers() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");
    McpService::upsert_server(
        &state,
        &json!({"id": "remote", "server": {"type": "sse", "url": "https://x.dev/sse"}}),
    )
    .expect("create remote");
    McpService::toggle_app(&state, "remote", AppType::Gemini, true).expect("enable");

    stores
        .gemini
        .insert_raw("stale", mcp_hub_lib::McpServerSpec::stdio("old"));
    let written = McpService::sync_app(&state, AppType::Gemini).expect("sync");
    assert_eq!(written, 1);
    assert!(stores.gemini.contains("remote"));
    assert!(!stores.gemini.contains("memory"));
    assert!(!stores.gemini.contains("stale"));
}

#[test]
fn import_adds_unknown_servers_and_enables_app() {
    let (state, stores) = create_fake_state();
    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");

    stores
        .claude
        .insert_raw("memory", mcp_hub_lib::McpServerSpec::stdio("something-else"));
    stores
        .claude
        .insert_raw("fetch", mcp_hub_lib::McpServerSpec::stdio("uvx"));

    let changed = McpService::import_from_app(&state, AppType::Claude).expect("import");
    assert_eq!(changed, 2);

    let all = McpService::get_all_servers(&state).expect("list");
    assert!(all["fetch"].apps.claude);
    assert!(all["memory"].apps.claude);
    // existing definition wins over the native entry
    match &all["memory"].definition.server {
        mcp_hub_lib::McpServerSpec::Stdio(s) => assert_eq!(s.command, "npx"),
        other => panic!("unexpected spec: {other:?}"),
    }

    assert_eq!(
        McpService::import_from_app(&state, AppType::Claude).expect("re-import"),
        0
    );
}

#[test]
fn allocate_id_appends_counter_when_taken() {
    let (state, _stores) = create_fake_state();
    assert_eq!(McpService::allocate_id(&state, "Memory").expect("id"), "memory");

    McpService::upsert_server(&state, &stdio_candidate("memory")).expect("create");
    assert_eq!(
        McpService::allocate_id(&state, "Memory").expect("id"),
        "memory-2"
    );
}
