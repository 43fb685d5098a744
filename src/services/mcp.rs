use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::app_config::{AppType, McpApps, McpServer};
use crate::error::AppError;
use crate::mcp::{validate_server_definition, validate_server_spec, McpServerSpec, SyncReport};
use crate::store::AppState;

/// MCP 相关业务逻辑
pub struct McpService;

/// Result of [`McpService::upsert_server`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub server: McpServer,
    pub created: bool,
    pub report: SyncReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteOutcome {
    Removed,
    NothingToDelete,
}

/// Run `op` for every app concurrently and wait for all of them
fn fan_out<F>(apps: &[AppType], op: F) -> SyncReport
where
    F: Fn(AppType) -> Result<(), AppError> + Sync,
{
    let results: Vec<(AppType, Result<(), AppError>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = apps
            .iter()
            .map(|&app| {
                let op = &op;
                (app, scope.spawn(move || op(app)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(app, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(AppError::Message(format!("{app} 同步线程异常退出"))));
                (app, result)
            })
            .collect()
    });

    let mut report = SyncReport::default();
    for (app, result) in results {
        report.record(app, result);
    }
    report
}

fn live_write_error(app: AppType, err: AppError) -> AppError {
    match err {
        err @ AppError::LiveWrite { .. } => err,
        other => AppError::LiveWrite {
            app: app.to_string(),
            message: other.to_string(),
        },
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "mcp-server".to_string()
    } else {
        slug.to_string()
    }
}

impl McpService {
    /// 获取所有 MCP 服务器（含各应用启用状态）
    pub fn get_all_servers(state: &AppState) -> Result<IndexMap<String, McpServer>, AppError> {
        state.db.get_all_mcp_servers()
    }

    pub fn get_server(state: &AppState, id: &str) -> Result<Option<McpServer>, AppError> {
        state.db.get_mcp_server(id)
    }

    /// Validate and store a definition.
    ///
    /// An existing id keeps its matrix and the new definition is written to
    /// every app it is enabled for. A new id starts with an all-`false`
    /// matrix; `enabled: true` then enables it for every app one by one.
    pub fn upsert_server(state: &AppState, candidate: &Value) -> Result<UpsertOutcome, AppError> {
        let definition = validate_server_definition(candidate)?;
        let id = definition.id.clone();

        if let Some(existing) = state.db.get_mcp_server(&id)? {
            let server = McpServer {
                definition,
                apps: existing.apps,
            };
            state.db.save_mcp_server(&server)?;

            let spec = &server.definition.server;
            let report = fan_out(&server.apps.enabled_apps(), |app| {
                state
                    .live
                    .require(app)?
                    .materialize(&id, spec)
                    .map_err(|e| live_write_error(app, e))
            });
            if report.is_success() {
                log::info!("已更新 MCP 服务器 '{id}'");
            } else {
                log::warn!("MCP 服务器 '{id}' 已更新，但部分应用同步失败: {report}");
            }

            return Ok(UpsertOutcome {
                server,
                created: false,
                report,
            });
        }

        let server = McpServer {
            definition,
            apps: McpApps::default(),
        };
        state.db.save_mcp_server(&server)?;
        log::info!("已创建 MCP 服务器 '{id}'");

        let report = if server.definition.enabled == Some(true) {
            fan_out(&AppType::ALL, |app| {
                Self::toggle_app(state, &id, app, true).map(|_| ())
            })
        } else {
            SyncReport::default()
        };
        if !report.is_success() {
            log::warn!("MCP 服务器 '{id}' 部分应用启用失败: {report}");
        }

        let server = state.db.get_mcp_server(&id)?.unwrap_or(server);
        Ok(UpsertOutcome {
            server,
            created: true,
            report,
        })
    }

    /// Enable or disable one server for one app.
    ///
    /// The app's store is written first; the matrix cell only flips once the
    /// store acknowledged. Returns the resulting matrix.
    pub fn toggle_app(
        state: &AppState,
        id: &str,
        app: AppType,
        enabled: bool,
    ) -> Result<McpApps, AppError> {
        let server = state
            .db
            .get_mcp_server(id)?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let store = state.live.require(app)?;
        let written = if enabled {
            store.materialize(id, &server.definition.server)
        } else {
            store.retract(id)
        };
        written.map_err(|e| live_write_error(app, e))?;

        if !state.db.set_mcp_app_enabled(id, &app, enabled)? {
            // Row vanished between the read and the write
            return Err(AppError::NotFound(id.to_string()));
        }

        let mut apps = server.apps;
        apps.set_enabled_for(&app, enabled);
        log::info!(
            "MCP 服务器 '{id}' 已{} {app} 应用",
            if enabled { "启用" } else { "停用" }
        );
        Ok(apps)
    }

    /// Retract a server from every app it is enabled for, then remove it.
    ///
    /// The row is only removed when every retraction succeeded; otherwise the
    /// failed apps stay enabled and a later delete retries just those.
    pub fn delete_server(state: &AppState, id: &str) -> Result<DeleteOutcome, AppError> {
        let Some(server) = state.db.get_mcp_server(id)? else {
            log::debug!("MCP 服务器 '{id}' 不存在，无需删除");
            return Ok(DeleteOutcome::NothingToDelete);
        };

        let report = fan_out(&server.apps.enabled_apps(), |app| {
            state
                .live
                .require(app)?
                .retract(id)
                .map_err(|e| live_write_error(app, e))
        });

        for app in &report.applied {
            state.db.set_mcp_app_enabled(id, app, false)?;
        }

        if !report.is_success() {
            log::warn!("删除 MCP 服务器 '{id}' 时部分应用清理失败: {report}");
            return Err(AppError::PartialFailure(report));
        }

        state.db.delete_mcp_server(id)?;
        log::info!("已删除 MCP 服务器 '{id}'");
        Ok(DeleteOutcome::Removed)
    }

    /// Project every server enabled for `app` into its store in one write.
    /// Returns the number of servers written.
    pub fn sync_app(state: &AppState, app: AppType) -> Result<usize, AppError> {
        let servers: BTreeMap<String, McpServerSpec> = state
            .db
            .get_all_mcp_servers()?
            .into_values()
            .filter(|s| s.apps.is_enabled_for(&app))
            .map(|s| (s.definition.id, s.definition.server))
            .collect();

        state
            .live
            .require(app)?
            .replace_all(&servers)
            .map_err(|e| live_write_error(app, e))?;

        log::info!("已同步 {} 个 MCP 服务器到 {app}", servers.len());
        Ok(servers.len())
    }

    /// Import the app's native MCP entries.
    ///
    /// Unknown ids become new definitions; every imported id is then enabled
    /// for `app` through [`Self::toggle_app`]. Existing definitions are not
    /// overwritten. Returns how many matrix cells changed.
    pub fn import_from_app(state: &AppState, app: AppType) -> Result<usize, AppError> {
        let entries = state.live.require(app)?.read_servers()?;

        let mut changed = 0;
        let mut errors = Vec::new();

        for (id, raw) in entries {
            let existing = state.db.get_mcp_server(&id)?;
            match existing {
                Some(server) if server.apps.is_enabled_for(&app) => continue,
                Some(_) => {
                    // Keep the registry's definition, only validate the native entry shape
                    if let Err(e) = validate_server_spec(&raw) {
                        log::warn!("跳过无效 MCP 服务器 '{id}': {e}");
                        errors.push(format!("{id}: {e}"));
                        continue;
                    }
                }
                None => {
                    let definition = match validate_server_definition(&json!({
                        "id": id,
                        "server": raw,
                    })) {
                        Ok(def) => def,
                        Err(e) => {
                            log::warn!("跳过无效 MCP 服务器 '{id}': {e}");
                            errors.push(format!("{id}: {e}"));
                            continue;
                        }
                    };
                    state.db.save_mcp_server(&McpServer {
                        definition,
                        apps: McpApps::default(),
                    })?;
                    log::info!("导入新 MCP 服务器 '{id}'");
                }
            }

            Self::toggle_app(state, &id, app, true)?;
            changed += 1;
        }

        if !errors.is_empty() {
            log::warn!("导入完成，但有 {} 项失败: {:?}", errors.len(), errors);
        }
        Ok(changed)
    }

    /// Derive an unused id from a display name: `my-server`, `my-server-2`, ...
    pub fn allocate_id(state: &AppState, name: &str) -> Result<String, AppError> {
        let base = slugify(name);
        if state.db.get_mcp_server(&base)?.is_none() {
            return Ok(base);
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{base}-{n}");
            if state.db.get_mcp_server(&candidate)?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  My Fancy Server!! "), "my-fancy-server");
        assert_eq!(slugify("GitHub / MCP"), "github-mcp");
        assert_eq!(slugify("***"), "mcp-server");
    }

    #[test]
    fn fan_out_reports_every_app() {
        let report = fan_out(&AppType::ALL, |app| match app {
            AppType::Codex => Err(AppError::Message("boom".into())),
            _ => Ok(()),
        });
        assert_eq!(report.applied, vec![AppType::Claude, AppType::Gemini]);
        assert_eq!(report.failed_apps(), vec![AppType::Codex]);
    }
}
