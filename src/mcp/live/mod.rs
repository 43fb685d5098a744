//! Per-app native MCP configuration ("live" stores).
//!
//! The sync engine only talks to [`McpLiveStore`]; the file-backed stores in
//! this module are the default implementations for each supported app.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::app_config::AppType;
use crate::error::AppError;

use super::spec::McpServerSpec;

mod claude;
mod codex;
mod gemini;
mod json_file;

pub use claude::ClaudeMcpStore;
pub use codex::CodexMcpStore;
pub use gemini::GeminiMcpStore;

/// One app's native MCP configuration
pub trait McpLiveStore: Send + Sync {
    fn app(&self) -> AppType;

    /// Write (or overwrite) the entry for `id`
    fn materialize(&self, id: &str, server: &McpServerSpec) -> Result<(), AppError>;

    /// Remove the entry for `id`; a missing entry or file is a no-op
    fn retract(&self, id: &str) -> Result<(), AppError>;

    /// Raw entries currently present, converted to the loose JSON connection shape
    fn read_servers(&self) -> Result<BTreeMap<String, Value>, AppError>;

    /// Replace every MCP entry of the app with `servers`
    fn replace_all(&self, servers: &BTreeMap<String, McpServerSpec>) -> Result<(), AppError>;
}

/// The set of live stores the engine fans out to
#[derive(Clone, Default)]
pub struct LiveStores {
    stores: Vec<Arc<dyn McpLiveStore>>,
}

impl LiveStores {
    pub fn new(stores: Vec<Arc<dyn McpLiveStore>>) -> Self {
        Self { stores }
    }

    /// File-backed stores at the paths resolved from settings
    pub fn from_default_locations() -> Self {
        let stores: Vec<Arc<dyn McpLiveStore>> = vec![
            Arc::new(ClaudeMcpStore::default_location()),
            Arc::new(CodexMcpStore::default_location()),
            Arc::new(GeminiMcpStore::default_location()),
        ];
        Self::new(stores)
    }

    pub fn get(&self, app: AppType) -> Option<&Arc<dyn McpLiveStore>> {
        self.stores.iter().find(|s| s.app() == app)
    }

    pub(crate) fn require(&self, app: AppType) -> Result<&Arc<dyn McpLiveStore>, AppError> {
        self.get(app).ok_or_else(|| AppError::LiveWrite {
            app: app.to_string(),
            message: "未配置该应用的 MCP 存储".into(),
        })
    }
}

/// 单个应用同步失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSyncFailure {
    pub app: AppType,
    pub message: String,
}

/// Per-app outcome of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied: Vec<AppType>,
    pub failed: Vec<AppSyncFailure>,
}

impl SyncReport {
    pub fn record(&mut self, app: AppType, result: Result<(), AppError>) {
        match result {
            Ok(()) => self.applied.push(app),
            Err(err) => self.failed.push(AppSyncFailure {
                app,
                message: err.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_apps(&self) -> Vec<AppType> {
        self.failed.iter().map(|f| f.app).collect()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed.is_empty() {
            return write!(f, "{} 个应用同步成功", self.applied.len());
        }
        for (i, failure) in self.failed.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.app, failure.message)?;
        }
        Ok(())
    }
}
