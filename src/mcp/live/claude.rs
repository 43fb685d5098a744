use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::app_config::AppType;
use crate::error::AppError;
use crate::mcp::McpServerSpec;

use super::json_file::JsonMcpFile;
use super::McpLiveStore;

/// `~/.claude.json`: entries live under `mcpServers.<id>` with their `type` tag
pub struct ClaudeMcpStore {
    file: JsonMcpFile,
}

impl ClaudeMcpStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: JsonMcpFile::new(path),
        }
    }

    pub fn default_location() -> Self {
        Self::new(crate::config::get_claude_mcp_path())
    }
}

impl McpLiveStore for ClaudeMcpStore {
    fn app(&self) -> AppType {
        AppType::Claude
    }

    fn materialize(&self, id: &str, server: &McpServerSpec) -> Result<(), AppError> {
        let entry = server.to_value();
        self.file.update_servers(|servers| {
            servers.insert(id.to_string(), entry);
            true
        })
    }

    fn retract(&self, id: &str) -> Result<(), AppError> {
        self.file.remove_server(id)
    }

    fn read_servers(&self) -> Result<BTreeMap<String, Value>, AppError> {
        Ok(self.file.read_servers()?.into_iter().collect())
    }

    fn replace_all(&self, servers: &BTreeMap<String, McpServerSpec>) -> Result<(), AppError> {
        self.file.update_servers(|current| {
            current.clear();
            for (id, spec) in servers {
                current.insert(id.clone(), spec.to_value());
            }
            true
        })
    }
}
