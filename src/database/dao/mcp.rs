use crate::app_config::{AppType, McpApps, McpServer, ServerDefinition};
use crate::error::AppError;
use crate::mcp::McpServerSpec;
use indexmap::IndexMap;
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{lock_conn, Database};

const SELECT_MCP_SERVER: &str = "SELECT id, name, server_config, description, homepage, docs, tags, default_enabled, enabled_claude, enabled_codex, enabled_gemini
     FROM mcp_servers";

/// One `mcp_servers` row before the JSON columns are decoded
struct McpServerRow {
    id: String,
    name: String,
    server_config: String,
    description: Option<String>,
    homepage: Option<String>,
    docs: Option<String>,
    tags: String,
    default_enabled: Option<bool>,
    apps: McpApps,
}

impl McpServerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            server_config: row.get(2)?,
            description: row.get(3)?,
            homepage: row.get(4)?,
            docs: row.get(5)?,
            tags: row.get(6)?,
            default_enabled: row.get(7)?,
            apps: McpApps {
                claude: row.get(8)?,
                codex: row.get(9)?,
                gemini: row.get(10)?,
            },
        })
    }

    fn into_server(self) -> Result<McpServer, AppError> {
        let server: McpServerSpec = serde_json::from_str(&self.server_config).map_err(|e| {
            AppError::Database(format!("MCP 服务器 '{}' 的连接配置无效: {e}", self.id))
        })?;
        let tags = serde_json::from_str(&self.tags).unwrap_or_default();
        // name is NOT NULL in the table; unnamed definitions are stored as ''
        let name = (!self.name.is_empty()).then_some(self.name);

        Ok(McpServer {
            definition: ServerDefinition {
                id: self.id,
                name,
                server,
                description: self.description,
                homepage: self.homepage,
                docs: self.docs,
                tags,
                enabled: self.default_enabled,
            },
            apps: self.apps,
        })
    }
}

fn enabled_column(app: &AppType) -> &'static str {
    match app {
        AppType::Claude => "enabled_claude",
        AppType::Codex => "enabled_codex",
        AppType::Gemini => "enabled_gemini",
    }
}

impl Database {
    pub fn get_all_mcp_servers(&self) -> Result<IndexMap<String, McpServer>, AppError> {
        let conn = lock_conn!(self.conn);
        let mut stmt = conn
            .prepare(&format!("{SELECT_MCP_SERVER} ORDER BY name ASC, id ASC"))
            .map_err(|e| AppError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], McpServerRow::from_row)
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut servers = IndexMap::new();
        for row in rows {
            let row = row.map_err(|e| AppError::Database(e.to_string()))?;
            match row.into_server() {
                Ok(server) => {
                    servers.insert(server.definition.id.clone(), server);
                }
                Err(err) => log::warn!("跳过无效的 MCP 条目: {err}"),
            }
        }
        Ok(servers)
    }

    pub fn get_mcp_server(&self, id: &str) -> Result<Option<McpServer>, AppError> {
        let conn = lock_conn!(self.conn);
        let row = conn
            .query_row(
                &format!("{SELECT_MCP_SERVER} WHERE id = ?1"),
                params![id],
                McpServerRow::from_row,
            )
            .optional()
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(McpServerRow::into_server).transpose()
    }

    /// Insert or replace a definition together with its matrix as one row
    pub fn save_mcp_server(&self, server: &McpServer) -> Result<(), AppError> {
        let def = &server.definition;
        let server_config =
            serde_json::to_string(&def.server).map_err(|e| AppError::JsonSerialize { source: e })?;
        let tags =
            serde_json::to_string(&def.tags).map_err(|e| AppError::JsonSerialize { source: e })?;

        let conn = lock_conn!(self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO mcp_servers (
                id, name, server_config, description, homepage, docs, tags,
                default_enabled, enabled_claude, enabled_codex, enabled_gemini
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                server.id(),
                def.name.as_deref().unwrap_or_default(),
                server_config,
                def.description,
                def.homepage,
                def.docs,
                tags,
                def.enabled,
                server.apps.claude,
                server.apps.codex,
                server.apps.gemini,
            ],
        )
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Flip a single matrix cell. Returns `false` when the row does not exist.
    pub fn set_mcp_app_enabled(
        &self,
        id: &str,
        app: &AppType,
        enabled: bool,
    ) -> Result<bool, AppError> {
        let conn = lock_conn!(self.conn);
        let sql = format!(
            "UPDATE mcp_servers SET {} = ?1 WHERE id = ?2",
            enabled_column(app)
        );
        let changed = conn
            .execute(&sql, params![enabled, id])
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Returns whether a row was removed; deleting a missing id is not an error
    pub fn delete_mcp_server(&self, id: &str) -> Result<bool, AppError> {
        let conn = lock_conn!(self.conn);
        let removed = conn
            .execute("DELETE FROM mcp_servers WHERE id = ?1", params![id])
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(removed > 0)
    }
}
