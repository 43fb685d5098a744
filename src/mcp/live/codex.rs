use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use toml_edit::{DocumentMut, Item, Table};

use crate::app_config::AppType;
use crate::config::write_text_file;
use crate::error::AppError;
use crate::mcp::toml_convert::{server_to_toml_table, toml_table_to_json_server};
use crate::mcp::McpServerSpec;

use super::McpLiveStore;

/// `~/.codex/config.toml`.
///
/// Entries are written to `[mcp_servers.<id>]` only; the legacy
/// `[mcp.servers]` location is read for import and cleaned up on every write.
pub struct CodexMcpStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CodexMcpStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn default_location() -> Self {
        Self::new(crate::config::get_codex_config_path())
    }

    fn read_text(&self) -> Result<String, AppError> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&self.path).map_err(|e| AppError::io(&self.path, e))
    }

    /// Parse the current file; invalid TOML is an error so the file is never clobbered
    fn load_document(&self) -> Result<DocumentMut, AppError> {
        let text = self.read_text()?;
        if text.trim().is_empty() {
            return Ok(DocumentMut::new());
        }
        text.parse::<DocumentMut>()
            .map_err(|e| AppError::toml(&self.path, e))
    }

    fn save_document(&self, doc: &DocumentMut) -> Result<(), AppError> {
        write_text_file(&self.path, &doc.to_string())?;
        log::debug!("已写入 Codex MCP 配置: {}", self.path.display());
        Ok(())
    }

    /// Drop `[mcp.servers]`; returns whether anything was removed
    fn remove_legacy_servers(doc: &mut DocumentMut) -> bool {
        let Some(mcp) = doc.get_mut("mcp").and_then(Item::as_table_like_mut) else {
            return false;
        };
        if mcp.remove("servers").is_none() {
            return false;
        }
        log::warn!("检测到错误的 MCP 格式 [mcp.servers]，正在清理并迁移到 [mcp_servers]");
        if mcp.is_empty() {
            doc.remove("mcp");
        }
        true
    }

    /// `[mcp_servers]` as a standard table; an inline `mcp_servers = { ... }` is promoted
    fn servers_table(doc: &mut DocumentMut) -> Result<&mut Table, AppError> {
        if let Some(inline) = doc
            .get_mut("mcp_servers")
            .and_then(Item::as_inline_table_mut)
        {
            let mut table = std::mem::take(inline).into_table();
            table.set_implicit(true);
            doc.insert("mcp_servers", Item::Table(table));
        } else if !doc.contains_key("mcp_servers") {
            let mut table = Table::new();
            table.set_implicit(true);
            doc.insert("mcp_servers", Item::Table(table));
        }
        doc.get_mut("mcp_servers")
            .and_then(Item::as_table_mut)
            .ok_or_else(|| AppError::Config("config.toml 中的 mcp_servers 必须是表".into()))
    }
}

impl McpLiveStore for CodexMcpStore {
    fn app(&self) -> AppType {
        AppType::Codex
    }

    fn materialize(&self, id: &str, server: &McpServerSpec) -> Result<(), AppError> {
        let _guard = self.write_lock.lock()?;
        let mut doc = self.load_document()?;
        Self::remove_legacy_servers(&mut doc);
        Self::servers_table(&mut doc)?.insert(id, Item::Table(server_to_toml_table(server)));
        self.save_document(&doc)
    }

    fn retract(&self, id: &str) -> Result<(), AppError> {
        let _guard = self.write_lock.lock()?;
        if !self.path.exists() {
            return Ok(());
        }
        let mut doc = self.load_document()?;

        let mut changed = false;
        if let Some(servers) = doc.get_mut("mcp_servers").and_then(Item::as_table_like_mut) {
            changed |= servers.remove(id).is_some();
        }
        if let Some(legacy) = doc
            .get_mut("mcp")
            .and_then(Item::as_table_like_mut)
            .and_then(|mcp| mcp.get_mut("servers"))
            .and_then(Item::as_table_like_mut)
        {
            if legacy.remove(id).is_some() {
                log::warn!("从错误的 MCP 格式 [mcp.servers] 中清理了服务器 '{id}'");
                changed = true;
            }
        }

        if changed {
            self.save_document(&doc)?;
        }
        Ok(())
    }

    fn read_servers(&self) -> Result<BTreeMap<String, Value>, AppError> {
        let text = self.read_text()?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let root: toml::Table = toml::from_str(&text).map_err(|e| {
            AppError::McpValidation(format!("解析 {} 失败: {e}", self.path.display()))
        })?;

        let legacy = root
            .get("mcp")
            .and_then(toml::Value::as_table)
            .and_then(|mcp| mcp.get("servers"))
            .and_then(toml::Value::as_table);
        let current = root.get("mcp_servers").and_then(toml::Value::as_table);

        let mut out = BTreeMap::new();
        // [mcp_servers] wins over the legacy location for the same id
        for servers in [legacy, current].into_iter().flatten() {
            for (id, entry) in servers {
                match entry.as_table() {
                    Some(tbl) => {
                        out.insert(id.clone(), toml_table_to_json_server(tbl));
                    }
                    None => log::warn!("跳过非表格式的 Codex MCP 项 '{id}'"),
                }
            }
        }
        Ok(out)
    }

    fn replace_all(&self, servers: &BTreeMap<String, McpServerSpec>) -> Result<(), AppError> {
        let _guard = self.write_lock.lock()?;
        let mut doc = self.load_document()?;
        Self::remove_legacy_servers(&mut doc);

        if servers.is_empty() {
            doc.remove("mcp_servers");
        } else {
            let mut table = Table::new();
            table.set_implicit(true);
            for (id, spec) in servers {
                table.insert(id, Item::Table(server_to_toml_table(spec)));
            }
            doc.insert("mcp_servers", Item::Table(table));
        }
        self.save_document(&doc)
    }
}
