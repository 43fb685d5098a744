use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::write_json_file;
use crate::error::AppError;

const SERVERS_KEY: &str = "mcpServers";

/// A JSON settings file whose `mcpServers` object holds the MCP entries.
/// Every other top-level key is preserved on write.
pub(super) struct JsonMcpFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonMcpFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn read_root(&self) -> Result<Value, AppError> {
        if !self.path.exists() {
            return Ok(json!({}));
        }
        let content = fs::read_to_string(&self.path).map_err(|e| AppError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(json!({}));
        }
        let root: Value =
            serde_json::from_str(&content).map_err(|e| AppError::json(&self.path, e))?;
        if !root.is_object() {
            return Err(AppError::Config(format!(
                "{} 根必须是对象",
                self.path.display()
            )));
        }
        Ok(root)
    }

    pub fn read_servers(&self) -> Result<Map<String, Value>, AppError> {
        Ok(self
            .read_root()?
            .get(SERVERS_KEY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default())
    }

    /// Read-modify-write of the `mcpServers` object under the store's lock.
    /// `edit` returns whether it changed anything; unchanged files are not rewritten.
    pub fn update_servers(
        &self,
        edit: impl FnOnce(&mut Map<String, Value>) -> bool,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock()?;

        let mut root = self.read_root()?;
        let obj = root
            .as_object_mut()
            .ok_or_else(|| AppError::Config(format!("{} 根必须是对象", self.path.display())))?;

        let mut servers = obj
            .get(SERVERS_KEY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if !edit(&mut servers) {
            return Ok(());
        }

        obj.insert(SERVERS_KEY.into(), Value::Object(servers));
        write_json_file(&self.path, &root)?;
        log::debug!("已写入 MCP 配置: {}", self.path.display());
        Ok(())
    }

    pub fn remove_server(&self, id: &str) -> Result<(), AppError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update_servers(|servers| servers.remove(id).is_some())
    }
}
