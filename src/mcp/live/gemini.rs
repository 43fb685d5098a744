use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::app_config::AppType;
use crate::error::AppError;
use crate::mcp::McpServerSpec;

use super::json_file::JsonMcpFile;
use super::McpLiveStore;

/// `~/.gemini/settings.json`.
///
/// Gemini CLI infers the transport from the field names: no `type` key,
/// `httpUrl` for streamable HTTP and `url` for SSE.
pub struct GeminiMcpStore {
    file: JsonMcpFile,
}

impl GeminiMcpStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: JsonMcpFile::new(path),
        }
    }

    pub fn default_location() -> Self {
        Self::new(crate::config::get_gemini_settings_path())
    }
}

fn to_gemini_entry(spec: &McpServerSpec) -> Value {
    let mut value = spec.to_value();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("type");
        if let McpServerSpec::Http(_) = spec {
            if let Some(url) = obj.remove("url") {
                obj.insert("httpUrl".into(), url);
            }
        }
    }
    value
}

fn from_gemini_entry(mut entry: Value) -> Value {
    let Some(obj) = entry.as_object_mut() else {
        return entry;
    };
    if obj.contains_key("type") {
        return entry;
    }
    if let Some(url) = obj.remove("httpUrl") {
        obj.insert("type".into(), json!("http"));
        obj.insert("url".into(), url);
    } else if obj.contains_key("url") {
        obj.insert("type".into(), json!("sse"));
    } else {
        obj.insert("type".into(), json!("stdio"));
    }
    entry
}

impl McpLiveStore for GeminiMcpStore {
    fn app(&self) -> AppType {
        AppType::Gemini
    }

    fn materialize(&self, id: &str, server: &McpServerSpec) -> Result<(), AppError> {
        let entry = to_gemini_entry(server);
        self.file.update_servers(|servers| {
            servers.insert(id.to_string(), entry);
            true
        })
    }

    fn retract(&self, id: &str) -> Result<(), AppError> {
        self.file.remove_server(id)
    }

    fn read_servers(&self) -> Result<BTreeMap<String, Value>, AppError> {
        Ok(self
            .file
            .read_servers()?
            .into_iter()
            .map(|(id, entry)| (id, from_gemini_entry(entry)))
            .collect())
    }

    fn replace_all(&self, servers: &BTreeMap<String, McpServerSpec>) -> Result<(), AppError> {
        self.file.update_servers(|current| {
            current.clear();
            for (id, spec) in servers {
                current.insert(id.clone(), to_gemini_entry(spec));
            }
            true
        })
    }
}
