use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Connection definition of an MCP server, one variant per transport.
///
/// Serialised as the loose JSON object the assistant apps understand
/// (`{"type": "stdio", "command": ...}`); deserialisation runs the
/// connection validation rules, so an omitted `type` becomes `stdio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum McpServerSpec {
    Stdio(StdioServer),
    Http(RemoteServer),
    Sse(RemoteServer),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StdioServer {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<String>,
    /// Keys outside the core fields (timeouts, retry settings, ...), kept verbatim
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteServer {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub extra: Map<String, Value>,
}

impl McpServerSpec {
    pub fn stdio(command: impl Into<String>) -> Self {
        Self::Stdio(StdioServer {
            command: command.into(),
            ..Default::default()
        })
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::Http(RemoteServer {
            url: url.into(),
            ..Default::default()
        })
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self::Sse(RemoteServer {
            url: url.into(),
            ..Default::default()
        })
    }

    /// The `type` tag as written to config files
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::Http(_) => "http",
            Self::Sse(_) => "sse",
        }
    }

    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            Self::Stdio(s) => &s.extra,
            Self::Http(r) | Self::Sse(r) => &r.extra,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = self.extra().clone();
        obj.insert("type".into(), json!(self.kind()));

        match self {
            Self::Stdio(s) => {
                obj.insert("command".into(), json!(s.command));
                if !s.args.is_empty() {
                    obj.insert("args".into(), json!(s.args));
                }
                if !s.env.is_empty() {
                    obj.insert("env".into(), json!(s.env));
                }
                if let Some(cwd) = &s.cwd {
                    obj.insert("cwd".into(), json!(cwd));
                }
            }
            Self::Http(r) | Self::Sse(r) => {
                obj.insert("url".into(), json!(r.url));
                if !r.headers.is_empty() {
                    obj.insert("headers".into(), json!(r.headers));
                }
            }
        }

        Value::Object(obj)
    }
}

impl From<McpServerSpec> for Value {
    fn from(spec: McpServerSpec) -> Self {
        spec.to_value()
    }
}
