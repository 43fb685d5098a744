use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::app_config::ServerDefinition;

use super::spec::{McpServerSpec, RemoteServer, StdioServer};
use super::toml_convert::toml_table_to_json_server;

const STDIO_CORE_FIELDS: [&str; 5] = ["type", "command", "args", "env", "cwd"];
const REMOTE_CORE_FIELDS: [&str; 3] = ["type", "url", "headers"];

/// 单个字段的校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "camelCase")]
pub enum FieldError {
    #[error("id 不能为空")]
    InvalidId,
    #[error("{field} 必须为 JSON 对象")]
    NotAnObject { field: String },
    #[error("{kind} 类型的 MCP 服务器 {field} 无效: {reason}")]
    InvalidConnection {
        kind: String,
        field: String,
        reason: String,
    },
    #[error("{field} 不是有效的 URL: '{value}'")]
    InvalidUrl { field: String, value: String },
    #[error("{field} 必须为{expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },
}

/// Every field error found in one candidate, in discovery order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, predicate: impl Fn(&FieldError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// 配置片段校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnippetError {
    #[error("配置片段不能为空")]
    EmptyInput,
    #[error("语法错误: {0}")]
    SyntaxError(String),
    #[error("结构错误: {0}")]
    ShapeError(String),
    #[error("{0}")]
    Invalid(ValidationErrors),
}

fn join_field(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn is_valid_url(raw: &str) -> bool {
    url::Url::parse(raw.trim())
        .map(|u| !u.cannot_be_a_base())
        .unwrap_or(false)
}

/// Optional string; `null` counts as absent and blank text normalises to `None`
fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    field: String,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(_) => {
            errors.push(FieldError::InvalidType {
                field,
                expected: "字符串",
            });
            None
        }
    }
}

fn string_array(
    obj: &Map<String, Value>,
    key: &str,
    field: String,
    errors: &mut Vec<FieldError>,
) -> Vec<String> {
    match obj.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => {
            errors.push(FieldError::InvalidType {
                field,
                expected: "字符串数组",
            });
            Vec::new()
        }
    }
}

fn string_map(
    obj: &Map<String, Value>,
    key: &str,
    field: String,
    errors: &mut Vec<FieldError>,
) -> BTreeMap<String, String> {
    match obj.get(key) {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) if map.values().all(Value::is_string) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        Some(_) => {
            errors.push(FieldError::InvalidType {
                field,
                expected: "字符串键值对象",
            });
            BTreeMap::new()
        }
    }
}

fn extra_fields(obj: &Map<String, Value>, core: &[&str]) -> Map<String, Value> {
    obj.iter()
        .filter(|(k, _)| !core.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Parse one connection object, pushing every problem found into `errors`.
/// `prefix` is the path of the connection inside its container ("server" for
/// definitions, empty for bare snippets).
fn parse_connection(
    value: &Value,
    prefix: &str,
    errors: &mut Vec<FieldError>,
) -> Option<McpServerSpec> {
    let Some(obj) = value.as_object() else {
        errors.push(FieldError::NotAnObject {
            field: if prefix.is_empty() {
                "server".to_string()
            } else {
                prefix.to_string()
            },
        });
        return None;
    };

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_ascii_lowercase());

    let start = errors.len();
    let spec = match kind.as_deref() {
        Some("http") | Some("sse") => {
            let kind = kind.as_deref().unwrap_or("http");
            let url = match obj.get("url") {
                Some(Value::String(s)) if is_valid_url(s) => Some(s.trim().to_string()),
                Some(Value::String(s)) if s.trim().is_empty() => {
                    errors.push(FieldError::InvalidConnection {
                        kind: kind.to_string(),
                        field: join_field(prefix, "url"),
                        reason: "缺少 url".into(),
                    });
                    None
                }
                Some(Value::String(s)) => {
                    errors.push(FieldError::InvalidConnection {
                        kind: kind.to_string(),
                        field: join_field(prefix, "url"),
                        reason: format!("'{s}' 不是有效的 URL"),
                    });
                    None
                }
                None | Some(Value::Null) => {
                    errors.push(FieldError::InvalidConnection {
                        kind: kind.to_string(),
                        field: join_field(prefix, "url"),
                        reason: "缺少 url".into(),
                    });
                    None
                }
                Some(_) => {
                    errors.push(FieldError::InvalidConnection {
                        kind: kind.to_string(),
                        field: join_field(prefix, "url"),
                        reason: "url 必须为字符串".into(),
                    });
                    None
                }
            };
            let headers = string_map(obj, "headers", join_field(prefix, "headers"), errors);

            url.map(|url| {
                let remote = RemoteServer {
                    url,
                    headers,
                    extra: extra_fields(obj, &REMOTE_CORE_FIELDS),
                };
                if kind == "sse" {
                    McpServerSpec::Sse(remote)
                } else {
                    McpServerSpec::Http(remote)
                }
            })
        }
        other => {
            if let Some(unknown) = other.filter(|t| *t != "stdio") {
                log::debug!("未知的 MCP 连接类型 '{unknown}'，按 stdio 处理");
            }
            let command = match obj.get("command") {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::String(_)) | None | Some(Value::Null) => {
                    errors.push(FieldError::InvalidConnection {
                        kind: "stdio".into(),
                        field: join_field(prefix, "command"),
                        reason: "缺少 command".into(),
                    });
                    None
                }
                Some(_) => {
                    errors.push(FieldError::InvalidConnection {
                        kind: "stdio".into(),
                        field: join_field(prefix, "command"),
                        reason: "command 必须为字符串".into(),
                    });
                    None
                }
            };
            let args = string_array(obj, "args", join_field(prefix, "args"), errors);
            let env = string_map(obj, "env", join_field(prefix, "env"), errors);
            let cwd = optional_string(obj, "cwd", join_field(prefix, "cwd"), errors);

            command.map(|command| {
                McpServerSpec::Stdio(StdioServer {
                    command,
                    args,
                    env,
                    cwd,
                    extra: extra_fields(obj, &STDIO_CORE_FIELDS),
                })
            })
        }
    };

    if errors.len() > start {
        None
    } else {
        spec
    }
}

/// Validate a bare connection object (`{"type": ..., "command"/"url": ...}`)
pub fn validate_server_spec(value: &Value) -> Result<McpServerSpec, ValidationErrors> {
    let mut errors = Vec::new();
    match parse_connection(value, "", &mut errors) {
        Some(spec) if errors.is_empty() => Ok(spec),
        _ => Err(ValidationErrors(errors)),
    }
}

/// Validate a full server definition and return its normalised form.
///
/// The connection is read from `server`, or from `connection` when `server`
/// is absent. All problems are reported together.
pub fn validate_server_definition(candidate: &Value) -> Result<ServerDefinition, ValidationErrors> {
    let Some(obj) = candidate.as_object() else {
        return Err(ValidationErrors(vec![FieldError::NotAnObject {
            field: "definition".into(),
        }]));
    };

    let mut errors = Vec::new();

    let id = match obj.get("id").and_then(Value::as_str).map(str::trim) {
        Some(id) if !id.is_empty() => Some(id.to_string()),
        _ => {
            errors.push(FieldError::InvalidId);
            None
        }
    };

    let (conn_key, conn_value) = match (obj.get("server"), obj.get("connection")) {
        (Some(v), _) => ("server", Some(v)),
        (None, Some(v)) => ("connection", Some(v)),
        (None, None) => ("server", None),
    };
    let server = match conn_value {
        Some(v) => parse_connection(v, conn_key, &mut errors),
        None => {
            errors.push(FieldError::NotAnObject {
                field: "server".into(),
            });
            None
        }
    };

    let name = optional_string(obj, "name", "name".into(), &mut errors);
    let description = optional_string(obj, "description", "description".into(), &mut errors);

    // Present means checked: a blank link is an invalid URL, not an absent one
    let url_field = |key: &str, errors: &mut Vec<FieldError>| match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) if is_valid_url(raw) => Some(raw.trim().to_string()),
        Some(Value::String(raw)) => {
            errors.push(FieldError::InvalidUrl {
                field: key.to_string(),
                value: raw.clone(),
            });
            None
        }
        Some(_) => {
            errors.push(FieldError::InvalidType {
                field: key.to_string(),
                expected: "字符串",
            });
            None
        }
    };
    let homepage = url_field("homepage", &mut errors);
    let docs = url_field("docs", &mut errors);

    let tags = string_array(obj, "tags", "tags".into(), &mut errors)
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let enabled = match obj.get("enabled") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            errors.push(FieldError::InvalidType {
                field: "enabled".into(),
                expected: "布尔值",
            });
            None
        }
    };

    match (id, server) {
        (Some(id), Some(server)) if errors.is_empty() => Ok(ServerDefinition {
            id,
            name,
            server,
            description,
            homepage,
            docs,
            tags,
            enabled,
        }),
        _ => Err(ValidationErrors(errors)),
    }
}

/// Raw JSON snippet for Claude/Gemini: must be a non-empty JSON object
pub fn validate_json_snippet(text: &str) -> Result<Map<String, Value>, SnippetError> {
    if text.trim().is_empty() {
        return Err(SnippetError::EmptyInput);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| SnippetError::SyntaxError(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SnippetError::ShapeError("配置片段必须是 JSON 对象".into())),
    }
}

/// Raw TOML snippet for Codex. Blank text means "no override" (`Ok(None)`).
///
/// The document is either a bare connection table or a wrapper holding
/// exactly one entry under `[mcp_servers.<id>]` / `[mcp.servers.<id>]`.
pub fn validate_toml_snippet(text: &str) -> Result<Option<McpServerSpec>, SnippetError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let root: toml::Table =
        toml::from_str(text).map_err(|e| SnippetError::SyntaxError(e.to_string()))?;

    let entry = unwrap_single_entry(&root)?;
    let json = toml_table_to_json_server(entry);
    validate_server_spec(&json)
        .map(Some)
        .map_err(SnippetError::Invalid)
}

fn unwrap_single_entry(root: &toml::Table) -> Result<&toml::Table, SnippetError> {
    let wrapper = root.get("mcp_servers").and_then(toml::Value::as_table).or_else(|| {
        root.get("mcp")
            .and_then(toml::Value::as_table)
            .and_then(|mcp| mcp.get("servers"))
            .and_then(toml::Value::as_table)
    });

    let Some(servers) = wrapper else {
        return Ok(root);
    };
    let mut entries = servers.values();
    match (entries.next(), entries.next()) {
        (Some(toml::Value::Table(entry)), None) => Ok(entry),
        (Some(_), None) => Err(SnippetError::ShapeError(
            "MCP 服务器条目必须为 TOML 表".into(),
        )),
        _ => Err(SnippetError::ShapeError(
            "配置片段必须恰好包含一个 MCP 服务器".into(),
        )),
    }
}

impl TryFrom<Value> for McpServerSpec {
    type Error = ValidationErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate_server_spec(&value)
    }
}

impl TryFrom<Value> for ServerDefinition {
    type Error = ValidationErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate_server_definition(&value)
    }
}
