use serde_json::{json, Map, Value};
use toml_edit::{Array, InlineTable, Item, Table};

use super::spec::McpServerSpec;

/// JSON value to TOML item for extension fields.
///
/// Scalars, arrays of scalars and shallow string maps convert; `null`,
/// mixed arrays and nested objects are skipped (returns `None`).
pub fn json_value_to_toml_item(value: &Value, field_name: &str) -> Option<Item> {
    match value {
        Value::String(s) => Some(toml_edit::value(s.as_str())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(toml_edit::value(i))
            } else if let Some(f) = n.as_f64() {
                Some(toml_edit::value(f))
            } else {
                log::warn!("跳过字段 '{field_name}': 无法转换的数字类型 {n}");
                None
            }
        }
        Value::Bool(b) => Some(toml_edit::value(*b)),
        Value::Array(items) => {
            let mut arr = Array::default();
            for item in items {
                match item {
                    Value::String(s) => arr.push(s.as_str()),
                    Value::Bool(b) => arr.push(*b),
                    Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                        (Some(i), _) => arr.push(i),
                        (None, Some(f)) => arr.push(f),
                        _ => return None,
                    },
                    _ => {
                        log::warn!("跳过字段 '{field_name}': 不支持的数组类型（嵌套结构）");
                        return None;
                    }
                }
            }
            Some(Item::Value(toml_edit::Value::Array(arr)))
        }
        Value::Object(obj) => {
            let mut inline = InlineTable::new();
            for (k, v) in obj {
                let Some(s) = v.as_str() else {
                    log::warn!("跳过字段 '{field_name}': 对象值包含非字符串类型");
                    return None;
                };
                inline.insert(k, s.into());
            }
            Some(Item::Value(toml_edit::Value::InlineTable(inline)))
        }
        Value::Null => {
            log::debug!("跳过字段 '{field_name}': TOML 不支持 null 值");
            None
        }
    }
}

fn string_table<'a>(entries: impl IntoIterator<Item = (&'a String, &'a String)>) -> Table {
    let mut tbl = Table::new();
    for (k, v) in entries {
        tbl[k.as_str()] = toml_edit::value(v.as_str());
    }
    tbl
}

/// Codex `[mcp_servers.<id>]` table for one connection.
///
/// Remote headers are written as `http_headers`, the key Codex reads.
pub fn server_to_toml_table(spec: &McpServerSpec) -> Table {
    let mut t = Table::new();
    t["type"] = toml_edit::value(spec.kind());

    match spec {
        McpServerSpec::Stdio(s) => {
            t["command"] = toml_edit::value(s.command.as_str());
            if !s.args.is_empty() {
                let mut args = Array::default();
                for a in &s.args {
                    args.push(a.as_str());
                }
                t["args"] = Item::Value(toml_edit::Value::Array(args));
            }
            if let Some(cwd) = &s.cwd {
                t["cwd"] = toml_edit::value(cwd.as_str());
            }
            if !s.env.is_empty() {
                t["env"] = Item::Table(string_table(&s.env));
            }
        }
        McpServerSpec::Http(r) | McpServerSpec::Sse(r) => {
            t["url"] = toml_edit::value(r.url.as_str());
            if !r.headers.is_empty() {
                t["http_headers"] = Item::Table(string_table(&r.headers));
            }
        }
    }

    for (key, value) in spec.extra() {
        if t.contains_key(key) {
            continue;
        }
        if let Some(item) = json_value_to_toml_item(value, key) {
            log::debug!("已转换扩展字段 '{key}' = {value:?}");
            t[key.as_str()] = item;
        }
    }

    t
}

fn toml_value_to_json(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => json!(s),
        toml::Value::Integer(i) => json!(i),
        toml::Value::Float(f) => json!(f),
        toml::Value::Boolean(b) => json!(b),
        toml::Value::Datetime(dt) => json!(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(toml_value_to_json).collect()),
        toml::Value::Table(tbl) => Value::Object(
            tbl.iter()
                .map(|(k, v)| (k.clone(), toml_value_to_json(v)))
                .collect(),
        ),
    }
}

/// Codex server table back to the loose JSON connection shape.
///
/// `http_headers` (Codex) wins over a legacy `headers` table.
pub fn toml_table_to_json_server(table: &toml::Table) -> Value {
    let mut obj: Map<String, Value> = table
        .iter()
        .filter(|(k, _)| k.as_str() != "http_headers")
        .map(|(k, v)| (k.clone(), toml_value_to_json(v)))
        .collect();

    if let Some(headers) = table.get("http_headers") {
        obj.insert("headers".into(), toml_value_to_json(headers));
    }

    Value::Object(obj)
}
