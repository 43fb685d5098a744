use std::path::Path;
use std::sync::PoisonError;

use thiserror::Error;

use crate::mcp::{SnippetError, SyncReport, ValidationErrors};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(String),
    #[error("IO 错误: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    IoContext {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON 解析错误: {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON 序列化失败: {source}")]
    JsonSerialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("TOML 解析错误: {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml_edit::TomlError,
    },
    #[error("锁获取失败: {0}")]
    Lock(String),
    #[error("数据库错误: {0}")]
    Database(String),
    #[error("MCP 校验失败: {0}")]
    McpValidation(String),
    #[error("MCP 服务器定义无效: {0}")]
    ValidationFailed(ValidationErrors),
    #[error("配置片段无效: {0}")]
    Snippet(SnippetError),
    #[error("MCP 服务器不存在: {0}")]
    NotFound(String),
    #[error("写入 {app} 配置失败: {message}")]
    LiveWrite { app: String, message: String },
    #[error("部分应用同步失败: {0}")]
    PartialFailure(SyncReport),
    #[error("{zh} ({en})")]
    Localized {
        key: &'static str,
        zh: String,
        en: String,
    },
    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn toml(path: impl AsRef<Path>, source: toml_edit::TomlError) -> Self {
        Self::Toml {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn localized(key: &'static str, zh: impl Into<String>, en: impl Into<String>) -> Self {
        Self::Localized {
            key,
            zh: zh.into(),
            en: en.into(),
        }
    }
}

impl<T> From<PoisonError<T>> for AppError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::ValidationFailed(errors)
    }
}

impl From<SnippetError> for AppError {
    fn from(err: SnippetError) -> Self {
        Self::Snippet(err)
    }
}
