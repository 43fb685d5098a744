use crate::app_config::{AppType, SnippetFormat};
use crate::error::AppError;
use crate::mcp::{validate_json_snippet, validate_toml_snippet};
use crate::store::AppState;

/// 各应用的通用配置片段（Claude/Gemini 为 JSON，Codex 为 TOML）
pub struct ConfigSnippetService;

impl ConfigSnippetService {
    pub fn read(state: &AppState, app: AppType) -> Result<Option<String>, AppError> {
        state.db.get_config_snippet(&app)
    }

    /// Validate `text` in the app's format and store it.
    ///
    /// Returns what was stored; a blank Codex snippet clears the override and
    /// returns `None`.
    pub fn write(state: &AppState, app: AppType, text: &str) -> Result<Option<String>, AppError> {
        let stored = match app.snippet_format() {
            SnippetFormat::Json => {
                validate_json_snippet(text)?;
                Some(text.trim().to_string())
            }
            SnippetFormat::Toml => validate_toml_snippet(text)?.map(|_| text.trim().to_string()),
        };

        state.db.set_config_snippet(&app, stored.as_deref())?;
        match &stored {
            Some(_) => log::info!("已保存 {app} 配置片段"),
            None => log::info!("已清除 {app} 配置片段"),
        }
        Ok(stored)
    }
}
