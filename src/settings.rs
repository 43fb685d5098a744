use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

use crate::config::write_json_file;
use crate::error::AppError;

/// 应用设置结构，允许覆盖各客户端的默认配置目录
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_config_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codex_config_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_config_dir: Option<String>,
}

impl AppSettings {
    fn settings_path() -> PathBuf {
        crate::config::get_app_config_dir().join("settings.json")
    }

    fn normalize_paths(&mut self) {
        for dir in [
            &mut self.claude_config_dir,
            &mut self.codex_config_dir,
            &mut self.gemini_config_dir,
        ] {
            *dir = dir
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
    }

    fn load_from_file() -> Self {
        let path = Self::settings_path();
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str::<AppSettings>(&content) {
            Ok(mut settings) => {
                settings.normalize_paths();
                settings
            }
            Err(err) => {
                log::warn!(
                    "解析设置文件失败，将使用默认设置。路径: {}, 错误: {}",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }
}

static SETTINGS_STORE: OnceLock<RwLock<AppSettings>> = OnceLock::new();

fn settings_store() -> &'static RwLock<AppSettings> {
    SETTINGS_STORE.get_or_init(|| RwLock::new(AppSettings::load_from_file()))
}

fn resolve_override_path(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if let Some(stripped) = raw.strip_prefix("~\\") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }

    PathBuf::from(raw)
}

pub fn get_settings() -> Result<AppSettings, AppError> {
    Ok(settings_store().read()?.clone())
}

/// Persist new settings to `settings.json` and replace the in-memory copy
pub fn update_settings(mut new_settings: AppSettings) -> Result<(), AppError> {
    new_settings.normalize_paths();
    write_json_file(&AppSettings::settings_path(), &new_settings)?;

    let mut guard = settings_store().write()?;
    *guard = new_settings;
    Ok(())
}

/// 从磁盘重新加载设置到内存缓存（例如切换了配置目录之后）
pub fn reload_settings() -> Result<(), AppError> {
    let fresh = AppSettings::load_from_file();
    let mut guard = settings_store().write()?;
    *guard = fresh;
    Ok(())
}

pub fn get_claude_override_dir() -> Option<PathBuf> {
    let settings = settings_store().read().ok()?;
    settings
        .claude_config_dir
        .as_deref()
        .map(resolve_override_path)
}

pub fn get_codex_override_dir() -> Option<PathBuf> {
    let settings = settings_store().read().ok()?;
    settings
        .codex_config_dir
        .as_deref()
        .map(resolve_override_path)
}

pub fn get_gemini_override_dir() -> Option<PathBuf> {
    let settings = settings_store().read().ok()?;
    settings
        .gemini_config_dir
        .as_deref()
        .map(resolve_override_path)
}
