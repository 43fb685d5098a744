mod app_config;
pub mod config;
mod database;
mod error;
pub mod mcp;
pub mod query;
mod services;
mod settings;
mod store;

pub use app_config::{AppType, McpApps, McpServer, ServerDefinition, SnippetFormat};
pub use database::Database;
pub use error::AppError;
pub use mcp::{
    validate_json_snippet, validate_server_definition, validate_server_spec,
    validate_toml_snippet, AppSyncFailure, ClaudeMcpStore, CodexMcpStore, FieldError,
    GeminiMcpStore, LiveStores, McpLiveStore, McpServerSpec, RemoteServer, SnippetError,
    StdioServer, SyncReport, ValidationErrors,
};
pub use query::{McpQueryClient, RegistrySnapshot, MCP_SERVERS_KEY};
pub use services::{ConfigSnippetService, DeleteOutcome, McpService, UpsertOutcome};
pub use settings::{get_settings, reload_settings, update_settings, AppSettings};
pub use store::AppState;
