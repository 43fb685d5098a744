// ============================================================================
// MCP Module - Unified MCP Server Definitions
// ============================================================================

pub mod live;
mod spec;
pub mod toml_convert;
mod validation;

pub use live::{
    AppSyncFailure, ClaudeMcpStore, CodexMcpStore, GeminiMcpStore, LiveStores, McpLiveStore,
    SyncReport,
};
pub use spec::{McpServerSpec, RemoteServer, StdioServer};
pub use validation::{
    validate_json_snippet, validate_server_definition, validate_server_spec,
    validate_toml_snippet, FieldError, SnippetError, ValidationErrors,
};
