pub mod mcp;
pub mod snippet;

pub use mcp::{DeleteOutcome, McpService, UpsertOutcome};
pub use snippet::ConfigSnippetService;
