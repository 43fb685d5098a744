mod mcp;
mod settings;
