use std::sync::Arc;

use crate::database::Database;
use crate::error::AppError;
use crate::mcp::LiveStores;

/// 全局应用状态
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub live: LiveStores,
}

impl AppState {
    pub fn new(db: Arc<Database>, live: LiveStores) -> Self {
        Self { db, live }
    }

    /// Registry at the default path, file-backed stores at the configured locations
    pub fn init_default() -> Result<Self, AppError> {
        let db = Database::init()?;
        Ok(Self::new(Arc::new(db), LiveStores::from_default_locations()))
    }
}
