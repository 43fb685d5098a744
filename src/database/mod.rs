use crate::error::AppError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

pub mod dao;
mod schema;

/// Safe Mutex lock helper - used across the database module
macro_rules! lock_conn {
    ($mutex:expr) => {
        $mutex
            .lock()
            .map_err(|e| AppError::Database(format!("Mutex lock failed: {}", e)))?
    };
}

pub(crate) use lock_conn;

/// Persistent MCP registry and key/value settings
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the default database under the app config dir
    pub fn init() -> Result<Self, AppError> {
        Self::open(&crate::config::get_app_db_path())
    }

    /// Open (or create) a database file and bring its schema up to date
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| AppError::Database(e.to_string()))?;
        log::debug!("打开数据库: {}", db_path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        db.apply_schema_migrations()?;

        Ok(db)
    }

    /// Create in-memory database (for testing)
    pub fn memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory().map_err(|e| AppError::Database(e.to_string()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        db.apply_schema_migrations()?;

        Ok(db)
    }

    /// Wrap an existing connection, e.g. one opened on a legacy database
    pub fn from_connection(conn: Connection) -> Result<Self, AppError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        db.apply_schema_migrations()?;
        Ok(db)
    }
}
