use crate::error::AppError;
use rusqlite::Connection;

use super::{lock_conn, Database};

const SCHEMA_VERSION: i32 = 1;

impl Database {
    pub(super) fn create_tables(&self) -> Result<(), AppError> {
        let conn = lock_conn!(self.conn);
        Self::create_tables_on_conn(&conn)
    }

    pub(crate) fn create_tables_on_conn(conn: &Connection) -> Result<(), AppError> {
        // 1. MCP Servers table: definition + enablement matrix in one row
        conn.execute(
            "CREATE TABLE IF NOT EXISTS mcp_servers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                server_config TEXT NOT NULL,
                description TEXT,
                homepage TEXT,
                docs TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                default_enabled BOOLEAN,
                enabled_claude BOOLEAN NOT NULL DEFAULT 0,
                enabled_codex BOOLEAN NOT NULL DEFAULT 0,
                enabled_gemini BOOLEAN NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| AppError::Database(e.to_string()))?;

        // 2. Settings table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
            [],
        )
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    pub(super) fn apply_schema_migrations(&self) -> Result<(), AppError> {
        let conn = lock_conn!(self.conn);
        Self::apply_schema_migrations_on_conn(&conn)
    }

    pub(crate) fn apply_schema_migrations_on_conn(conn: &Connection) -> Result<(), AppError> {
        conn.execute("SAVEPOINT schema_migration;", [])
            .map_err(|e| AppError::Database(format!("Failed to start migration savepoint: {e}")))?;

        let mut version = Self::get_user_version(conn)?;

        if version > SCHEMA_VERSION {
            conn.execute("ROLLBACK TO schema_migration;", []).ok();
            conn.execute("RELEASE schema_migration;", []).ok();
            return Err(AppError::Database(format!(
                "Database version too new ({version}), only supports {SCHEMA_VERSION}, please upgrade app."
            )));
        }

        let result = (|| {
            while version < SCHEMA_VERSION {
                match version {
                    0 => {
                        // Registries written before the per-app matrix and metadata columns existed
                        log::info!("Detected user_version=0, migrating to 1 (add missing columns)");
                        Self::add_column_if_missing(conn, "mcp_servers", "description", "TEXT")?;
                        Self::add_column_if_missing(conn, "mcp_servers", "homepage", "TEXT")?;
                        Self::add_column_if_missing(conn, "mcp_servers", "docs", "TEXT")?;
                        Self::add_column_if_missing(
                            conn,
                            "mcp_servers",
                            "tags",
                            "TEXT NOT NULL DEFAULT '[]'",
                        )?;
                        Self::add_column_if_missing(
                            conn,
                            "mcp_servers",
                            "default_enabled",
                            "BOOLEAN",
                        )?;
                        Self::add_column_if_missing(
                            conn,
                            "mcp_servers",
                            "enabled_claude",
                            "BOOLEAN NOT NULL DEFAULT 0",
                        )?;
                        Self::add_column_if_missing(
                            conn,
                            "mcp_servers",
                            "enabled_codex",
                            "BOOLEAN NOT NULL DEFAULT 0",
                        )?;
                        Self::add_column_if_missing(
                            conn,
                            "mcp_servers",
                            "enabled_gemini",
                            "BOOLEAN NOT NULL DEFAULT 0",
                        )?;

                        Self::set_user_version(conn, SCHEMA_VERSION)?;
                    }
                    _ => {
                        return Err(AppError::Database(format!(
                            "Unknown database version {version}, cannot migrate to {SCHEMA_VERSION}"
                        )));
                    }
                }

                version = Self::get_user_version(conn)?;
            }

            Ok(())
        })();

        match result {
            Ok(_) => {
                conn.execute("RELEASE schema_migration;", []).map_err(|e| {
                    AppError::Database(format!("Failed to commit migration savepoint: {e}"))
                })?;
                Ok(())
            }
            Err(e) => {
                conn.execute("ROLLBACK TO schema_migration;", []).ok();
                conn.execute("RELEASE schema_migration;", []).ok();
                Err(e)
            }
        }
    }
}

// Schema version helpers
impl Database {
    fn get_user_version(conn: &Connection) -> Result<i32, AppError> {
        conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Database(format!("Failed to read user_version: {e}")))
    }

    fn set_user_version(conn: &Connection, version: i32) -> Result<(), AppError> {
        if version < 0 {
            return Err(AppError::Database("user_version cannot be negative".to_string()));
        }
        let sql = format!("PRAGMA user_version = {version};");
        conn.execute(&sql, [])
            .map_err(|e| AppError::Database(format!("Failed to write user_version: {e}")))?;
        Ok(())
    }
}

// Column validation helpers
impl Database {
    fn validate_identifier(s: &str, kind: &str) -> Result<(), AppError> {
        if s.is_empty() {
            return Err(AppError::Database(format!("{kind} cannot be empty")));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Database(format!(
                "Invalid {kind}: {s}, only alphanumeric and underscore allowed"
            )));
        }
        Ok(())
    }

    fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, AppError> {
        Self::validate_identifier(table, "table name")?;
        Self::validate_identifier(column, "column name")?;

        let sql = format!("PRAGMA table_info(\"{table}\");");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Database(format!("Failed to read table structure: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| AppError::Database(format!("Failed to query table structure: {e}")))?;
        while let Some(row) = rows.next().map_err(|e| AppError::Database(e.to_string()))? {
            let name: String = row
                .get(1)
                .map_err(|e| AppError::Database(format!("Failed to read column name: {e}")))?;
            if name.eq_ignore_ascii_case(column) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<bool, AppError> {
        if Self::has_column(conn, table, column)? {
            return Ok(false);
        }

        let sql = format!("ALTER TABLE \"{table}\" ADD COLUMN \"{column}\" {definition};");
        conn.execute(&sql, []).map_err(|e| {
            AppError::Database(format!("Failed to add column {table}.{column}: {e}"))
        })?;
        log::info!("Added missing column {table}.{column}");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_adds_matrix_columns_to_legacy_table() {
        let conn = Connection::open_in_memory().expect("open memory db");
        conn.execute(
            "CREATE TABLE mcp_servers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                server_config TEXT NOT NULL,
                enabled_claude BOOLEAN NOT NULL DEFAULT 0
            )",
            [],
        )
        .expect("create legacy table");

        let db = Database::from_connection(conn).expect("migrate legacy db");
        let conn = db.conn.lock().expect("lock conn");
        for column in ["tags", "default_enabled", "enabled_codex", "enabled_gemini"] {
            assert!(
                Database::has_column(&conn, "mcp_servers", column).expect("inspect columns"),
                "column {column} should exist after migration"
            );
        }
        assert_eq!(Database::get_user_version(&conn).expect("read version"), 1);
    }

    #[test]
    fn validate_identifier_rejects_sql_metacharacters() {
        assert!(Database::validate_identifier("mcp_servers", "table name").is_ok());
        assert!(Database::validate_identifier("x; DROP", "table name").is_err());
        assert!(Database::validate_identifier("", "column name").is_err());
    }
}
