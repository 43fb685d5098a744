use crate::app_config::AppType;
use crate::error::AppError;
use rusqlite::{params, OptionalExtension};

use crate::database::{lock_conn, Database};

fn snippet_key(app: &AppType) -> String {
    format!("common_config_{}", app.as_str())
}

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, AppError> {
        let conn = lock_conn!(self.conn);
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(|e| AppError::Database(e.to_string()))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), AppError> {
        let conn = lock_conn!(self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<(), AppError> {
        let conn = lock_conn!(self.conn);
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // Config Snippets Helper Methods
    pub fn get_config_snippet(&self, app: &AppType) -> Result<Option<String>, AppError> {
        self.get_setting(&snippet_key(app))
    }

    /// `None` removes the stored snippet
    pub fn set_config_snippet(
        &self,
        app: &AppType,
        snippet: Option<&str>,
    ) -> Result<(), AppError> {
        let key = snippet_key(app);
        match snippet {
            Some(value) => self.set_setting(&key, value),
            None => self.delete_setting(&key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_snippet_is_scoped_per_app() {
        let db = Database::memory().expect("memory db");
        db.set_config_snippet(&AppType::Claude, Some("{}"))
            .expect("write claude snippet");

        assert_eq!(
            db.get_config_snippet(&AppType::Claude).expect("read").as_deref(),
            Some("{}")
        );
        assert!(db.get_config_snippet(&AppType::Codex).expect("read").is_none());

        db.set_config_snippet(&AppType::Claude, None)
            .expect("clear claude snippet");
        assert!(db.get_config_snippet(&AppType::Claude).expect("read").is_none());
    }
}
