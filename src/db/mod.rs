mod schema;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(url: &str) -> anyhow::Result<Self> {
        if url != ":memory:" {
            if let Some(parent) = Path::new(url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(url)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn.lock();
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Raw JSON stored under `name`, if any.
    pub fn get_config_raw(&self, name: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock();
        let data = conn
            .query_row(
                "SELECT data FROM cog_config WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    pub fn get_config<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.get_config_raw(name)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces the document stored under `name`.
    pub fn upsert_config<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        let data = serde_json::to_string(value)?;
        debug!("Database: Saving config '{}' ({} bytes)", name, data.len());
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cog_config (name, data, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(name) DO UPDATE SET data = ?2, updated_at = CURRENT_TIMESTAMP",
            (name, data),
        )?;
        Ok(())
    }

    pub fn list_configs(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM cog_config ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Runs blocking database work off the async runtime.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        enabled: bool,
        channel: Option<u64>,
    }

    fn db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_missing_config_is_none() {
        let db = db();
        assert_eq!(db.get_config::<Sample>("school").unwrap(), None);
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let db = db();
        db.upsert_config("school", &Sample { enabled: true, channel: Some(5) })
            .unwrap();
        db.upsert_config("school", &Sample { enabled: false, channel: None })
            .unwrap();

        assert_eq!(
            db.get_config::<Sample>("school").unwrap(),
            Some(Sample { enabled: false, channel: None })
        );
        assert_eq!(db.list_configs().unwrap(), vec!["school".to_string()]);
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = db();
        db.upsert_config("a", &1).unwrap();
        db.execute_init().unwrap();
        assert_eq!(db.get_config::<i32>("a").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = db();
        db.run_blocking(|db| db.upsert_config("fun", &vec!["cat", "dog"]))
            .await
            .unwrap();
        let loaded = db
            .run_blocking(|db| db.get_config::<Vec<String>>("fun"))
            .await
            .unwrap();
        assert_eq!(loaded, Some(vec!["cat".to_string(), "dog".to_string()]));
    }
}
