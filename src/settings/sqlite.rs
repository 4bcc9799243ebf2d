use super::{Settings, SettingsError, SettingsStore};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed settings row.
///
/// The table holds at most one row (`CHECK (id = 1)`). Every `get` hits the database; blocking
/// calls run on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteSettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettingsStore {
    /// Open (or create) the database file and make sure the row exists.
    ///
    /// `seed` is written only when the row is created; an existing row is left untouched.
    pub fn open(path: impl AsRef<Path>, seed: Settings) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
            && let Err(err) = std::fs::create_dir_all(parent)
        {
            tracing::warn!(dir = %parent.display(), error = %err, "Failed to create settings directory");
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, seed)
    }

    /// Settings row living only for the lifetime of the store (useful for testing).
    pub fn open_in_memory(seed: Settings) -> Result<Self, SettingsError> {
        Self::from_connection(Connection::open_in_memory()?, seed)
    }

    fn from_connection(conn: Connection, seed: Settings) -> Result<Self, SettingsError> {
        initialize_table(&conn, &seed)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, SettingsError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SettingsError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            op(&guard)
        })
        .await?
    }
}

fn initialize_table(conn: &Connection, seed: &Settings) -> Result<(), SettingsError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            rerank_provider TEXT NOT NULL,
            rerank_api_key TEXT NOT NULL,
            gemini_api_key TEXT NOT NULL,
            search_alpha REAL NOT NULL,
            search_top_k INTEGER NOT NULL
        )",
        [],
    )?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO settings
            (id, rerank_provider, rerank_api_key, gemini_api_key, search_alpha, search_top_k)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)",
        params![
            seed.rerank_provider,
            seed.rerank_api_key,
            seed.gemini_api_key,
            seed.search_alpha,
            seed.search_top_k,
        ],
    )?;
    if inserted > 0 {
        tracing::info!(
            has_gemini_key = !seed.gemini_api_key.is_empty(),
            rerank_provider = %seed.rerank_provider,
            "Created settings row"
        );
    }
    Ok(())
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self) -> Result<Settings, SettingsError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT rerank_provider, rerank_api_key, gemini_api_key, search_alpha, search_top_k
                     FROM settings WHERE id = 1",
                    [],
                    |row| {
                        Ok(Settings {
                            rerank_provider: row.get(0)?,
                            rerank_api_key: row.get(1)?,
                            gemini_api_key: row.get(2)?,
                            search_alpha: row.get(3)?,
                            search_top_k: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            row.ok_or(SettingsError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
        .await
    }

    async fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings
                    (id, rerank_provider, rerank_api_key, gemini_api_key, search_alpha, search_top_k)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5)",
                params![
                    settings.rerank_provider,
                    settings.rerank_api_key,
                    settings.gemini_api_key,
                    settings.search_alpha,
                    settings.search_top_k,
                ],
            )?;
            Ok(())
        })
        .await?;
        tracing::info!("Settings updated");
        Ok(())
    }
}
