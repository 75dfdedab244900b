//! Document storage for price records.
//!
//! [`Store`] is the persistence boundary the pipeline writes through: a
//! partial-field merge-upsert keyed by `(collection, id)` whose write
//! timestamp comes from the backend, not the caller.
//!
//! [`LibsqlStore`] implements it on top of libSQL, either a local file or a
//! remote Turso database.
//!
//! **Access rules:**
//! - pipeline runs: read-write via [`LibsqlStore::open`] / [`LibsqlStore::open_remote`]
//! - inspection (`pricebot show`): read-only via [`LibsqlStore::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use pricebot_shared::{PriceBotError, Result};
use serde_json::{Map, Value};

/// How an upsert treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Merge `fields` over the stored body; every other stored key survives.
    Merge,
    /// Overwrite the stored body with `defaults` + `fields`.
    Replace,
}

/// Key written by the backend on every upsert.
pub const LAST_UPDATED_FIELD: &str = "last_updated";

/// Persistence boundary used by the pipeline.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the document if absent, else apply `fields` according to `policy`.
    ///
    /// `defaults` are only written when the document (or that key) does not
    /// exist yet. The backend stamps [`LAST_UPDATED_FIELD`] with its own clock,
    /// never earlier than the previously stored value, and returns it.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
        defaults: &Map<String, Value>,
        policy: MergePolicy,
    ) -> Result<DateTime<Utc>>;

    /// Fetch a document body.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;
}

/// Database-side timestamp, millisecond precision, lexically ordered.
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// libSQL-backed [`Store`].
pub struct LibsqlStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl LibsqlStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PriceBotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PriceBotError::Storage(e.to_string()))?;

        Self::from_database(db, false).await
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PriceBotError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PriceBotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PriceBotError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Connect to a remote libSQL/Turso database.
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| PriceBotError::Storage(format!("{url}: {e}")))?;

        Self::from_database(db, false).await
    }

    async fn from_database(db: Database, readonly: bool) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| PriceBotError::Storage(e.to_string()))?;

        let store = Self { db, conn, readonly };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PriceBotError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PriceBotError::WriteRejected(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// List every document in a collection, ordered by id.
    pub async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id",
                params![collection],
            )
            .await
            .map_err(|e| PriceBotError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| PriceBotError::Storage(e.to_string()))?;
            let body: String = row
                .get(1)
                .map_err(|e| PriceBotError::Storage(e.to_string()))?;
            results.push((id, parse_body(&body)?));
        }
        Ok(results)
    }
}

#[async_trait]
impl Store for LibsqlStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
        defaults: &Map<String, Value>,
        policy: MergePolicy,
    ) -> Result<DateTime<Utc>> {
        self.check_writable()?;

        let fields_json = Value::Object(fields.clone()).to_string();
        let defaults_json = Value::Object(defaults.clone()).to_string();

        // Merge: stored keys win over defaults, fields win over both.
        // Replace: stored body is discarded.
        let updated_body = match policy {
            MergePolicy::Merge => "json_patch(json_patch(?3, documents.body), ?4)",
            MergePolicy::Replace => "json_patch(?3, ?4)",
        };

        let sql = format!(
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?1, ?2, json_set(json_patch(?3, ?4), '$.{LAST_UPDATED_FIELD}', {NOW_SQL}), {NOW_SQL})
             ON CONFLICT(collection, id) DO UPDATE SET
               body = json_set({updated_body}, '$.{LAST_UPDATED_FIELD}',
                               max(documents.updated_at, excluded.updated_at)),
               updated_at = max(documents.updated_at, excluded.updated_at)
             RETURNING updated_at"
        );

        let mut rows = self
            .conn
            .query(
                &sql,
                params![collection, id, defaults_json.as_str(), fields_json.as_str()],
            )
            .await
            .map_err(|e| PriceBotError::Storage(format!("upsert {collection}/{id}: {e}")))?;

        let stamp: String = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| PriceBotError::Storage(e.to_string()))?,
            Ok(None) => {
                return Err(PriceBotError::Storage(format!(
                    "upsert {collection}/{id}: no row returned"
                )));
            }
            Err(e) => return Err(PriceBotError::Storage(e.to_string())),
        };

        tracing::debug!(collection, id, updated_at = %stamp, ?policy, "document upserted");
        parse_timestamp(&stamp)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .await
            .map_err(|e| PriceBotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row
                    .get(0)
                    .map_err(|e| PriceBotError::Storage(e.to_string()))?;
                Ok(Some(parse_body(&body)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(PriceBotError::Storage(e.to_string())),
        }
    }
}

fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| PriceBotError::parse(format!("stored document: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PriceBotError::Storage(format!("invalid date '{s}': {e}")))
}
