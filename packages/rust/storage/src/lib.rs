//! libSQL storage layer for news records.
//!
//! The [`Storage`] struct wraps an embedded libSQL database and implements
//! [`NewsRepository`], the persistence interface the pipeline is written
//! against, and [`JobLock`], the lease that keeps runs from overlapping
//! across processes sharing one database file.
//!
//! **Access rules:**
//! - pipeline and `delete`: read-write via [`Storage::open`]
//! - listing commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use enquete_shared::{EnqueteError, MAX_SOURCE_TITLE_CHARS, NewsRecord, NewsUpdate, Result};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;

/// Column list shared by every query that materializes a [`NewsRecord`].
const NEWS_COLUMNS: &str =
    "id, source_title, question_title, source_url, author, fetched_at, external_response";

// ---------------------------------------------------------------------------
// Repository interface
// ---------------------------------------------------------------------------

/// Persistence operations on news records.
///
/// `update` is a partial merge: only the `Some` fields of [`NewsUpdate`] are
/// written, every other column keeps its stored value.
#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Insert a new record; storage assigns `id` and `fetched_at`.
    async fn create(
        &self,
        source_title: &str,
        source_url: Option<&str>,
        author: Option<&str>,
    ) -> Result<NewsRecord>;

    /// Apply `changes` to the stored version of `record` and return the result.
    async fn update(&self, record: &NewsRecord, changes: &NewsUpdate) -> Result<NewsRecord>;

    /// Fetch a record by id.
    async fn get(&self, id: i64) -> Result<Option<NewsRecord>>;

    /// Most recent records first.
    async fn list(&self, limit: u32) -> Result<Vec<NewsRecord>>;

    /// Remove a record.
    async fn delete(&self, record: &NewsRecord) -> Result<()>;
}

/// Exclusive, expiring lease on a named job, shared by every process that
/// opens the same database.
#[async_trait]
pub trait JobLock: Send + Sync {
    /// Take the lease for `owner`. Returns `false` while another owner holds
    /// an unexpired lease.
    async fn try_lock(&self, job: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Give the lease back if `owner` still holds it.
    async fn unlock(&self, job: &str, owner: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    /// Serializes writes so two partial updates never interleave.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EnqueteError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        // Wait for another process's write instead of failing with SQLITE_BUSY.
        conn.query("PRAGMA busy_timeout = 5000", params![])
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EnqueteError::Storage(format!(
                "database {} does not exist yet",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
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
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        EnqueteError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
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
            return Err(EnqueteError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Read back exactly one record from a query that may return it.
    async fn query_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams + Send,
    ) -> Result<Option<NewsRecord>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(EnqueteError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl NewsRepository for Storage {
    async fn create(
        &self,
        source_title: &str,
        source_url: Option<&str>,
        author: Option<&str>,
    ) -> Result<NewsRecord> {
        self.check_writable()?;
        validate_title(source_title)?;

        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO news (source_title, source_url, author, fetched_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING {NEWS_COLUMNS}"
        );
        let record = self
            .query_one(&sql, params![source_title, source_url, author, now.as_str()])
            .await?
            .ok_or_else(|| EnqueteError::Storage("insert returned no row".into()))?;

        tracing::debug!(record_id = record.id, "news record created");
        Ok(record)
    }

    async fn update(&self, record: &NewsRecord, changes: &NewsUpdate) -> Result<NewsRecord> {
        self.check_writable()?;
        if let Some(title) = &changes.source_title {
            validate_title(title)?;
        }

        let _guard = self.write_lock.lock().await;
        let current = self
            .get(record.id)
            .await?
            .ok_or(EnqueteError::NotFound(record.id))?;

        if changes.external_response.is_some()
            && current.question_title.is_none()
            && changes.question_title.is_none()
        {
            return Err(EnqueteError::validation(format!(
                "record {} has no question_title yet; external_response must come after it",
                record.id
            )));
        }

        if changes.is_empty() {
            return Ok(current);
        }

        let sql = format!(
            "UPDATE news SET
               source_title      = COALESCE(?1, source_title),
               source_url        = COALESCE(?2, source_url),
               author            = COALESCE(?3, author),
               question_title    = COALESCE(?4, question_title),
               external_response = COALESCE(?5, external_response)
             WHERE id = ?6
             RETURNING {NEWS_COLUMNS}"
        );
        let updated = self
            .query_one(
                &sql,
                params![
                    changes.source_title.as_deref(),
                    changes.source_url.as_deref(),
                    changes.author.as_deref(),
                    changes.question_title.as_deref(),
                    changes.external_response.as_deref(),
                    record.id,
                ],
            )
            .await?
            .ok_or(EnqueteError::NotFound(record.id))?;

        tracing::debug!(record_id = updated.id, "news record updated");
        Ok(updated)
    }

    async fn get(&self, id: i64) -> Result<Option<NewsRecord>> {
        let sql = format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = ?1");
        self.query_one(&sql, params![id]).await
    }

    async fn list(&self, limit: u32) -> Result<Vec<NewsRecord>> {
        let sql = format!("SELECT {NEWS_COLUMNS} FROM news ORDER BY id DESC LIMIT ?1");
        let rows = self
            .conn
            .query(&sql, params![limit])
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        collect_records(rows).await
    }

    async fn delete(&self, record: &NewsRecord) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let affected = self
            .conn
            .execute("DELETE FROM news WHERE id = ?1", params![record.id])
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(EnqueteError::NotFound(record.id));
        }
        tracing::info!(record_id = record.id, "news record deleted");
        Ok(())
    }
}

/// Titles are required and bounded.
fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(EnqueteError::validation("source_title must not be empty"));
    }
    let len = title.chars().count();
    if len > MAX_SOURCE_TITLE_CHARS {
        return Err(EnqueteError::validation(format!(
            "source_title is {len} chars, limit is {MAX_SOURCE_TITLE_CHARS}"
        )));
    }
    Ok(())
}

/// Convert a database row to a [`NewsRecord`].
#[async_trait]
impl JobLock for Storage {
    async fn try_lock(&self, job: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;

        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        self.conn
            .execute(
                "DELETE FROM job_locks WHERE job = ?1 AND expires_at <= ?2",
                params![job, now],
            )
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO job_locks (job, owner, expires_at) VALUES (?1, ?2, ?3)",
                params![job, owner, expires_at],
            )
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;

        tracing::debug!(job, owner, acquired = inserted == 1, "job lease requested");
        Ok(inserted == 1)
    }

    async fn unlock(&self, job: &str, owner: &str) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "DELETE FROM job_locks WHERE job = ?1 AND owner = ?2",
                params![job, owner],
            )
            .await
            .map_err(|e| EnqueteError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Drain `rows` into records; a failing row step is an error, not the end.
async fn collect_records(mut rows: libsql::Rows) -> Result<Vec<NewsRecord>> {
    let mut results = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| EnqueteError::Storage(e.to_string()))?
    {
        results.push(row_to_record(&row)?);
    }
    Ok(results)
}

fn row_to_record(row: &libsql::Row) -> Result<NewsRecord> {
    Ok(NewsRecord {
        id: row
            .get::<i64>(0)
            .map_err(|e| EnqueteError::Storage(e.to_string()))?,
        source_title: row
            .get::<String>(1)
            .map_err(|e| EnqueteError::Storage(e.to_string()))?,
        question_title: row.get::<String>(2).ok(),
        source_url: row.get::<String>(3).ok(),
        author: row.get::<String>(4).ok(),
        fetched_at: {
            let s: String = row
                .get(5)
                .map_err(|e| EnqueteError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| EnqueteError::Storage(format!("invalid date: {e}")))?
        },
        external_response: row.get::<String>(6).ok(),
    })
}
