use super::data::{ContentLocator, MediaRow, Partition};
use crate::bucket::BucketId;
use crate::error::{MediaError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

const ROW_COLUMNS: &str =
    "id, bucket_id, bucket_display_name, path, display_name, mime_type, orientation, date_added";

/// Notification that a store partition changed. Carries no detail beyond which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Images,
    Videos,
}

impl From<Partition> for StoreChange {
    fn from(partition: Partition) -> Self {
        match partition {
            Partition::Images => StoreChange::Images,
            Partition::Videos => StoreChange::Videos,
        }
    }
}

/// Per-bucket aggregate used for the initial feed load
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSummary {
    pub bucket_id: BucketId,
    pub display_name: String,
    pub count: usize,
    /// Newest `date_added` in the bucket
    pub latest: i64,
}

/// The authoritative media store.
///
/// Everything the feed shows is derived from here; the feed and the disk
/// cache never win an argument against the store.
pub trait MediaStore: Send + Sync {
    /// All rows of a bucket, newest first
    fn query_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<Vec<MediaRow>>;

    fn query_by_row_id(&self, partition: Partition, id: i64) -> Result<Option<MediaRow>>;

    fn query_by_path(
        &self,
        partition: Partition,
        bucket_id: BucketId,
        path: &str,
    ) -> Result<Option<MediaRow>>;

    fn bucket_summaries(&self, partition: Partition) -> Result<Vec<BucketSummary>>;

    /// Aggregate of one bucket, `None` when it has no rows in `partition`
    fn bucket_summary(
        &self,
        partition: Partition,
        bucket_id: BucketId,
    ) -> Result<Option<BucketSummary>>;

    fn count_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<usize>;

    /// Insert a row (its `id` is ignored). Returns `None` when the path is already known.
    fn insert(&self, row: &MediaRow) -> Result<Option<i64>>;

    /// Persist a new orientation for the item behind `locator`
    fn update_orientation(&self, locator: &str, degrees: i32) -> Result<()>;

    fn delete_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<usize>;

    fn delete_by_locator(&self, locator: &str) -> Result<usize>;

    /// True while a scanner is importing files
    fn is_scanning(&self) -> bool;

    fn set_scanning(&self, scanning: bool);

    /// Subscribe to partition change notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// SQLite-backed media store with one table per partition.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    changes: broadcast::Sender<StoreChange>,
    scanning: AtomicBool,
}

impl SqliteStore {
    /// Open (or create) the store database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("📁 Media store opened at: {}", db_path.display());
        Self::with_connection(conn, Some(db_path.to_path_buf()))
    }

    /// Store living only in memory, handy for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = SqliteStore {
            conn: Mutex::new(conn),
            db_path,
            changes,
            scanning: AtomicBool::new(false),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create both partition tables and their bucket indexes if missing
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        for partition in Partition::ALL {
            let table = partition.table();
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                        path                TEXT NOT NULL UNIQUE,
                        display_name        TEXT NOT NULL,
                        bucket_id           INTEGER NOT NULL,
                        bucket_display_name TEXT NOT NULL,
                        mime_type           TEXT NOT NULL,
                        orientation         INTEGER NOT NULL DEFAULT 0,
                        date_added          INTEGER NOT NULL
                    )"
                ),
                [],
            )?;

            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_bucket_id
                     ON {table}(bucket_id, date_added DESC)"
                ),
                [],
            )?;
        }

        debug!("✅ Media store schema initialized");
        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn notify(&self, partition: Partition) {
        // No subscribers is fine
        let _ = self.changes.send(partition.into());
    }

    fn map_row(partition: Partition) -> impl Fn(&Row<'_>) -> rusqlite::Result<MediaRow> {
        move |row| {
            Ok(MediaRow {
                id: row.get(0)?,
                partition,
                bucket_id: BucketId(row.get(1)?),
                bucket_display_name: row.get(2)?,
                path: row.get(3)?,
                display_name: row.get(4)?,
                mime_type: row.get(5)?,
                orientation: row.get(6)?,
                date_added: row.get(7)?,
            })
        }
    }

    /// Partitions a locator could live in, in lookup order, each with a
    /// `WHERE` clause matching the row key bound as `?1`
    fn partitions_for(locator: &ContentLocator) -> Vec<(Partition, &'static str)> {
        match locator {
            ContentLocator::Content { partition, .. } => vec![(*partition, "id = ?1")],
            ContentLocator::File(_) => Partition::ALL
                .iter()
                .map(|partition| (*partition, "path = ?1"))
                .collect(),
        }
    }
}

impl MediaStore for SqliteStore {
    fn query_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<Vec<MediaRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROW_COLUMNS} FROM {} WHERE bucket_id = ?1 ORDER BY date_added DESC, id DESC",
            partition.table()
        ))?;

        let rows = stmt
            .query_map([bucket_id.0], Self::map_row(partition))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_by_row_id(&self, partition: Partition, id: i64) -> Result<Option<MediaRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM {} WHERE id = ?1", partition.table()),
                [id],
                Self::map_row(partition),
            )
            .optional()?;
        Ok(row)
    }

    fn query_by_path(
        &self,
        partition: Partition,
        bucket_id: BucketId,
        path: &str,
    ) -> Result<Option<MediaRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {ROW_COLUMNS} FROM {} WHERE bucket_id = ?1 AND path = ?2",
                    partition.table()
                ),
                params![bucket_id.0, path],
                Self::map_row(partition),
            )
            .optional()?;
        Ok(row)
    }

    fn bucket_summaries(&self, partition: Partition) -> Result<Vec<BucketSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT bucket_id, MAX(bucket_display_name), COUNT(*), MAX(date_added)
             FROM {} GROUP BY bucket_id ORDER BY MAX(date_added) DESC",
            partition.table()
        ))?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(BucketSummary {
                    bucket_id: BucketId(row.get(0)?),
                    display_name: row.get(1)?,
                    count: row.get::<_, i64>(2)? as usize,
                    latest: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    fn bucket_summary(
        &self,
        partition: Partition,
        bucket_id: BucketId,
    ) -> Result<Option<BucketSummary>> {
        let conn = self.conn.lock();
        let summary = conn
            .query_row(
                &format!(
                    "SELECT bucket_id, MAX(bucket_display_name), COUNT(*), MAX(date_added)
                     FROM {} WHERE bucket_id = ?1 GROUP BY bucket_id",
                    partition.table()
                ),
                [bucket_id.0],
                |row| {
                    Ok(BucketSummary {
                        bucket_id: BucketId(row.get(0)?),
                        display_name: row.get(1)?,
                        count: row.get::<_, i64>(2)? as usize,
                        latest: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    fn count_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE bucket_id = ?1", partition.table()),
            [bucket_id.0],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert(&self, row: &MediaRow) -> Result<Option<i64>> {
        let result = {
            let conn = self.conn.lock();
            conn.execute(
                &format!(
                    "INSERT INTO {} (path, display_name, bucket_id, bucket_display_name,
                                     mime_type, orientation, date_added)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    row.partition.table()
                ),
                params![
                    row.path,
                    row.display_name,
                    row.bucket_id.0,
                    row.bucket_display_name,
                    row.mime_type,
                    row.orientation,
                    row.date_added,
                ],
            )
            .map(|_| conn.last_insert_rowid())
        };

        match result {
            Ok(id) => {
                self.notify(row.partition);
                Ok(Some(id))
            }
            // UNIQUE constraint on path: already imported
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_orientation(&self, locator: &str, degrees: i32) -> Result<()> {
        let parsed = ContentLocator::parse(locator)?;
        let key = match &parsed {
            ContentLocator::Content { id, .. } => rusqlite::types::Value::Integer(*id),
            ContentLocator::File(path) => {
                rusqlite::types::Value::Text(path.to_string_lossy().into_owned())
            }
        };

        for (partition, clause) in Self::partitions_for(&parsed) {
            let changed = self.conn.lock().execute(
                &format!(
                    "UPDATE {} SET orientation = ?2 WHERE {clause}",
                    partition.table()
                ),
                params![key, degrees],
            )?;
            if changed > 0 {
                self.notify(partition);
                return Ok(());
            }
        }

        Err(MediaError::StorePersistence {
            locator: locator.to_string(),
        })
    }

    fn delete_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<usize> {
        let deleted = self.conn.lock().execute(
            &format!("DELETE FROM {} WHERE bucket_id = ?1", partition.table()),
            [bucket_id.0],
        )?;
        if deleted > 0 {
            self.notify(partition);
        }
        info!("🗑️  Deleted {} {} from bucket {}", deleted, partition.table(), bucket_id);
        Ok(deleted)
    }

    fn delete_by_locator(&self, locator: &str) -> Result<usize> {
        let parsed = ContentLocator::parse(locator)?;
        let key = match &parsed {
            ContentLocator::Content { id, .. } => rusqlite::types::Value::Integer(*id),
            ContentLocator::File(path) => {
                rusqlite::types::Value::Text(path.to_string_lossy().into_owned())
            }
        };

        let mut deleted = 0;
        for (partition, clause) in Self::partitions_for(&parsed) {
            let count = self.conn.lock().execute(
                &format!("DELETE FROM {} WHERE {clause}", partition.table()),
                params![key],
            )?;
            if count > 0 {
                self.notify(partition);
            }
            deleted += count;
        }
        Ok(deleted)
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    fn set_scanning(&self, scanning: bool) {
        self.scanning.store(scanning, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("scanning", &self.is_scanning())
            .finish()
    }
}
