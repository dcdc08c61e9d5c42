use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::index::IndexError;
use crate::landmark::{Key, Landmark};

/// Triples per batched lookup statement, bounded by SQLite's bind limit.
const LOOKUP_CHUNK: usize = 200;

/// A stored fingerprint entry, as returned by [`Database::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkRow {
    pub song_id: i64,
    pub f1: f64,
    pub f2: f64,
    pub delta_t: f64,
    pub time_offset: f64,
}

impl LandmarkRow {
    pub fn key(&self) -> Key {
        Key::quantize(self.f1, self.f2, self.delta_t)
    }
}

/// Handle to the SQLite-backed index.
///
/// Opened once and shared for the process lifetime; the pool gives
/// concurrent readers, while each ingestion is a single serialized
/// transaction.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Private in-memory index, used by tests.
    #[cfg(test)]
    pub(crate) async fn open_in_memory() -> Result<Self, IndexError> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A second connection would see its own empty :memory: database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS songs (
                song_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                song_name TEXT NOT NULL,
                file_path TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS landmarks (
                landmark_id INTEGER PRIMARY KEY AUTOINCREMENT,
                song_id     INTEGER NOT NULL REFERENCES songs(song_id),
                f1          REAL NOT NULL,
                f2          REAL NOT NULL,
                delta_t     REAL NOT NULL,
                time_offset REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Point lookups on the hash key are the dominant query-time cost.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_landmarks_key ON landmarks(f1, f2, delta_t)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a song and all of its landmarks in one transaction.
    ///
    /// Either the song row and every entry land together, or nothing does.
    pub async fn ingest(
        &self,
        song_name: &str,
        file_path: &str,
        landmarks: &[Landmark],
    ) -> Result<i64, IndexError> {
        let mut tx = self.pool.begin().await?;

        let song_id = sqlx::query("INSERT INTO songs (song_name, file_path) VALUES (?, ?)")
            .bind(song_name)
            .bind(file_path)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for landmark in landmarks {
            sqlx::query(
                r#"
                INSERT INTO landmarks (song_id, f1, f2, delta_t, time_offset)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(song_id)
            .bind(landmark.f1)
            .bind(landmark.f2)
            .bind(landmark.delta_t)
            .bind(landmark.anchor_t)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(song_id)
    }

    /// Fetch every stored entry whose hash key is in `keys`.
    ///
    /// Runs batched row-value IN lookups against `idx_landmarks_key` rather
    /// than scanning per key.
    pub async fn lookup(&self, keys: &[Key]) -> Result<Vec<LandmarkRow>, IndexError> {
        let mut rows = Vec::new();

        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT song_id, f1, f2, delta_t, time_offset FROM landmarks \
                 WHERE (f1, f2, delta_t) IN ",
            );
            builder.push_tuples(chunk.iter(), |mut b, key| {
                b.push_bind(key.f1_hz())
                    .push_bind(key.f2_hz())
                    .push_bind(key.delta_s());
            });

            for row in builder.build().fetch_all(&self.pool).await? {
                rows.push(LandmarkRow {
                    song_id: row.try_get("song_id")?,
                    f1: row.try_get("f1")?,
                    f2: row.try_get("f2")?,
                    delta_t: row.try_get("delta_t")?,
                    time_offset: row.try_get("time_offset")?,
                });
            }
        }

        Ok(rows)
    }

    pub async fn song_name(&self, song_id: i64) -> Result<Option<String>, IndexError> {
        let row = sqlx::query("SELECT song_name FROM songs WHERE song_id = ?")
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("song_name")?),
            None => None,
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
