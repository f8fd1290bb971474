//! SQLite-backed monthly cache.
//!
//! One row per `(month, partitions)` pair in the `monthly_usage` table. The
//! `partitions` column holds the sorted, comma-joined pattern set (empty when
//! unfiltered) and `data` holds the JSON payload written by
//! [`encode_rows`](crate::cache::encode_rows).

use crate::cache::{decode_payload, encode_rows, CacheKey, CacheStore, CachedMonth};
use crate::error::StoreError;
use crate::models::{CacheEntryInfo, ReportRow};
use crate::period::Period;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS monthly_usage (
    month TEXT NOT NULL,
    start TEXT NOT NULL,
    end TEXT NOT NULL,
    partitions TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (month, partitions)
)
"#;

pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (creating parent directories and the table as needed)
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(path = %path.display(), "Opened cache database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Store a raw payload, bypassing the row encoder
    pub fn store_payload(
        &self,
        key: &CacheKey,
        period: &Period,
        payload: &str,
    ) -> Result<(), StoreError> {
        self.conn()?.execute(
            "REPLACE INTO monthly_usage (month, start, end, partitions, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.month,
                period.start,
                period.end.as_deref().unwrap_or(""),
                key.partitions.cache_key(),
                payload,
            ],
        )?;
        Ok(())
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CachedMonth>, StoreError> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM monthly_usage WHERE month = ?1 AND partitions = ?2",
                params![key.month, key.partitions.cache_key()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(payload.as_deref().and_then(decode_payload))
    }

    fn store(&self, key: &CacheKey, period: &Period, rows: &[ReportRow]) -> Result<(), StoreError> {
        let payload = encode_rows(rows)?;
        self.store_payload(key, period, &payload)?;
        debug!(month = %key.month, partitions = %key.partitions, rows = rows.len(), "Stored monthly rows");
        Ok(())
    }

    fn list_months(&self) -> Result<Vec<CacheEntryInfo>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT month, start, end, partitions FROM monthly_usage ORDER BY month, partitions",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(CacheEntryInfo {
                    month: row.get(0)?,
                    start: row.get(1)?,
                    end: row.get(2)?,
                    partitions: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PartitionSet, UsageTotals};

    #[test]
    fn test_store_and_load_month() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let period = Period::month("2025-06").unwrap();
        let key = CacheKey::new("2025-06", PartitionSet::new(["gpu"]));
        let rows = vec![ReportRow::for_user("u1", UsageTotals::new(1.0, 0.0, 2.0))];

        store.store(&key, &period, &rows).unwrap();
        assert_eq!(store.load(&key).unwrap(), Some(CachedMonth::Rows(rows.clone())));

        let other = CacheKey::new("2025-06", PartitionSet::new(["cpu"]));
        assert_eq!(store.load(&other).unwrap(), None);

        // replace, not merge
        store.store(&key, &period, &[]).unwrap();
        assert_eq!(store.load(&key).unwrap(), Some(CachedMonth::Rows(vec![])));
        assert_eq!(store.list_months().unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_payload_is_recognized() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let period = Period::month("2024-12").unwrap();
        let key = CacheKey::new("2024-12", PartitionSet::default());
        store.store_payload(&key, &period, r#"{"u1": 12.5}"#).unwrap();

        assert!(matches!(store.load(&key).unwrap(), Some(CachedMonth::Legacy(_))));
    }

    #[test]
    fn test_list_months_ordered() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        for month in ["2025-03", "2025-01", "2025-02"] {
            let period = Period::month(month).unwrap();
            store
                .store(&CacheKey::new(month, PartitionSet::default()), &period, &[])
                .unwrap();
        }

        let months: Vec<_> = store
            .list_months()
            .unwrap()
            .into_iter()
            .map(|entry| entry.month)
            .collect();
        assert_eq!(months, vec!["2025-01", "2025-02", "2025-03"]);
    }
}
