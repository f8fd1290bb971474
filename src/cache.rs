//! Monthly Cache Reconciler
//!
//! Report rows for a `(month, partitions)` key are cached so repeated reports
//! do not re-run accounting queries. A cached entry is in one of three states:
//!
//! - **Absent** - compute fresh rows, store them and return them
//! - **Legacy** - a flat `user -> hours` mapping written before rows carried
//!   identity data; recompute and overwrite it
//! - **Current** - stored report rows; only fill in missing identity fields
//!
//! Payloads are written with an explicit `schema_version` envelope. Untagged
//! row lists from earlier releases are still read as current rows.

use crate::error::{Result, StoreError};
use crate::models::{CacheEntryInfo, PartitionSet, ReportRow};
use crate::period::Period;
use crate::report::ReportBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    pub month: String,
    pub partitions: PartitionSet,
}

impl CacheKey {
    pub fn new(month: impl Into<String>, partitions: PartitionSet) -> Self {
        Self {
            month: month.into(),
            partitions,
        }
    }
}

/// Decoded cache payload
#[derive(Debug, Clone, PartialEq)]
pub enum CachedMonth {
    Rows(Vec<ReportRow>),
    Legacy(BTreeMap<String, f64>),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema_version: u32,
    rows: &'a [ReportRow],
}

#[derive(Deserialize)]
struct Envelope {
    schema_version: u32,
    rows: Vec<ReportRow>,
}

pub fn encode_rows(rows: &[ReportRow]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        rows,
    })?)
}

/// Recognize a stored payload, or `None` when its shape is unknown
pub fn decode_payload(payload: &str) -> Option<CachedMonth> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "Cached payload is not JSON");
            return None;
        }
    };

    match value {
        Value::Object(ref map) if map.contains_key("schema_version") => {
            let envelope: Envelope = serde_json::from_value(value).ok()?;
            if envelope.schema_version > SCHEMA_VERSION {
                debug!(
                    version = envelope.schema_version,
                    "Cached payload written by a newer schema"
                );
                return None;
            }
            Some(CachedMonth::Rows(envelope.rows))
        }
        Value::Object(map) => Some(CachedMonth::Legacy(
            map.into_iter()
                .filter_map(|(user, hours)| hours.as_f64().map(|hours| (user, hours)))
                .collect(),
        )),
        Value::Array(items) => {
            let first_has_kennung = items
                .first()
                .and_then(Value::as_object)
                .is_some_and(|first| first.contains_key("kennung"));
            if !first_has_kennung {
                return None;
            }
            serde_json::from_value(Value::Array(items))
                .ok()
                .map(CachedMonth::Rows)
        }
        _ => None,
    }
}

/// Persistent storage of monthly report rows
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> Result<Option<CachedMonth>, StoreError>;

    /// Replace the entry for `key` wholesale
    fn store(&self, key: &CacheKey, period: &Period, rows: &[ReportRow]) -> Result<(), StoreError>;

    /// Every stored entry, ordered by month
    fn list_months(&self) -> Result<Vec<CacheEntryInfo>, StoreError>;
}

/// Process-local store for embedding callers and tests; nothing is persisted
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<BTreeMap<CacheKey, (Period, String)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload, bypassing the row encoder
    pub fn store_payload(
        &self,
        key: &CacheKey,
        period: &Period,
        payload: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.clone(), (period.clone(), payload.into()));
        Ok(())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CachedMonth>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).and_then(|(_, payload)| decode_payload(payload)))
    }

    fn store(&self, key: &CacheKey, period: &Period, rows: &[ReportRow]) -> Result<(), StoreError> {
        self.store_payload(key, period, encode_rows(rows)?)
    }

    fn list_months(&self) -> Result<Vec<CacheEntryInfo>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .iter()
            .map(|(key, (period, _))| CacheEntryInfo {
                month: key.month.clone(),
                start: period.start.clone(),
                end: period.end.clone().unwrap_or_default(),
                partitions: key.partitions.cache_key(),
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Nothing was cached; rows were computed and stored
    Computed,
    /// A legacy entry was replaced with freshly computed rows
    Recomputed,
    /// Cached rows were reused after identity enrichment
    Reused,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub rows: Vec<ReportRow>,
    pub outcome: CacheOutcome,
}

/// Resolve the rows for one cache key
pub fn reconcile<S, E, C>(
    store: &S,
    key: &CacheKey,
    period: &Period,
    enrich: E,
    compute: C,
) -> Result<Reconciled>
where
    S: CacheStore + ?Sized,
    E: FnOnce(Vec<ReportRow>) -> Vec<ReportRow>,
    C: FnOnce() -> Result<Vec<ReportRow>>,
{
    let cached = match store.load(key) {
        Ok(cached) => cached,
        Err(err) => {
            warn!(month = %key.month, error = %err, "Cache load failed, recomputing");
            None
        }
    };

    let outcome = match cached {
        Some(CachedMonth::Rows(rows)) => {
            debug!(month = %key.month, partitions = %key.partitions, rows = rows.len(), "Reusing cached rows");
            return Ok(Reconciled {
                rows: enrich(rows),
                outcome: CacheOutcome::Reused,
            });
        }
        Some(CachedMonth::Legacy(users)) => {
            info!(month = %key.month, users = users.len(), "Replacing legacy cache entry");
            CacheOutcome::Recomputed
        }
        None => CacheOutcome::Computed,
    };

    let rows = compute()?;
    if let Err(err) = store.store(key, period, &rows) {
        warn!(month = %key.month, error = %err, "Failed to store computed rows");
    }

    Ok(Reconciled { rows, outcome })
}

/// Rows of every active user for `month`, served from the cache when possible
pub fn reconcile_month<S>(
    store: &S,
    builder: &ReportBuilder,
    month: &str,
    partitions: &PartitionSet,
) -> Result<Reconciled>
where
    S: CacheStore + ?Sized,
{
    let period = Period::month(month)?;
    let key = CacheKey::new(period.month_key(), partitions.clone());

    reconcile(
        store,
        &key,
        &period,
        |rows| builder.enrich_rows(rows),
        || builder.create_active_reports(&period, partitions),
    )
}
