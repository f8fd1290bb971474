//! Core Data Models
//!
//! This module defines the primary data structures used throughout the usage
//! accounting pipeline. These models represent the complete data flow from raw
//! accounting rows to aggregated reports.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`JobRecord`] - One `sacct` row for a job or job step
//! 2. **Reduction**: [`UsageTotals`] - CPU, GPU and RAM hours for one user and period
//! 3. **Reports**: [`ReportRow`] - Usage joined with identity and group data
//! 4. **Summaries**: [`AggregatedRow`] - Rows folded per user, group, partition or in total
//!
//! ## Features
//!
//! - **Serde Integration**: Report rows serialize with the persisted column names
//! - **Optional Fields**: `None` marks an identity field that was never filled,
//!   which is different from an empty value returned by a lookup
//! - **Partition Sets**: Sorted, de-duplicated partition patterns with a stable label

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Aggregation key that stands for "every row"
pub const ALL_KEY: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub partition: String,
    pub elapsed: String,
    pub ncpus: String,
    pub alloc_tres: String,
}

impl JobRecord {
    /// Build a record from a header-keyed `sacct --parsable2` row
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Self {
        let get = |key: &str, default: &str| {
            fields
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            job_id: get("JobID", ""),
            partition: get("Partition", ""),
            elapsed: get("Elapsed", "0:0:0"),
            ncpus: get("NCPUS", "0"),
            alloc_tres: get("AllocTRES", ""),
        }
    }

    /// Job steps (`123.batch`, `123.0`) repeat the parent's allocation
    pub fn is_step(&self) -> bool {
        self.job_id.contains('.')
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    #[serde(default)]
    pub cpu_hours: f64,
    #[serde(default)]
    pub gpu_hours: f64,
    #[serde(default)]
    pub ram_gb_hours: f64,
}

impl UsageTotals {
    pub fn new(cpu_hours: f64, gpu_hours: f64, ram_gb_hours: f64) -> Self {
        Self {
            cpu_hours,
            gpu_hours,
            ram_gb_hours,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.cpu_hours == 0.0 && self.gpu_hours == 0.0 && self.ram_gb_hours == 0.0
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu_hours,
            Metric::Gpu => self.gpu_hours,
            Metric::Ram => self.ram_gb_hours,
        }
    }
}

impl Add for UsageTotals {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            cpu_hours: self.cpu_hours + other.cpu_hours,
            gpu_hours: self.gpu_hours + other.gpu_hours,
            ram_gb_hours: self.ram_gb_hours + other.ram_gb_hours,
        }
    }
}

impl AddAssign for UsageTotals {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for UsageTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Usage dimension used for sorting and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Cpu,
    Gpu,
    Ram,
}

impl Metric {
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu_hours",
            Metric::Gpu => "gpu_hours",
            Metric::Ram => "ram_gb_hours",
        }
    }
}

/// One user's usage for one period, joined with identity and group data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub kennung: Option<String>,
    #[serde(default)]
    pub projekt: Option<String>,
    #[serde(default)]
    pub ai_c_group: Option<String>,
    #[serde(flatten)]
    pub usage: UsageTotals,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub period_start: Option<String>,
    #[serde(default)]
    pub period_end: Option<String>,
}

impl ReportRow {
    /// Row carrying only a user id and usage, as produced before enrichment
    pub fn for_user(kennung: impl Into<String>, usage: UsageTotals) -> Self {
        Self {
            kennung: Some(kennung.into()),
            usage,
            ..Self::default()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        present(&self.kennung)
    }

    /// Group names from the `|`-joined `ai_c_group` field, in stored order
    pub fn groups(&self) -> Vec<&str> {
        present(&self.ai_c_group)
            .map(|groups| groups.split('|').filter(|g| !g.is_empty()).collect())
            .unwrap_or_default()
    }

    /// True when first name, last name, email and project are all filled
    pub fn has_core_identity(&self) -> bool {
        [&self.first_name, &self.last_name, &self.email, &self.projekt]
            .into_iter()
            .all(|field| present(field).is_some())
    }
}

/// A value that is set and not blank
pub(crate) fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.trim().is_empty())
}

/// Rows folded under one aggregation key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub key: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub projekt: Option<String>,
    #[serde(flatten)]
    pub usage: UsageTotals,
    pub partition: String,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub rows: usize,
}

/// Sorted, de-duplicated partition patterns used as a filter and cache key
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionSet(BTreeSet<String>);

impl PartitionSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            patterns
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// Parse a stored comma-joined key back into a set
    pub fn from_key(key: &str) -> Self {
        Self::new(key.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-joined patterns; empty when unfiltered
    pub fn cache_key(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }

    /// Comma-joined patterns, or `*` when unfiltered
    pub fn label(&self) -> String {
        if self.is_empty() {
            ALL_KEY.to_string()
        } else {
            self.cache_key()
        }
    }
}

impl fmt::Display for PartitionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One stored cache entry, as listed by a cache store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntryInfo {
    pub month: String,
    pub start: String,
    pub end: String,
    pub partitions: String,
}
