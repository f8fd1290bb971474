//! Usage Analysis Engine
//!
//! This module provides the engine that orchestrates every report command. It
//! wires the accounting, identity and group collaborators into a
//! [`ReportBuilder`], serves monthly batches through the cache reconciler and
//! hands results to the display layer and the CSV exporter.
//!
//! ## Command Processing
//!
//! - **user**: one mandatory report for a single user (never cached)
//! - **active**: one row per active user
//! - **group**: active-user rows folded per accounting group
//! - **total**: one row over everyone, minus configured ignored users
//! - **partitions**: one total per partition set
//! - **range**: per-user totals over a span of months
//!
//! Batches for a whole month go through the monthly cache unless caching is
//! disabled; batches for arbitrary date ranges are always computed.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use usage_report::analyzer::{PeriodSelection, ReportCommand, ReportOptions, UsageAnalyzer};
//! use usage_report::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let analyzer = UsageAnalyzer::from_config(&Config::default(), None, false)?;
//! let options = ReportOptions {
//!     period: PeriodSelection::Month("2025-06".to_string()),
//!     ..ReportOptions::default()
//! };
//! analyzer.run_command(&ReportCommand::Total, &options)?;
//! # Ok(())
//! # }
//! ```

use crate::adapters::{IdGroups, SimApi, SlurmCli};
use crate::aggregate::{aggregate, aggregate_partitions, combine, sum_all, GroupBy};
use crate::cache::{reconcile_month, CacheOutcome, CacheStore};
use crate::config::Config;
use crate::database::SqliteCacheStore;
use crate::display::DisplayManager;
use crate::export::write_rows_csv;
use crate::identity::GroupPolicy;
use crate::models::{AggregatedRow, CacheEntryInfo, Metric, PartitionSet, ReportRow};
use crate::period::{months_between, Period};
use crate::report::ReportBuilder;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How the report period was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodSelection {
    /// A whole `YYYY-MM` month; eligible for the monthly cache
    Month(String),
    /// Explicit dates; an open end means "until now"
    Dates { start: String, end: Option<String> },
}

impl Default for PeriodSelection {
    fn default() -> Self {
        Self::Month(chrono::Local::now().format("%Y-%m").to_string())
    }
}

impl PeriodSelection {
    pub fn period(&self) -> Result<Period> {
        let period = match self {
            Self::Month(month) => Period::month(month)?,
            Self::Dates { start, end } => Period::new(start, end.as_deref())?,
        };
        Ok(period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportCommand {
    User { user_id: String },
    Active,
    Group,
    Total,
    /// One total per set; each entry may hold several comma-joined patterns
    Partitions { sets: Vec<PartitionSet> },
    Range { from: String, to: String, group_by: GroupBy },
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub period: PeriodSelection,
    pub partitions: PartitionSet,
    pub csv: Option<PathBuf>,
    pub json_output: bool,
    pub metric: Metric,
}

/// The result of one command, before it is displayed or exported
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Rows(Vec<ReportRow>),
    Aggregates { group_by: GroupBy, rows: Vec<AggregatedRow> },
    Partitions(Vec<AggregatedRow>),
    Total(AggregatedRow),
}

impl Report {
    /// Rows in the persisted schema, for CSV export
    pub fn csv_rows(&self) -> Vec<ReportRow> {
        match self {
            Report::Rows(rows) => rows.clone(),
            Report::Aggregates { group_by, rows } => {
                rows.iter().map(|row| row.to_report_row(*group_by)).collect()
            }
            Report::Partitions(rows) => rows
                .iter()
                .map(|row| row.to_report_row(GroupBy::User))
                .collect(),
            Report::Total(total) => vec![total.to_report_row(GroupBy::User)],
        }
    }
}

pub struct UsageAnalyzer {
    builder: ReportBuilder,
    cache: Option<Box<dyn CacheStore>>,
    display: DisplayManager,
    ignore_users: Vec<String>,
    output_directory: Option<PathBuf>,
}

impl UsageAnalyzer {
    pub fn new(
        builder: ReportBuilder,
        cache: Option<Box<dyn CacheStore>>,
        display: DisplayManager,
        ignore_users: Vec<String>,
    ) -> Self {
        Self {
            builder,
            cache,
            display,
            ignore_users,
            output_directory: None,
        }
    }

    /// Resolve relative CSV paths against `dir`
    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    /// Where a CSV export for `path` is written
    pub fn csv_path(&self, path: &Path) -> PathBuf {
        match &self.output_directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Wire the production collaborators described by `config`
    pub fn from_config(config: &Config, database: Option<&Path>, no_cache: bool) -> Result<Self> {
        let builder = ReportBuilder::new(
            Box::new(SlurmCli::new(
                &config.accounting.sacct_command,
                &config.accounting.sreport_command,
            )),
            Box::new(SimApi::new(
                &config.identity.api_base_url,
                &config.identity.api_host,
                &config.paths.netrc_file,
            )),
            Box::new(IdGroups::new(&config.accounting.id_command)),
            GroupPolicy::new(&config.identity.group_suffix),
        )
        .with_timestamp_format(&config.output.timestamp_format);

        let cache: Option<Box<dyn CacheStore>> = if no_cache {
            None
        } else {
            let path = database.unwrap_or(config.paths.database.as_path());
            let store = SqliteCacheStore::open(path)
                .with_context(|| format!("Failed to open cache database: {}", path.display()))?;
            Some(Box::new(store))
        };

        Ok(Self::new(
            builder,
            cache,
            DisplayManager::new(config.output.json_pretty),
            config.report.ignore_users.clone(),
        )
        .with_output_directory(&config.paths.output_directory))
    }

    /// Active-user rows for one period, served from the cache for whole months
    pub fn batch_rows(&self, selection: &PeriodSelection, partitions: &PartitionSet) -> Result<Vec<ReportRow>> {
        if let (PeriodSelection::Month(month), Some(cache)) = (selection, &self.cache) {
            let reconciled = reconcile_month(cache.as_ref(), &self.builder, month, partitions)?;
            match reconciled.outcome {
                CacheOutcome::Reused => debug!(month = %month, "Served month from cache"),
                outcome => info!(month = %month, outcome = ?outcome, rows = reconciled.rows.len(), "Computed month"),
            }
            return Ok(reconciled.rows);
        }

        let period = selection.period()?;
        Ok(self.builder.create_active_reports(&period, partitions)?)
    }

    pub fn compute(&self, command: &ReportCommand, options: &ReportOptions) -> Result<Report> {
        let span = crate::span_with_context!(tracing::Level::INFO, "report", command = ?command);
        let _enter = span.enter();

        let report = match command {
            ReportCommand::User { user_id } => {
                let period = options.period.period()?;
                let row = self
                    .builder
                    .create_report(user_id, &period, &options.partitions)
                    .with_context(|| format!("Failed to build report for {user_id}"))?;
                Report::Rows(vec![row])
            }
            ReportCommand::Active => {
                Report::Rows(self.batch_rows(&options.period, &options.partitions)?)
            }
            ReportCommand::Group => {
                let rows = self.batch_rows(&options.period, &options.partitions)?;
                Report::Aggregates {
                    group_by: GroupBy::Group,
                    rows: aggregate(&rows, GroupBy::Group, &options.partitions),
                }
            }
            ReportCommand::Total => {
                let rows = self.batch_rows(&options.period, &options.partitions)?;
                Report::Total(sum_all(&rows, &self.ignore_users, &options.partitions))
            }
            ReportCommand::Partitions { sets } => {
                let mut groups = Vec::with_capacity(sets.len());
                for set in sets {
                    groups.push((set.clone(), self.batch_rows(&options.period, set)?));
                }
                Report::Partitions(aggregate_partitions(&groups, &self.ignore_users))
            }
            ReportCommand::Range { from, to, group_by } => {
                let mut runs = Vec::new();
                for month in months_between(from, to)? {
                    let rows = self.batch_rows(&PeriodSelection::Month(month), &options.partitions)?;
                    runs.push(aggregate(&rows, *group_by, &options.partitions));
                }
                Report::Aggregates {
                    group_by: *group_by,
                    rows: combine(runs),
                }
            }
        };

        Ok(report)
    }

    pub fn run_command(&self, command: &ReportCommand, options: &ReportOptions) -> Result<()> {
        let report = self.compute(command, options)?;

        if let Some(path) = &options.csv {
            let path = self.csv_path(path);
            let partitions = (!options.partitions.is_empty()).then_some(&options.partitions);
            let written = write_rows_csv(&path, &report.csv_rows(), partitions)
                .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
            info!(path = %path.display(), rows = written, "Exported report");
        }

        let json = options.json_output;
        match &report {
            Report::Rows(rows) => {
                if rows.is_empty() {
                    warn!("No usage rows for the requested period");
                }
                self.display.display_rows("Cluster Usage Report - Users", rows, options.metric, json)
            }
            Report::Aggregates { group_by, rows } => {
                let (title, label) = match group_by {
                    GroupBy::Group => ("Cluster Usage Report - Groups", "groups"),
                    GroupBy::User => ("Cluster Usage Report - Users", "users"),
                };
                self.display.display_aggregates(title, label, rows, options.metric, json)
            }
            Report::Partitions(rows) => self.display.display_aggregates(
                "Cluster Usage Report - Partitions",
                "partition sets",
                rows,
                options.metric,
                json,
            ),
            Report::Total(total) => self.display.display_total(total, json),
        }

        Ok(())
    }

    pub fn list_cache(&self) -> Result<Vec<CacheEntryInfo>> {
        match &self.cache {
            Some(cache) => Ok(cache.list_months()?),
            None => Ok(Vec::new()),
        }
    }

    pub fn display(&self) -> &DisplayManager {
        &self.display
    }
}
