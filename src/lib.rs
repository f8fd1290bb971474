//! Usage Report Library
//!
//! Usage accounting for Slurm-managed HPC clusters. Turns raw `sacct` and
//! `sreport` output into CPU, GPU and RAM hours per user, joins them with
//! identity data from the user directory and group memberships, and summarizes
//! them per user, accounting group, partition set or cluster-wide.
//!
//! ## Core Features
//!
//! - **Unit parsing**: Slurm elapsed times, memory sizes and TRES strings
//! - **Job step handling**: Steps repeat their parent's allocation and are skipped
//! - **Partition filters**: Shell-style patterns combined with OR
//! - **Identity enrichment**: Missing names, emails and projects are filled in
//!   without ever overwriting stored values
//! - **Monthly cache**: SQLite-backed, keyed by month and partition set, with
//!   transparent upgrade of legacy entries
//! - **Flexible output**: Colored terminal tables, JSON and append-only CSV
//!
//! ## Architecture Overview
//!
//! - [`units`] / [`parser`] - Primitive and table parsers for accounting text
//! - [`reducer`] - Folds job records into [`UsageTotals`]
//! - [`identity`] / [`report`] - Identity normalization and report rows
//! - [`aggregate`] - Per-user, per-group, per-partition and total summaries
//! - [`cache`] / [`database`] - The monthly cache reconciler and its SQLite store
//! - [`export`] - CSV export
//! - [`adapters`] - `sacct`/`sreport`, `id` and the user directory API
//! - [`analyzer`] - Command orchestration used by the binary
//! - [`config`] / [`logging`] - Configuration and structured logging
//!
//! ## Main Entry Point
//!
//! ```rust
//! use usage_report::{parse_job_records, reduce_usage, PartitionFilter, PartitionSet};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let text = "JobID|Partition|Elapsed|NCPUS|AllocTRES\n\
//!             123|gpu|01:00:00|4|cpu=4,mem=8000M,gres/gpu=2\n\
//!             123.batch|gpu|01:00:00|4|cpu=4,mem=8000M,gres/gpu=2\n";
//! let filter = PartitionFilter::new(&PartitionSet::new(["gpu*"]))?;
//! let usage = reduce_usage(&parse_job_records(text), &filter)?;
//! assert_eq!(usage.cpu_hours, 4.0);
//! assert_eq!(usage.gpu_hours, 2.0);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod aggregate;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod export;
pub mod identity;
pub mod logging;
pub mod models;
pub mod parser;
pub mod period;
pub mod reducer;
pub mod report;
pub mod units;

pub use aggregate::{aggregate, sum_all, GroupBy};
pub use analyzer::UsageAnalyzer;
pub use cache::{reconcile, CacheKey, CacheOutcome, CacheStore, CachedMonth, MemoryCacheStore};
pub use error::{FormatError, LookupError, ReportError, StoreError};
pub use identity::{GroupPolicy, GroupSource, Identity, IdentitySource};
pub use models::*;
pub use parser::{parse_job_records, parse_login_usage_table};
pub use period::Period;
pub use reducer::{reduce_usage, PartitionFilter};
pub use report::{AccountingSource, ReportBuilder};
