//! Usage Reducer
//!
//! Folds the `sacct` records of one user and period into a single
//! [`UsageTotals`]. Job steps are skipped because they repeat the allocation
//! of their parent job, and records outside the requested partitions are
//! dropped before any unit parsing happens.

use crate::error::FormatError;
use crate::models::{JobRecord, PartitionSet, UsageTotals};
use crate::units::{gpu_count, parse_count, parse_elapsed, parse_memory, parse_resource_spec};
use glob::{MatchOptions, Pattern};
use tracing::trace;

/// Shell-style partition patterns combined with OR; empty matches everything
#[derive(Debug, Clone, Default)]
pub struct PartitionFilter {
    patterns: Vec<Pattern>,
}

impl PartitionFilter {
    pub fn new(partitions: &PartitionSet) -> Result<Self, FormatError> {
        let patterns = partitions
            .iter()
            .map(|pattern| {
                Pattern::new(&collapse_stars(pattern)).map_err(|err| FormatError::Pattern {
                    pattern: pattern.to_string(),
                    reason: err.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn matches(&self, partition: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| pattern.matches_with(partition, options))
    }
}

/// Partition names have no path separators, so `**` means the same as `*`
fn collapse_stars(pattern: &str) -> String {
    let mut collapsed = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && collapsed.ends_with('*') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

/// Usage contributed by a single non-step record
pub fn record_usage(record: &JobRecord) -> Result<UsageTotals, FormatError> {
    let elapsed_hours = parse_elapsed(&record.elapsed)?;
    let cpus = parse_count("NCPUS", &record.ncpus)?;
    let tres = parse_resource_spec(&record.alloc_tres);
    let gpus = gpu_count(&tres)?;
    let mem_gb = parse_memory(tres.get("mem").map(String::as_str).unwrap_or("0"))?;

    Ok(UsageTotals {
        cpu_hours: cpus as f64 * elapsed_hours,
        gpu_hours: gpus as f64 * elapsed_hours,
        ram_gb_hours: mem_gb * elapsed_hours,
    })
}

/// Return aggregated CPU/GPU/RAM hours for the given records
pub fn reduce_usage(
    records: &[JobRecord],
    filter: &PartitionFilter,
) -> Result<UsageTotals, FormatError> {
    let mut totals = UsageTotals::default();

    for record in records {
        if record.is_step() {
            trace!(job_id = %record.job_id, "Skipping job step");
            continue;
        }
        if !filter.matches(&record.partition) {
            trace!(
                job_id = %record.job_id,
                partition = %record.partition,
                "Skipping job outside partition filter"
            );
            continue;
        }

        totals += record_usage(record)?;
    }

    Ok(totals)
}
