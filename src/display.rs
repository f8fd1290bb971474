//! Output Formatting and Display Management
//!
//! Renders report rows, aggregates and cache listings either as colored
//! terminal tables or as JSON for programmatic consumption.
//!
//! ## Ordering
//!
//! Tables are sorted by the selected [`Metric`] in descending order, ties
//! broken by key, so the heaviest users or groups come first. JSON output keeps
//! the same order.
//!
//! ## JSON Output
//!
//! ```json
//! {
//!   "rows": [
//!     {
//!       "key": "ab12cd",
//!       "cpu_hours": 120.5,
//!       "gpu_hours": 8.0,
//!       "ram_gb_hours": 512.0,
//!       "partition": "*",
//!       "period_start": "2025-06-01",
//!       "period_end": "2025-06-30",
//!       "rows": 1
//!     }
//!   ]
//! }
//! ```

use crate::models::{AggregatedRow, CacheEntryInfo, Metric, ReportRow, UsageTotals};
use colored::Colorize;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayManager {
    json_pretty: bool,
}

impl DisplayManager {
    pub fn new(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    /// Serialize `value` honoring the pretty-print setting
    pub fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let result = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
    }

    fn header(&self, title: &str) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        println!("{}", title.bright_white().bold());
        println!("{}", "=".repeat(80).bright_cyan());
    }

    fn summary(&self, count: usize, noun: &str, totals: &UsageTotals) {
        println!(
            "\n{} {} {} • {} CPU h • {} GPU h • {} RAM GBh\n",
            "📊".bright_yellow(),
            count.to_string().bright_white().bold(),
            noun,
            format_hours(totals.cpu_hours).bright_green().bold(),
            format_hours(totals.gpu_hours).bright_green().bold(),
            format_hours(totals.ram_gb_hours).bright_green().bold(),
        );
    }

    /// Per-user report rows
    pub fn display_rows(&self, title: &str, rows: &[ReportRow], metric: Metric, json_output: bool) {
        let mut sorted: Vec<&ReportRow> = rows.iter().collect();
        sorted.sort_by(|a, b| {
            by_metric(&a.usage, &b.usage, metric)
                .then_with(|| a.user_id().cmp(&b.user_id()))
        });

        if json_output {
            println!("{}", self.to_json(&serde_json::json!({ "rows": sorted })));
            return;
        }

        self.header(title);
        let totals: UsageTotals = rows.iter().map(|row| row.usage).sum();
        self.summary(rows.len(), "users", &totals);

        for row in sorted {
            let name = match (row.first_name.as_deref(), row.last_name.as_deref()) {
                (Some(first), Some(last)) => format!("{first} {last}"),
                (Some(name), None) | (None, Some(name)) => name.to_string(),
                (None, None) => String::new(),
            };
            println!(
                "{} {} {}",
                "👤".bright_blue(),
                row.user_id().unwrap_or("-").bright_white().bold(),
                name.bright_cyan()
            );
            if let Some(email) = row.email.as_deref().filter(|e| !e.is_empty()) {
                println!("   email: {}", email);
            }
            if let Some(projekt) = row.projekt.as_deref().filter(|p| !p.is_empty()) {
                println!("   project: {}", projekt);
            }
            if !row.groups().is_empty() {
                println!("   groups: {}", row.groups().join(", ").bright_yellow());
            }
            println!("   {}", usage_line(&row.usage));
            println!(
                "   period: {} - {}",
                row.period_start.as_deref().unwrap_or("?"),
                row.period_end.as_deref().unwrap_or("now")
            );
            println!();
        }
    }

    /// Aggregated rows keyed by user, group or partition set
    pub fn display_aggregates(
        &self,
        title: &str,
        key_label: &str,
        rows: &[AggregatedRow],
        metric: Metric,
        json_output: bool,
    ) {
        let sorted = sort_aggregates(rows, metric);

        if json_output {
            println!("{}", self.to_json(&serde_json::json!({ "rows": sorted })));
            return;
        }

        self.header(title);
        let totals: UsageTotals = rows.iter().map(|row| row.usage).sum();
        self.summary(rows.len(), key_label, &totals);

        let grand = totals.metric(metric);
        for row in sorted {
            let share = if grand > 0.0 {
                row.usage.metric(metric) / grand * 100.0
            } else {
                0.0
            };
            let key = if row.key.is_empty() { "(none)" } else { row.key.as_str() };
            println!(
                "   {}: {} ({}% of {}, partitions {})",
                key.bright_cyan(),
                usage_line(&row.usage),
                format!("{share:.0}").bright_yellow(),
                metric.column(),
                row.partition
            );
        }
        println!();
    }

    /// A single total row
    pub fn display_total(&self, total: &AggregatedRow, json_output: bool) {
        if json_output {
            println!("{}", self.to_json(total));
            return;
        }

        self.header("Cluster Usage Report - Total");
        println!(
            "\n   Period: {} - {}",
            total.period_start.as_deref().unwrap_or("?").bright_white(),
            total.period_end.as_deref().unwrap_or("now").bright_white()
        );
        println!("   Partitions: {}", total.partition.bright_white());
        println!("   Users: {}", total.rows.to_string().bright_white().bold());
        println!("   {}", usage_line(&total.usage));
        println!();
    }

    pub fn display_cache_entries(&self, entries: &[CacheEntryInfo], json_output: bool) {
        if json_output {
            println!("{}", self.to_json(&serde_json::json!({ "months": entries })));
            return;
        }

        self.header("Cached Months");
        if entries.is_empty() {
            println!("\n   {}", "No cached months".bright_yellow());
        }
        for entry in entries {
            let partitions = if entry.partitions.is_empty() {
                "*"
            } else {
                entry.partitions.as_str()
            };
            println!(
                "   {} {} - {} (partitions {})",
                entry.month.bright_white().bold(),
                entry.start,
                if entry.end.is_empty() { "now" } else { entry.end.as_str() },
                partitions.bright_cyan()
            );
        }
        println!();
    }

    /// Raw identity record, always JSON
    pub fn display_value(&self, value: &serde_json::Value) {
        println!("{}", self.to_json(value));
    }
}

fn by_metric(a: &UsageTotals, b: &UsageTotals, metric: Metric) -> Ordering {
    b.metric(metric)
        .partial_cmp(&a.metric(metric))
        .unwrap_or(Ordering::Equal)
}

/// Descending by metric, then ascending by key
pub fn sort_aggregates(rows: &[AggregatedRow], metric: Metric) -> Vec<&AggregatedRow> {
    let mut sorted: Vec<&AggregatedRow> = rows.iter().collect();
    sorted.sort_by(|a, b| by_metric(&a.usage, &b.usage, metric).then_with(|| a.key.cmp(&b.key)));
    sorted
}

pub fn format_hours(hours: f64) -> String {
    format!("{hours:.2}")
}

fn usage_line(usage: &UsageTotals) -> String {
    format!(
        "CPU {} h • GPU {} h • RAM {} GBh",
        format_hours(usage.cpu_hours).bright_green(),
        format_hours(usage.gpu_hours).bright_green(),
        format_hours(usage.ram_gb_hours).bright_green()
    )
}
