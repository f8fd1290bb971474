//! Aggregator
//!
//! Folds report rows into one summary row per user, per accounting group or
//! over everything. A row whose `ai_c_group` names several groups contributes
//! its full usage to each of them when grouping by group.

use crate::models::{present, AggregatedRow, PartitionSet, ReportRow, ALL_KEY};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    User,
    Group,
}

impl AggregatedRow {
    fn empty(key: &str, partitions: &PartitionSet) -> Self {
        Self {
            key: key.to_string(),
            partition: partitions.label(),
            ..Self::default()
        }
    }

    /// Fold one report row into this aggregate
    pub fn absorb(&mut self, row: &ReportRow, group_by: GroupBy) {
        self.usage += row.usage;
        self.rows += 1;
        widen(&mut self.period_start, &mut self.period_end, &row.period_start, &row.period_end);

        if group_by == GroupBy::User {
            keep_first(&mut self.first_name, &row.first_name);
            keep_first(&mut self.last_name, &row.last_name);
            keep_first(&mut self.email, &row.email);
            keep_first(&mut self.projekt, &row.projekt);
        }
    }

    /// Fold another aggregate with the same key into this one
    pub fn merge(&mut self, other: &AggregatedRow) {
        self.usage += other.usage;
        self.rows += other.rows;
        widen(
            &mut self.period_start,
            &mut self.period_end,
            &other.period_start,
            &other.period_end,
        );
        keep_first(&mut self.first_name, &other.first_name);
        keep_first(&mut self.last_name, &other.last_name);
        keep_first(&mut self.email, &other.email);
        keep_first(&mut self.projekt, &other.projekt);
        if self.partition.is_empty() {
            self.partition = other.partition.clone();
        }
    }

    /// Project into the persisted row schema for CSV export
    pub fn to_report_row(&self, group_by: GroupBy) -> ReportRow {
        let mut row = ReportRow {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            projekt: self.projekt.clone(),
            usage: self.usage,
            period_start: self.period_start.clone(),
            period_end: self.period_end.clone(),
            ..ReportRow::default()
        };

        match group_by {
            GroupBy::User => row.kennung = Some(self.key.clone()),
            GroupBy::Group => row.ai_c_group = Some(self.key.clone()),
        }
        row
    }
}

fn keep_first(slot: &mut Option<String>, value: &Option<String>) {
    if present(slot).is_none() && present(value).is_some() {
        *slot = value.clone();
    }
}

/// Keep the smallest start and the largest end among non-empty bounds
fn widen(
    start: &mut Option<String>,
    end: &mut Option<String>,
    other_start: &Option<String>,
    other_end: &Option<String>,
) {
    if let Some(candidate) = present(other_start) {
        if present(start).map_or(true, |current| candidate < current) {
            *start = Some(candidate.to_string());
        }
    }
    if let Some(candidate) = present(other_end) {
        if present(end).map_or(true, |current| candidate > current) {
            *end = Some(candidate.to_string());
        }
    }
}

fn keys_for(row: &ReportRow, group_by: GroupBy) -> Vec<&str> {
    let keys = match group_by {
        GroupBy::User => row.user_id().into_iter().collect(),
        GroupBy::Group => row.groups(),
    };

    if keys.is_empty() {
        vec![""]
    } else {
        keys
    }
}

/// Aggregate rows per key, sorted by key
pub fn aggregate(
    rows: &[ReportRow],
    group_by: GroupBy,
    partitions: &PartitionSet,
) -> Vec<AggregatedRow> {
    let mut buckets: BTreeMap<String, AggregatedRow> = BTreeMap::new();

    for row in rows {
        for key in keys_for(row, group_by) {
            buckets
                .entry(key.to_string())
                .or_insert_with(|| AggregatedRow::empty(key, partitions))
                .absorb(row, group_by);
        }
    }

    buckets.into_values().collect()
}

/// One total over every row not belonging to an ignored user
pub fn sum_all(rows: &[ReportRow], ignore_users: &[String], partitions: &PartitionSet) -> AggregatedRow {
    let ignored: HashSet<&str> = ignore_users.iter().map(String::as_str).collect();
    let mut total = AggregatedRow::empty(ALL_KEY, partitions);

    for row in rows {
        if row.user_id().is_some_and(|user| ignored.contains(user)) {
            continue;
        }
        total.usage += row.usage;
        total.rows += 1;
        widen(
            &mut total.period_start,
            &mut total.period_end,
            &row.period_start,
            &row.period_end,
        );
    }

    total
}

/// One total per partition set, keyed by the set's label
pub fn aggregate_partitions(
    groups: &[(PartitionSet, Vec<ReportRow>)],
    ignore_users: &[String],
) -> Vec<AggregatedRow> {
    groups
        .iter()
        .map(|(partitions, rows)| {
            let mut total = sum_all(rows, ignore_users, partitions);
            total.key = partitions.label();
            total
        })
        .collect()
}

/// Merge several aggregate runs, keyed and sorted like [`aggregate`]
pub fn combine<I>(runs: I) -> Vec<AggregatedRow>
where
    I: IntoIterator<Item = Vec<AggregatedRow>>,
{
    let mut buckets: BTreeMap<String, AggregatedRow> = BTreeMap::new();

    for run in runs {
        for row in run {
            match buckets.get_mut(&row.key) {
                Some(existing) => existing.merge(&row),
                None => {
                    buckets.insert(row.key.clone(), row);
                }
            }
        }
    }

    buckets.into_values().collect()
}
