//! Parsers for accounting tool output
//!
//! - [`PipeTable`] - `sacct --parsable2` output: a `|`-delimited header line
//!   followed by one `|`-delimited line per job or job step
//! - [`parse_login_usage_table`] - the whitespace-aligned `Login  Used` listing
//!   printed by `sreport cluster UserUtilizationByAccount`
//! - [`parse_id_groups`] - the `groups=` section of `id <user>`

use crate::models::JobRecord;
use std::collections::BTreeMap;

pub type Record = BTreeMap<String, String>;

/// Header-driven view over pipe-delimited text.
///
/// The source text is borrowed, so [`PipeTable::records`] can be called any
/// number of times and always yields the same sequence.
#[derive(Debug, Clone)]
pub struct PipeTable<'a> {
    header: Vec<&'a str>,
    body: Vec<&'a str>,
}

impl<'a> PipeTable<'a> {
    pub fn parse(text: &'a str) -> Self {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let header = lines
            .next()
            .map(|line| line.trim_end_matches('\r').split('|').collect())
            .unwrap_or_default();

        Self {
            header,
            body: lines.collect(),
        }
    }

    pub fn header(&self) -> &[&'a str] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Each data line zipped positionally against the header
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.body.iter().map(move |line| {
            self.header
                .iter()
                .zip(line.trim_end_matches('\r').split('|'))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        })
    }
}

pub fn parse_table(text: &str) -> Vec<Record> {
    PipeTable::parse(text).records().collect()
}

pub fn parse_job_records(text: &str) -> Vec<JobRecord> {
    PipeTable::parse(text)
        .records()
        .map(|fields| JobRecord::from_fields(&fields))
        .collect()
}

/// Return `(user, used hours)` pairs from a `Login  Used` listing.
///
/// Only the first and the last token of a line matter, so padded columns in
/// between are tolerated. The header is the line whose first token is `login`
/// in any case. Lines whose last token is not a number are skipped.
pub fn parse_login_usage_table(text: &str) -> Vec<(String, f64)> {
    let mut result: Vec<(String, f64)> = Vec::new();

    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 || parts[0].eq_ignore_ascii_case("login") {
            continue;
        }

        let (user, used) = (parts[0], parts[parts.len() - 1]);
        let Ok(hours) = used.parse::<f64>() else {
            continue;
        };

        match result.iter_mut().find(|(existing, _)| existing == user) {
            Some(entry) => entry.1 = hours,
            None => result.push((user.to_string(), hours)),
        }
    }

    result
}

/// Group names from `id` output such as
/// `uid=1000(user) gid=1000(user) groups=1000(user),27(sudo),111(test-ai-c)`
pub fn parse_id_groups(text: &str) -> Vec<String> {
    let Some((_, groups)) = text.trim().split_once(" groups=") else {
        return Vec::new();
    };

    groups
        .split(',')
        .filter_map(|item| {
            let start = item.find('(')? + 1;
            let end = start + item[start..].find(')')?;
            Some(item[start..end].to_string())
        })
        .collect()
}
