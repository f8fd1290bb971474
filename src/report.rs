//! Report Row Builder
//!
//! Joins the usage of one user with identity and group data into a
//! [`ReportRow`], stamped with the period it covers and the time it was built.
//!
//! ## Failure policy
//!
//! - [`ReportBuilder::create_report`] builds one mandatory report: identity,
//!   accounting and format failures are returned to the caller.
//! - [`ReportBuilder::create_active_reports`] builds one report per active user;
//!   a user whose report fails is logged and left out of the batch.
//! - [`ReportBuilder::enrich_rows`] never fails; rows it cannot complete are
//!   passed through unchanged.

use crate::error::{LookupError, Result};
use crate::identity::{GroupPolicy, GroupSource, Identity, IdentitySource};
use crate::models::{present, PartitionSet, ReportRow, UsageTotals};
use crate::parser::{parse_job_records, parse_login_usage_table};
use crate::period::Period;
use crate::reducer::{reduce_usage, PartitionFilter};
use chrono::Utc;
use tracing::{debug, info, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Supplies raw accounting text for users and periods
pub trait AccountingSource: Send + Sync {
    /// `sacct --parsable2` output with `JobID|Partition|Elapsed|NCPUS|AllocTRES`
    fn job_records(&self, user_id: &str, period: &Period) -> Result<String, LookupError>;

    /// `Login  Used` listing of every user active in the period
    fn active_users(&self, period: &Period) -> Result<String, LookupError>;
}

/// Merge identity, usage and provenance into one report row
pub fn build_row(
    identity: &Identity,
    user_id: &str,
    usage: UsageTotals,
    period: &Period,
    ai_c_group: String,
    timestamp: String,
) -> ReportRow {
    ReportRow {
        first_name: identity.first_name.clone(),
        last_name: identity.last_name.clone(),
        email: Some(identity.preferred_email()),
        kennung: Some(
            present(&identity.kennung)
                .unwrap_or(user_id)
                .to_string(),
        ),
        projekt: identity.projekt.clone(),
        ai_c_group: Some(ai_c_group),
        usage,
        timestamp: Some(timestamp),
        period_start: Some(period.start.clone()),
        period_end: period.end.clone(),
    }
}

pub struct ReportBuilder {
    accounting: Box<dyn AccountingSource>,
    identity: Box<dyn IdentitySource>,
    groups: Box<dyn GroupSource>,
    policy: GroupPolicy,
    timestamp_format: String,
}

impl ReportBuilder {
    pub fn new(
        accounting: Box<dyn AccountingSource>,
        identity: Box<dyn IdentitySource>,
        groups: Box<dyn GroupSource>,
        policy: GroupPolicy,
    ) -> Self {
        Self {
            accounting,
            identity,
            groups,
            policy,
            timestamp_format: TIMESTAMP_FORMAT.to_string(),
        }
    }

    /// Use a custom `strftime` format for row timestamps
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Usage of one user for the period, restricted to the given partitions
    pub fn fetch_usage(
        &self,
        user_id: &str,
        period: &Period,
        partitions: &PartitionSet,
    ) -> Result<UsageTotals> {
        let filter = PartitionFilter::new(partitions)?;
        let text = self.accounting.job_records(user_id, period)?;
        let records = parse_job_records(&text);
        let usage = reduce_usage(&records, &filter)?;

        debug!(
            user = %user_id,
            records = records.len(),
            cpu_hours = usage.cpu_hours,
            gpu_hours = usage.gpu_hours,
            ram_gb_hours = usage.ram_gb_hours,
            "Reduced accounting records"
        );

        Ok(usage)
    }

    /// The accounting groups of a user, or an empty string when the lookup fails
    fn ai_c_group(&self, user_id: &str) -> String {
        match self.groups.groups_for(user_id) {
            Ok(groups) => self.policy.select(&groups),
            Err(err) => {
                warn!(user = %user_id, error = %err, "Group lookup failed");
                String::new()
            }
        }
    }

    /// Build the report row of a single user
    pub fn create_report(
        &self,
        user_id: &str,
        period: &Period,
        partitions: &PartitionSet,
    ) -> Result<ReportRow> {
        let identity = self.identity.fetch_user(user_id)?;
        let usage = self.fetch_usage(user_id, period, partitions)?;
        let ai_c_group = self.ai_c_group(user_id);

        Ok(build_row(
            &identity,
            user_id,
            usage,
            period,
            ai_c_group,
            Utc::now().format(&self.timestamp_format).to_string(),
        ))
    }

    /// Build report rows for every user active in the period.
    ///
    /// The active-user listing is not partition filtered; the partition filter
    /// applies to each user's job records. Users whose report fails are skipped.
    pub fn create_active_reports(
        &self,
        period: &Period,
        partitions: &PartitionSet,
    ) -> Result<Vec<ReportRow>> {
        let listing = self.accounting.active_users(period)?;
        let users: Vec<String> = parse_login_usage_table(&listing)
            .into_iter()
            .map(|(user, _)| user)
            .collect();

        info!(users = users.len(), period = %period, "Building reports for active users");

        let build = |user: &String| match self.create_report(user, period, partitions) {
            Ok(row) => Some(row),
            Err(err) => {
                warn!(user = %user, error = %err, "Skipping user after failed report");
                None
            }
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<ReportRow> = {
            use rayon::prelude::*;
            users.par_iter().filter_map(build).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let rows: Vec<ReportRow> = users.iter().filter_map(build).collect();

        Ok(rows)
    }

    /// Fill blank identity fields of cached rows without touching usage
    pub fn enrich_rows(&self, rows: Vec<ReportRow>) -> Vec<ReportRow> {
        rows.into_iter().map(|row| self.enrich_row(row)).collect()
    }

    fn enrich_row(&self, mut row: ReportRow) -> ReportRow {
        if row.has_core_identity() {
            return row;
        }
        let Some(user_id) = row.user_id().map(str::to_string) else {
            return row;
        };

        let identity = match self.identity.fetch_user(&user_id) {
            Ok(identity) => identity,
            Err(err) => {
                warn!(user = %user_id, error = %err, "Identity lookup failed, keeping row as is");
                return row;
            }
        };

        fill(&mut row.first_name, identity.first_name.clone());
        fill(&mut row.last_name, identity.last_name.clone());
        fill(&mut row.email, Some(identity.preferred_email()));
        fill(&mut row.projekt, identity.projekt.clone());

        if present(&row.ai_c_group).is_none() {
            match self.groups.groups_for(&user_id) {
                Ok(groups) => fill(&mut row.ai_c_group, Some(self.policy.select(&groups))),
                Err(err) => warn!(user = %user_id, error = %err, "Group lookup failed, keeping group as is"),
            }
        }

        row
    }
}

/// Set `slot` from `value` only when `slot` is blank and `value` is not
fn fill(slot: &mut Option<String>, value: Option<String>) {
    if present(slot).is_none() {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            *slot = Some(value);
        }
    }
}
