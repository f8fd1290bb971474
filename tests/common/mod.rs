#![allow(dead_code)]

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use usage_report::error::LookupError;
use usage_report::{
    AccountingSource, GroupPolicy, GroupSource, Identity, IdentitySource, Period, ReportBuilder,
};

pub const SACCT_HEADER: &str = "JobID|Partition|Elapsed|NCPUS|AllocTRES";

/// `sacct --parsable2` text for the given `(job, partition, elapsed, ncpus, tres)` lines
pub fn sacct(lines: &[(&str, &str, &str, &str, &str)]) -> String {
    let mut text = format!("{SACCT_HEADER}\n");
    for (job, partition, elapsed, ncpus, tres) in lines {
        text.push_str(&format!("{job}|{partition}|{elapsed}|{ncpus}|{tres}\n"));
    }
    text
}

/// A `Login  Used` listing of the given users
pub fn login_table(users: &[&str]) -> String {
    let mut text = String::from(" Login     Used\n--------- --------\n");
    for (i, user) in users.iter().enumerate() {
        text.push_str(&format!(" {user}     {}\n", (i + 1) * 10));
    }
    text
}

/// Accounting source answering from fixed text; counts every query
#[derive(Clone, Default)]
pub struct FakeAccounting {
    pub jobs: HashMap<String, String>,
    pub active: String,
    pub calls: Arc<AtomicUsize>,
}

impl FakeAccounting {
    pub fn new(active: &[&str]) -> Self {
        Self {
            active: login_table(active),
            ..Self::default()
        }
    }

    pub fn with_jobs(mut self, user: &str, text: String) -> Self {
        self.jobs.insert(user.to_string(), text);
        self
    }
}

impl AccountingSource for FakeAccounting {
    fn job_records(&self, user_id: &str, _period: &Period) -> Result<String, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs
            .get(user_id)
            .cloned()
            .ok_or_else(|| LookupError::Accounting(format!("sacct failed for {user_id}")))
    }

    fn active_users(&self, _period: &Period) -> Result<String, LookupError> {
        Ok(self.active.clone())
    }
}

/// Identity source with a directory record for every user except `unknown*`
pub struct FakeDirectory;

impl IdentitySource for FakeDirectory {
    fn fetch_user(&self, user_id: &str) -> Result<Identity, LookupError> {
        if user_id.starts_with("unknown") {
            return Err(LookupError::identity(user_id, "API request failed with status 404"));
        }
        Ok(Identity::from_value(&json!({
            "kennung": user_id,
            "projekt": format!("pn-{user_id}"),
            "daten": {
                "vorname": "Max",
                "nachname": user_id,
                "emailadressen": [
                    {"adresse": "noreply@example.com"},
                    {"adresse": format!("max.{user_id}@example.com")},
                ],
            },
        })))
    }
}

/// Group source with fixed memberships
#[derive(Default)]
pub struct FakeGroups {
    pub groups: HashMap<String, Vec<String>>,
}

impl FakeGroups {
    pub fn with(mut self, user: &str, groups: &[&str]) -> Self {
        self.groups
            .insert(user.to_string(), groups.iter().map(|g| g.to_string()).collect());
        self
    }
}

impl GroupSource for FakeGroups {
    fn groups_for(&self, user_id: &str) -> Result<Vec<String>, LookupError> {
        self.groups
            .get(user_id)
            .cloned()
            .ok_or_else(|| LookupError::groups(user_id, "id: no such user"))
    }
}

pub fn builder(accounting: FakeAccounting, groups: FakeGroups) -> ReportBuilder {
    ReportBuilder::new(
        Box::new(accounting),
        Box::new(FakeDirectory),
        Box::new(groups),
        GroupPolicy::default(),
    )
}

/// Two users on `lrz-gpu` and `mcml-cpu`, one of them in two accounting groups
pub fn cluster() -> (FakeAccounting, FakeGroups) {
    let accounting = FakeAccounting::new(&["alice", "bob"])
        .with_jobs(
            "alice",
            sacct(&[
                ("1", "lrz-gpu", "01:00:00", "4", "cpu=4,mem=8G,gres/gpu=2"),
                ("1.batch", "lrz-gpu", "01:00:00", "4", "cpu=4,mem=8G,gres/gpu=2"),
                ("2", "mcml-cpu", "02:00:00", "8", "cpu=8,mem=16G"),
            ]),
        )
        .with_jobs(
            "bob",
            sacct(&[("3", "lrz-gpu", "1-00:00:00", "1", "cpu=1,mem=1024M,gres/gpu=1")]),
        );

    let groups = FakeGroups::default()
        .with("alice", &["users", "vision-ai-c", "nlp-ai-c"])
        .with("bob", &["users", "vision-ai-c"]);

    (accounting, groups)
}
