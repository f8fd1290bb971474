//! User identity records and the policies that pick a single email address and
//! the accounting groups of a user.
//!
//! The user directory answers with loosely shaped JSON: names may live at the
//! top level or in a nested `daten` object, and use English (`first_name`,
//! `firstname`) or German (`vorname`, `nachname`) field names. Email addresses
//! come as a string, a single object or a list of either.

use crate::error::LookupError;
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_GROUP_SUFFIX: &str = "-ai-c";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identity {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub emails: Vec<String>,
    pub kennung: Option<String>,
    pub projekt: Option<String>,
}

impl Identity {
    pub fn from_value(value: &Value) -> Self {
        let Some(data) = normalize(value) else {
            return Self::default();
        };

        Self {
            first_name: first_text(&data, &["first_name", "firstname", "vorname"]),
            last_name: first_text(&data, &["last_name", "lastname", "nachname"]),
            emails: collect_emails(&data),
            kennung: first_text(&data, &["kennung"]),
            projekt: first_text(&data, &["projekt"]),
        }
    }

    /// Prefer an address starting with `first.last`, else the first address
    pub fn preferred_email(&self) -> String {
        if let (Some(first), Some(last)) = (&self.first_name, &self.last_name) {
            let preferred = format!("{first}.{last}").to_lowercase();
            if let Some(addr) = self
                .emails
                .iter()
                .find(|addr| addr.to_lowercase().starts_with(&preferred))
            {
                return addr.clone();
            }
        }

        self.emails.first().cloned().unwrap_or_default()
    }
}

/// Merge the nested `daten` object into the top level without overwriting
fn normalize(value: &Value) -> Option<Map<String, Value>> {
    let mut result = value.as_object()?.clone();

    if let Some(Value::Object(details)) = value.get("daten") {
        for (key, detail) in details {
            result.entry(key.clone()).or_insert_with(|| detail.clone());
        }
        if let Some(addresses) = details.get("emailadressen") {
            result
                .entry("emails".to_string())
                .or_insert_with(|| addresses.clone());
        }
    }

    Some(result)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn first_text(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|value| is_truthy(value))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
}

fn collect_emails(data: &Map<String, Value>) -> Vec<String> {
    let Some(emails) = ["emails", "emailadressen", "email"]
        .iter()
        .filter_map(|key| data.get(*key))
        .find(|value| is_truthy(value))
    else {
        return Vec::new();
    };

    let items: Vec<&Value> = match emails {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(addr) => Some(addr.clone()),
            Value::Object(entry) => ["address", "adresse"]
                .iter()
                .filter_map(|key| entry.get(*key))
                .find(|value| is_truthy(value))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

/// Keeps the groups that mark cluster accounting membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPolicy {
    pub suffix: String,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_GROUP_SUFFIX.to_string(),
        }
    }
}

impl GroupPolicy {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Matching groups joined with `|` in discovery order, or an empty string
    pub fn select(&self, groups: &[String]) -> String {
        groups
            .iter()
            .filter(|group| group.ends_with(&self.suffix))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Resolves a user id to identity data
pub trait IdentitySource: Send + Sync {
    fn fetch_user(&self, user_id: &str) -> Result<Identity, LookupError>;
}

/// Lists the groups of a user in discovery order
pub trait GroupSource: Send + Sync {
    fn groups_for(&self, user_id: &str) -> Result<Vec<String>, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pick_email_preferred() {
        let identity = Identity::from_value(&json!({
            "vorname": "Max",
            "nachname": "Mustermann",
            "emailadressen": [
                {"adresse": "other@example.com"},
                {"adresse": "Max.Mustermann@example.com"},
            ],
        }));
        assert_eq!(identity.preferred_email(), "Max.Mustermann@example.com");
    }

    #[test]
    fn test_pick_email_fallbacks() {
        let identity = Identity::from_value(&json!({
            "first_name": "Erika",
            "last_name": "Muster",
            "email": "em@example.com",
        }));
        assert_eq!(identity.preferred_email(), "em@example.com");

        let identity = Identity::from_value(&json!({"emails": {"address": "x@example.com"}}));
        assert_eq!(identity.preferred_email(), "x@example.com");

        assert_eq!(Identity::from_value(&json!({})).preferred_email(), "");
        assert_eq!(Identity::from_value(&json!("not an object")), Identity::default());
    }

    #[test]
    fn test_nested_daten_is_merged() {
        let identity = Identity::from_value(&json!({
            "kennung": "mm123",
            "projekt": "proj",
            "vorname": "Top",
            "daten": {
                "vorname": "Max",
                "nachname": "Mustermann",
                "emailadressen": [{"adresse": "max.mustermann@example.com"}],
            },
        }));
        assert_eq!(identity.first_name.as_deref(), Some("Top"));
        assert_eq!(identity.last_name.as_deref(), Some("Mustermann"));
        assert_eq!(identity.kennung.as_deref(), Some("mm123"));
        assert_eq!(identity.projekt.as_deref(), Some("proj"));
        assert_eq!(identity.emails, vec!["max.mustermann@example.com"]);
    }

    #[test]
    fn test_name_spellings_skip_blank_values() {
        let identity = Identity::from_value(&json!({
            "first_name": "",
            "firstname": "Anna",
            "nachname": "Schmidt",
        }));
        assert_eq!(identity.first_name.as_deref(), Some("Anna"));
        assert_eq!(identity.last_name.as_deref(), Some("Schmidt"));
    }

    #[test]
    fn test_group_policy_select() {
        let policy = GroupPolicy::default();
        let groups = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

        assert_eq!(policy.select(&groups(&["users", "project-ai-c", "other"])), "project-ai-c");
        assert_eq!(policy.select(&groups(&["b-ai-c", "a-ai-c"])), "b-ai-c|a-ai-c");
        assert_eq!(policy.select(&groups(&["users"])), "");
        assert_eq!(GroupPolicy::new("-hpc").select(&groups(&["x-hpc", "y-ai-c"])), "x-hpc");
    }
}
