use super::run_command;
use crate::error::LookupError;
use crate::identity::GroupSource;
use crate::parser::parse_id_groups;

/// Group memberships as reported by `id <user>`
#[derive(Debug, Clone)]
pub struct IdGroups {
    pub command: String,
}

impl Default for IdGroups {
    fn default() -> Self {
        Self {
            command: "id".to_string(),
        }
    }
}

impl IdGroups {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl GroupSource for IdGroups {
    fn groups_for(&self, user_id: &str) -> Result<Vec<String>, LookupError> {
        let output = run_command(&self.command, &[user_id.to_string()])
            .map_err(|reason| LookupError::groups(user_id, reason))?;
        Ok(parse_id_groups(&output))
    }
}
