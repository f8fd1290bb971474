//! User directory client.
//!
//! Identity records are fetched with `GET {base_url}{user}` using HTTP basic
//! auth. Credentials come from the `.netrc` entry of the configured host.

use crate::error::LookupError;
use crate::identity::{Identity, IdentitySource};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://simapi.sim.lrz.de/user/";
pub const DEFAULT_HOST: &str = "simapi.sim.lrz.de";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Find the `login`/`password` pair for `host` in netrc text.
///
/// A `default` entry is used when no `machine` entry matches.
pub fn netrc_credentials(text: &str, host: &str) -> Option<Credentials> {
    let mut tokens = text.split_whitespace();
    let mut found: Option<(Option<String>, Option<String>)> = None;
    let mut fallback: Option<(Option<String>, Option<String>)> = None;
    // 0: outside, 1: matching machine, 2: other machine, 3: default
    let mut state = 0u8;

    while let Some(token) = tokens.next() {
        match token {
            "machine" => {
                let name = tokens.next().unwrap_or_default();
                state = if name == host && found.is_none() { 1 } else { 2 };
                if state == 1 {
                    found = Some((None, None));
                }
            }
            "default" => {
                state = 3;
                fallback.get_or_insert((None, None));
            }
            "login" | "password" | "account" => {
                let value = tokens.next().map(str::to_string);
                let entry = match state {
                    1 => found.as_mut(),
                    3 => fallback.as_mut(),
                    _ => None,
                };
                if let Some(entry) = entry {
                    match token {
                        "login" => entry.0 = value,
                        "password" => entry.1 = value,
                        _ => {}
                    }
                }
            }
            "macdef" => {
                // macro bodies are not credentials
                state = 0;
                tokens.next();
            }
            _ => {}
        }
    }

    match found.or(fallback)? {
        (Some(login), Some(password)) if !login.is_empty() && !password.is_empty() => {
            Some(Credentials { login, password })
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct SimApi {
    pub base_url: String,
    pub host: String,
    pub netrc_file: PathBuf,
}

impl SimApi {
    pub fn new(base_url: impl Into<String>, host: impl Into<String>, netrc_file: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            host: host.into(),
            netrc_file: netrc_file.into(),
        }
    }

    pub fn default_netrc() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".netrc")
    }

    fn credentials(&self, user_id: &str) -> Result<Credentials, LookupError> {
        let text = std::fs::read_to_string(&self.netrc_file)
            .map_err(|err| LookupError::identity(user_id, format!("failed to read netrc file: {err}")))?;
        netrc_credentials(&text, &self.host)
            .ok_or_else(|| LookupError::identity(user_id, "incomplete credentials in netrc file"))
    }

    pub fn user_url(&self, user_id: &str) -> String {
        format!("{}{}", self.base_url, user_id)
    }

    /// The raw JSON record of a user
    #[cfg(feature = "sim-api")]
    pub fn fetch_raw(&self, user_id: &str) -> Result<Value, LookupError> {
        let credentials = self.credentials(user_id)?;
        let url = self.user_url(user_id);
        debug!(url = %url, "Fetching user record");

        let response = reqwest::blocking::Client::new()
            .get(&url)
            .header("Accept", "application/json")
            .basic_auth(&credentials.login, Some(&credentials.password))
            .send()
            .map_err(|err| LookupError::identity(user_id, format!("failed to contact API: {err}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(LookupError::identity(
                user_id,
                format!("API request failed with status {status}: {body}"),
            ));
        }

        response
            .json::<Value>()
            .map_err(|err| LookupError::identity(user_id, format!("failed to decode JSON response: {err}")))
    }

    #[cfg(not(feature = "sim-api"))]
    pub fn fetch_raw(&self, user_id: &str) -> Result<Value, LookupError> {
        self.credentials(user_id)?;
        debug!(url = %self.user_url(user_id), "HTTP client not compiled in");
        Err(LookupError::identity(
            user_id,
            "built without the sim-api feature",
        ))
    }
}

impl IdentitySource for SimApi {
    fn fetch_user(&self, user_id: &str) -> Result<Identity, LookupError> {
        self.fetch_raw(user_id).map(|value| Identity::from_value(&value))
    }
}
