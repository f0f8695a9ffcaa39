use log::debug;
use std::env;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Client settings, read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub admin: bool,
    pub session_token: Option<String>,
    pub user_token: Option<String>,
    pub member_level: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            admin: false,
            session_token: None,
            user_token: None,
            member_level: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        if let Err(e) = dotenv::dotenv() {
            debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            base_url: non_empty("KNOWHUB_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            admin: non_empty("KNOWHUB_ADMIN").is_some_and(|v| parse_flag(&v)),
            session_token: non_empty("KNOWHUB_SESSION"),
            user_token: non_empty("KNOWHUB_USER_TOKEN"),
            member_level: non_empty("KNOWHUB_MEMBER_LEVEL"),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
