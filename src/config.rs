use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://lichess.org";
pub const TOKEN_ENV: &str = "LICHESS_API_KEY";
pub const BASE_URL_ENV: &str = "LICHESS_BASE_URL";

/// Connection settings. Without a token only public endpoints are usable.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
        }
    }
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self::default().with_token(token)
    }

    /// Reads `LICHESS_API_KEY` and `LICHESS_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            config.token = Some(token.trim().to_string());
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        config
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Absolute url of an API path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(|key| match key {
            TOKEN_ENV => Some(" lip_abc ".to_string()),
            _ => None,
        });
        assert_eq!(config.token.as_deref(), Some("lip_abc"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);

        let empty = ClientConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(empty, ClientConfig::default());
    }

    #[test]
    fn test_url_joins_paths() {
        let config = ClientConfig::default().with_base_url("http://127.0.0.1:1234/");
        assert_eq!(config.url("/api/account"), "http://127.0.0.1:1234/api/account");
        assert_eq!(ClientConfig::default().url("api/tv/feed"), "https://lichess.org/api/tv/feed");
    }

    #[test]
    fn test_debug_hides_token() {
        let config = ClientConfig::new("lip_secret");
        assert!(!format!("{:?}", config).contains("lip_secret"));
    }
}
