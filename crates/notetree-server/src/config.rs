//! Server configuration read from `NOTETREE_*` environment variables.

use std::time::Duration;

use thiserror::Error;

/// Quiet period before an autosave runs.
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 300;

/// Quiet period before an undo snapshot is captured.
pub const DEFAULT_HISTORY_DEBOUNCE_MS: u64 = 500;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("unsupported provider '{0}': use openrouter or openai_compatible")]
    UnsupportedProvider(String),

    #[error("openai_compatible provider requires NOTETREE_API_BASE_URL")]
    MissingBaseUrl,
}

/// Which OpenAI-compatible endpoint to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// `openrouter` or `openai_compatible`.
    pub provider: String,
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model used for projects that do not name one.
    pub default_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            provider: "openrouter".to_string(),
            api_base_url: None,
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Resolves the chat completions base URL for the configured provider.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        match self.provider.as_str() {
            "openrouter" => Ok(self
                .api_base_url
                .clone()
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string())),
            "openai_compatible" => self.api_base_url.clone().ok_or(ConfigError::MissingBaseUrl),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// SQLite database file.
    pub db_path: String,
    pub port: u16,
    pub provider: ProviderConfig,
    pub autosave_debounce: Duration,
    pub history_debounce: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            db_path: "notetree.db".to_string(),
            port: 3000,
            provider: ProviderConfig::default(),
            autosave_debounce: Duration::from_millis(DEFAULT_AUTOSAVE_DEBOUNCE_MS),
            history_debounce: Duration::from_millis(DEFAULT_HISTORY_DEBOUNCE_MS),
        }
    }
}

impl ServerConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Unset or empty
    /// variables fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = ServerConfig::default();

        let port = match get("NOTETREE_PORT") {
            Some(raw) => parse_number("NOTETREE_PORT", &raw)?,
            None => defaults.port,
        };
        let autosave_debounce = match get("NOTETREE_AUTOSAVE_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(parse_number("NOTETREE_AUTOSAVE_DEBOUNCE_MS", &raw)?),
            None => defaults.autosave_debounce,
        };
        let history_debounce = match get("NOTETREE_HISTORY_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(parse_number("NOTETREE_HISTORY_DEBOUNCE_MS", &raw)?),
            None => defaults.history_debounce,
        };

        let provider = ProviderConfig {
            provider: get("NOTETREE_PROVIDER").unwrap_or(defaults.provider.provider),
            api_base_url: get("NOTETREE_API_BASE_URL"),
            api_key: get("NOTETREE_API_KEY"),
            default_model: get("NOTETREE_DEFAULT_MODEL").unwrap_or(defaults.provider.default_model),
        };
        // Surface provider mistakes at startup instead of on the first request.
        provider.base_url()?;

        Ok(ServerConfig {
            db_path: get("NOTETREE_DB_PATH").unwrap_or(defaults.db_path),
            port,
            provider,
            autosave_debounce,
            history_debounce,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.autosave_debounce, Duration::from_millis(300));
        assert_eq!(config.history_debounce, Duration::from_millis(500));
    }

    #[test]
    fn reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("NOTETREE_DB_PATH", "/tmp/x.db"),
            ("NOTETREE_PORT", "8080"),
            ("NOTETREE_PROVIDER", "openai_compatible"),
            ("NOTETREE_API_BASE_URL", "http://localhost:11434/v1"),
            ("NOTETREE_DEFAULT_MODEL", "llama3"),
            ("NOTETREE_AUTOSAVE_DEBOUNCE_MS", "1000"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider.default_model, "llama3");
        assert_eq!(config.autosave_debounce, Duration::from_secs(1));
        assert_eq!(
            config.provider.base_url().unwrap(),
            "http://localhost:11434/v1"
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("NOTETREE_PORT", "eighty")])),
            Err(ConfigError::InvalidValue {
                var: "NOTETREE_PORT",
                value: "eighty".into()
            })
        );
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("NOTETREE_PROVIDER", "openai_compatible")])),
            Err(ConfigError::MissingBaseUrl)
        );
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("NOTETREE_PROVIDER", "carrier-pigeon")])),
            Err(ConfigError::UnsupportedProvider(_))
        ));
    }
}
