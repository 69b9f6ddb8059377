use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

/// Application-level constants
pub const APP_NAME: &str = "HealthGuide";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENDPOINT_ENV: &str = "HEALTHGUIDE_ENDPOINT";
pub const API_KEY_ENV: &str = "HEALTHGUIDE_API_KEY";
pub const TIMEOUT_ENV: &str = "HEALTHGUIDE_TIMEOUT_SECS";
pub const MAX_RETRIES_ENV: &str = "HEALTHGUIDE_MAX_RETRIES";
pub const RETRY_DELAY_ENV: &str = "HEALTHGUIDE_RETRY_DELAY_MS";
pub const MAX_INPUT_CHARS_ENV: &str = "HEALTHGUIDE_MAX_INPUT_CHARS";

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2_000;

/// At most one retry on the advisory path.
pub const MAX_RETRIES_CAP: u32 = 1;

/// Log filter used when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "info,healthguide_lib=debug,reqwest=warn,hyper=warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Credential for the generation endpoint. Zeroed on drop, never printed.
#[derive(Clone)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Zeroizing::new(key.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Settings for the outbound generation call.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub api_key: ApiKey,
    pub timeout: Duration,
    /// Clamped to `MAX_RETRIES_CAP`.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_input_chars: usize,
}

impl GenerationConfig {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
            retry_base_delay: DEFAULT_RETRY_DELAY,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))?;

        let mut config = Self::new(ApiKey::new(api_key));

        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|e| !e.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, TIMEOUT_ENV)? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    var: TIMEOUT_ENV,
                    value: secs.to_string(),
                });
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, MAX_RETRIES_ENV)? {
            if retries > MAX_RETRIES_CAP {
                tracing::warn!(
                    requested = retries,
                    cap = MAX_RETRIES_CAP,
                    "Retry count above cap, clamping"
                );
            }
            config.max_retries = retries.min(MAX_RETRIES_CAP);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, RETRY_DELAY_ENV)? {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(chars) = parse_var::<usize, _>(&lookup, MAX_INPUT_CHARS_ENV)? {
            if chars == 0 {
                return Err(ConfigError::InvalidValue {
                    var: MAX_INPUT_CHARS_ENV,
                    value: chars.to_string(),
                });
            }
            config.max_input_chars = chars;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = GenerationConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey(API_KEY_ENV));
    }

    #[test]
    fn blank_api_key_is_an_error() {
        let err = GenerationConfig::from_lookup(lookup_from(&[(API_KEY_ENV, "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey(API_KEY_ENV));
    }

    #[test]
    fn defaults_apply() {
        let config = GenerationConfig::from_lookup(lookup_from(&[(API_KEY_ENV, "k")])).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.max_input_chars, DEFAULT_MAX_INPUT_CHARS);
        assert_eq!(config.api_key.expose(), "k");
    }

    #[test]
    fn overrides_are_read() {
        let config = GenerationConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (ENDPOINT_ENV, "http://127.0.0.1:9000/generate"),
            (TIMEOUT_ENV, "3"),
            (MAX_RETRIES_ENV, "1"),
            (RETRY_DELAY_ENV, "50"),
            (MAX_INPUT_CHARS_ENV, "500"),
        ]))
        .unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:9000/generate");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_base_delay, Duration::from_millis(50));
        assert_eq!(config.max_input_chars, 500);
    }

    #[test]
    fn retries_are_clamped() {
        let config = GenerationConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (MAX_RETRIES_ENV, "5"),
        ]))
        .unwrap();
        assert_eq!(config.max_retries, MAX_RETRIES_CAP);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = GenerationConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (TIMEOUT_ENV, "ten"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: TIMEOUT_ENV,
                value: "ten".into()
            }
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(GenerationConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (TIMEOUT_ENV, "0"),
        ]))
        .is_err());
    }

    #[test]
    fn zero_max_input_chars_is_rejected() {
        let err = GenerationConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (MAX_INPUT_CHARS_ENV, "0"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: MAX_INPUT_CHARS_ENV,
                value: "0".into()
            }
        );
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let config =
            GenerationConfig::from_lookup(lookup_from(&[(API_KEY_ENV, "super-secret")])).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("ApiKey(***)"));
    }

    #[test]
    fn app_name_is_healthguide() {
        assert_eq!(APP_NAME, "HealthGuide");
    }
}
