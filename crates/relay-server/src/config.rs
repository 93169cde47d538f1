//! Relay configuration with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. `.env` in the working directory, if any, is loaded into the environment
//! 2. Start with compiled [`RelayConfig::default()`]
//! 3. If a config file was given, deep-merge its values over defaults
//! 4. Apply environment variable overrides (highest priority)

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use relay_telegram::DEFAULT_API_BASE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TELEGRAM_TOKEN is not set")]
    MissingToken,
    #[error("ADMIN_CHAT_ID is not set")]
    MissingChatId,
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub telegram: TelegramSettings,
    /// Forget correlations older than this. `None` keeps them forever.
    pub correlation_ttl_secs: Option<u64>,
    /// How often expired correlations are swept.
    pub sweep_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Close a channel after this long without a pong.
    pub heartbeat_timeout_secs: u64,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            telegram: TelegramSettings::default(),
            correlation_ttl_secs: None,
            sweep_interval_secs: 60,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            log_level: "info".into(),
            log_json: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Bot token. Never serialized.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,
    pub admin_chat_id: Option<i64>,
    /// `socks5://` or `http://` proxy for Bot API calls.
    pub proxy: Option<String>,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            token: None,
            admin_chat_id: None,
            proxy: None,
            api_base: DEFAULT_API_BASE.into(),
            poll_timeout_secs: 30,
        }
    }
}

/// Everything needed to talk to the operator. Only exists for a usable config.
#[derive(Clone, Debug)]
pub struct OperatorCredentials {
    pub token: SecretString,
    pub chat_id: i64,
}

impl RelayConfig {
    /// Fails when the operator side cannot work. The process must not start.
    pub fn credentials(&self) -> Result<OperatorCredentials> {
        let token = self
            .telegram
            .token
            .clone()
            .ok_or(ConfigError::MissingToken)?;
        let chat_id = match self.telegram.admin_chat_id {
            None => return Err(ConfigError::MissingChatId),
            Some(0) => return Err(ConfigError::InvalidValue("ADMIN_CHAT_ID must be non-zero".into())),
            Some(id) => id,
        };
        Ok(OperatorCredentials { token, chat_id })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn correlation_ttl(&self) -> Option<Duration> {
        self.correlation_ttl_secs.map(Duration::from_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

/// Load `.env`, the optional config file and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    match dotenv::dotenv() {
        Ok(path) => debug!(?path, "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env, ignoring"),
    }
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Like [`load_config`] but reading variables through `env`.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(RelayConfig::default())?;

    let merged = match path {
        Some(path) => {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => defaults,
    };

    let mut config: RelayConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config, env)?;
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and nulls
/// in `source` keep the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides.
///
/// Malformed optional values are ignored with a warning. A malformed
/// `ADMIN_CHAT_ID` is an error, since it would silently disable replies.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = read("TELEGRAM_TOKEN") {
        config.telegram.token = Some(SecretString::from(v));
    }
    if let Some(v) = read("ADMIN_CHAT_ID") {
        let id = v
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidValue(format!("ADMIN_CHAT_ID={v} is not an integer")))?;
        config.telegram.admin_chat_id = Some(id);
    }
    if let Some(v) = read("SOCKS5_PROXY") {
        config.telegram.proxy = Some(v);
    }
    if let Some(v) = read("TELEGRAM_API_BASE") {
        config.telegram.api_base = v;
    }
    if let Some(v) = read("RELAY_POLL_TIMEOUT_SECS") {
        if let Some(n) = parse_in_range(&v, 1, 50) {
            config.telegram.poll_timeout_secs = n;
        } else {
            tracing::warn!(key = "RELAY_POLL_TIMEOUT_SECS", value = %v, "invalid env var, ignoring");
        }
    }

    if let Some(v) = read("HOST") {
        config.host = v;
    }
    if let Some(v) = read("PORT") {
        match v.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => tracing::warn!(key = "PORT", value = %v, "invalid port, ignoring"),
        }
    }
    if let Some(v) = read("RELAY_CORRELATION_TTL_SECS") {
        if let Some(n) = parse_in_range(&v, 1, u64::MAX) {
            config.correlation_ttl_secs = Some(n);
        } else {
            tracing::warn!(key = "RELAY_CORRELATION_TTL_SECS", value = %v, "invalid env var, ignoring");
        }
    }
    if let Some(v) = read("RELAY_SWEEP_SECS") {
        if let Some(n) = parse_in_range(&v, 1, 86_400) {
            config.sweep_interval_secs = n;
        } else {
            tracing::warn!(key = "RELAY_SWEEP_SECS", value = %v, "invalid env var, ignoring");
        }
    }
    if let Some(v) = read("RELAY_HEARTBEAT_SECS") {
        if let Some(n) = parse_in_range(&v, 1, 3_600) {
            config.heartbeat_interval_secs = n;
        } else {
            tracing::warn!(key = "RELAY_HEARTBEAT_SECS", value = %v, "invalid env var, ignoring");
        }
    }
    if let Some(v) = read("RELAY_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = read("RELAY_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => config.log_json = b,
            None => tracing::warn!(key = "RELAY_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    Ok(())
}

fn parse_in_range(value: &str, min: u64, max: u64) -> Option<u64> {
    value.parse::<u64>().ok().filter(|n| (min..=max).contains(n))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "relay-config-{}-{}.json",
            std::process::id(),
            contents.len()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.telegram.poll_timeout_secs, 30);
        assert!(cfg.correlation_ttl_secs.is_none());
        assert!(!cfg.log_json);
    }

    #[test]
    fn env_supplies_credentials() {
        let cfg = load_config_with(
            None,
            env(&[("TELEGRAM_TOKEN", "123:abc"), ("ADMIN_CHAT_ID", "-100777")]),
        )
        .unwrap();
        let creds = cfg.credentials().unwrap();
        assert_eq!(creds.token.expose_secret(), "123:abc");
        assert_eq!(creds.chat_id, -100777);
    }

    #[test]
    fn missing_token_is_fatal() {
        let cfg = load_config_with(None, env(&[("ADMIN_CHAT_ID", "1")])).unwrap();
        assert!(matches!(cfg.credentials(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn missing_chat_id_is_fatal() {
        let cfg = load_config_with(None, env(&[("TELEGRAM_TOKEN", "t")])).unwrap();
        assert!(matches!(cfg.credentials(), Err(ConfigError::MissingChatId)));
    }

    #[test]
    fn zero_chat_id_is_invalid() {
        let cfg = load_config_with(None, env(&[("TELEGRAM_TOKEN", "t"), ("ADMIN_CHAT_ID", "0")])).unwrap();
        assert!(matches!(cfg.credentials(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn non_numeric_chat_id_is_an_error() {
        let err = load_config_with(None, env(&[("ADMIN_CHAT_ID", "admin")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn env_overrides_server_settings() {
        let cfg = load_config_with(
            None,
            env(&[
                ("PORT", "8080"),
                ("HOST", "127.0.0.1"),
                ("SOCKS5_PROXY", "socks5h://10.0.0.1:1080"),
                ("RELAY_CORRELATION_TTL_SECS", "86400"),
                ("RELAY_LOG_JSON", "yes"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8080");
        assert_eq!(cfg.telegram.proxy.as_deref(), Some("socks5h://10.0.0.1:1080"));
        assert_eq!(cfg.correlation_ttl(), Some(Duration::from_secs(86_400)));
        assert!(cfg.log_json);
    }

    #[test]
    fn malformed_optional_values_are_ignored() {
        let cfg = load_config_with(
            None,
            env(&[("PORT", "http"), ("RELAY_HEARTBEAT_SECS", "0"), ("RELAY_LOG_JSON", "maybe")]),
        )
        .unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert!(!cfg.log_json);
    }

    #[test]
    fn poll_timeout_must_be_between_one_and_fifty() {
        for bad in ["0", "51", "soon"] {
            let cfg = load_config_with(None, env(&[("RELAY_POLL_TIMEOUT_SECS", bad)])).unwrap();
            assert_eq!(cfg.telegram.poll_timeout_secs, 30, "{bad} should be ignored");
        }
        let cfg = load_config_with(None, env(&[("RELAY_POLL_TIMEOUT_SECS", "1")])).unwrap();
        assert_eq!(cfg.telegram.poll_timeout_secs, 1);
    }

    #[test]
    fn file_values_merge_over_defaults_and_env_wins() {
        let path = temp_config(
            &json!({
                "port": 4000,
                "telegram": {"admin_chat_id": 55, "token": "from-file"},
                "correlation_ttl_secs": null
            })
            .to_string(),
        );
        let cfg = load_config_with(Some(&path), env(&[("PORT", "5000")])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.telegram.admin_chat_id, Some(55));
        assert_eq!(cfg.telegram.poll_timeout_secs, 30);
        assert_eq!(cfg.credentials().unwrap().token.expose_secret(), "from-file");
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let err = load_config_with(Some(Path::new("/nonexistent/relay.json")), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn deep_merge_nested_objects() {
        let merged = deep_merge(
            json!({"a": {"b": 1, "c": 2}, "d": [1, 2]}),
            json!({"a": {"c": 3}, "d": [9], "e": null}),
        );
        assert_eq!(merged, json!({"a": {"b": 1, "c": 3}, "d": [9]}));
    }

    #[test]
    fn token_is_redacted_in_debug() {
        let cfg = load_config_with(None, env(&[("TELEGRAM_TOKEN", "super-secret")])).unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }

    #[test]
    fn token_is_never_serialized() {
        let cfg = load_config_with(None, env(&[("TELEGRAM_TOKEN", "super-secret")])).unwrap();
        let value = serde_json::to_value(&cfg).unwrap();
        assert!(value["telegram"].get("token").is_none());
    }
}
