use std::env;

pub const ENV_WEBHOOK_BASE_URL: &str = "WEBHOOK_BASE_URL";
pub const ENV_DIAGNOSTICS: &str = "ONBOARDING_DIAGNOSTICS";
pub const ENV_SESSION_IDLE_MINUTES: &str = "SESSION_IDLE_MINUTES";
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 30;
pub const DEFAULT_WEBHOOK_BASE_URL: &str =
    "https://n8n-main-instance-production-1345.up.railway.app/webhook";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub webhook_base_url: String,
    pub diagnostics: bool,
    /// Sessions untouched for this long are dropped from memory.
    pub session_idle_minutes: i64,
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let webhook_base_url = lookup(ENV_WEBHOOK_BASE_URL)
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                tracing::info!(
                    "{} not set, using default: {}",
                    ENV_WEBHOOK_BASE_URL,
                    DEFAULT_WEBHOOK_BASE_URL
                );
                DEFAULT_WEBHOOK_BASE_URL.to_string()
            });

        let diagnostics = lookup(ENV_DIAGNOSTICS)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let session_idle_minutes = lookup(ENV_SESSION_IDLE_MINUTES)
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_SESSION_IDLE_MINUTES);

        Self {
            webhook_base_url,
            diagnostics,
            session_idle_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.webhook_base_url, DEFAULT_WEBHOOK_BASE_URL);
        assert!(!config.diagnostics);
        assert_eq!(config.session_idle_minutes, DEFAULT_SESSION_IDLE_MINUTES);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (ENV_WEBHOOK_BASE_URL, " http://localhost:5678/webhook/ "),
            (ENV_DIAGNOSTICS, "TRUE"),
            (ENV_SESSION_IDLE_MINUTES, "5"),
        ]);
        assert_eq!(config.webhook_base_url, "http://localhost:5678/webhook");
        assert!(config.diagnostics);
        assert_eq!(config.session_idle_minutes, 5);
    }

    #[test]
    fn test_invalid_idle_minutes_use_default() {
        let config = config_from(&[(ENV_SESSION_IDLE_MINUTES, "-3")]);
        assert_eq!(config.session_idle_minutes, DEFAULT_SESSION_IDLE_MINUTES);
    }

    #[test]
    fn test_blank_base_url_uses_default() {
        let config = config_from(&[(ENV_WEBHOOK_BASE_URL, "  "), (ENV_DIAGNOSTICS, "0")]);
        assert_eq!(config.webhook_base_url, DEFAULT_WEBHOOK_BASE_URL);
        assert!(!config.diagnostics);
    }
}
