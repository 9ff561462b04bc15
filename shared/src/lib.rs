pub mod backend;
pub mod config;
pub mod error;
pub mod invitations;
pub mod key_verification;
pub mod notices;
pub mod orchestrator;
pub mod sessions;
pub mod token;
pub mod types;
pub mod webhook;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use config::Config;
use sessions::SessionRegistry;
use std::sync::Arc;
use webhook::{HttpWebhook, Webhook};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: Config, webhook: Arc<dyn Webhook>) -> Arc<Self> {
        let sessions = SessionRegistry::new(webhook, config.diagnostics)
            .with_idle_timeout(chrono::Duration::minutes(config.session_idle_minutes));
        Arc::new(Self { config, sessions })
    }

    /// State backed by the real webhook service at the configured base URL.
    pub fn from_config(config: Config) -> Arc<Self> {
        let webhook = Arc::new(HttpWebhook::new(&config.webhook_base_url));
        Self::new(config, webhook)
    }
}
