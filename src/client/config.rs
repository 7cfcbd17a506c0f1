use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use std::sync::{Arc, RwLock};

/// Client configuration: the loaded [`AppConfig`] plus the session bearer token.
///
/// Cloning is cheap and every clone shares the same token slot, so the HTTP
/// transport sees a token stored after login.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
    token: Arc<RwLock<Option<String>>>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self {
            app,
            token: Arc::default(),
        }
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::from_app(builder.build()?))
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Set the bearer token
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|slot| slot.clone())
    }

    /// Clear the token (logout)
    pub fn clear_token(&self) {
        self.set_token(None);
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.trim_end_matches('/')
    }
}
