//! Authentication Module
//!
//! Online login and signup with the offline fallback from [`LocalAuth`].
//! A credential the server rejects never falls back to the cache; only a
//! connectivity failure does.

use crate::client::config::Config;
use crate::client::local_auth::LocalAuth;
use crate::client::remote::AccountTransport;
use crate::client::types::{LoginRequest, Profile, SignupForm};
use crate::shared::error::{AuthError, RemoteError};
use std::sync::Arc;

/// How a session was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Server accepted the credential and issued a token
    Online,
    /// Verified against the cached credential; no token
    Offline,
}

/// Signed-in user
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub profile: Profile,
    pub mode: AuthMode,
}

/// Login and signup entry point for the UI
pub struct AuthService {
    config: Config,
    transport: Arc<dyn AccountTransport>,
    local: LocalAuth,
}

impl AuthService {
    pub fn new(config: Config, transport: Arc<dyn AccountTransport>, local: LocalAuth) -> Self {
        Self {
            config,
            transport,
            local,
        }
    }

    /// Sign in online, falling back to the credential cache when unreachable
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        let request = LoginRequest {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
        };

        match self.transport.login(&request).await {
            Ok(response) => {
                self.config.set_token(response.token.clone());
                if let Err(error) = self.local.cache_credential(identifier, secret, &response.user).await {
                    tracing::warn!(identifier, %error, "could not cache credential");
                }
                tracing::info!(identifier, "online login");
                Ok(Session {
                    profile: response.user,
                    mode: AuthMode::Online,
                })
            }
            Err(RemoteError::Auth(message)) => {
                tracing::warn!(identifier, %message, "login rejected by server");
                Err(AuthError::InvalidCredentials)
            }
            Err(error) if falls_back(&error) => {
                tracing::info!(identifier, %error, "server unreachable, trying cached credential");
                let profile = self.local.login_offline(identifier, secret).await?;
                Ok(Session {
                    profile,
                    mode: AuthMode::Offline,
                })
            }
            Err(error) => Err(AuthError::Remote(error)),
        }
    }

    /// Register online, queueing the form when unreachable
    pub async fn signup(&self, form: SignupForm) -> Result<Session, AuthError> {
        form.validate()?;

        match self.transport.signup(&form).await {
            Ok(response) => {
                self.config.set_token(response.token.clone());
                if let Err(error) = self
                    .local
                    .cache_credential(&form.identifier, &form.secret, &response.user)
                    .await
                {
                    tracing::warn!(identifier = %form.identifier, %error, "could not cache credential");
                }
                Ok(Session {
                    profile: response.user,
                    mode: AuthMode::Online,
                })
            }
            Err(error) if falls_back(&error) => {
                tracing::info!(identifier = %form.identifier, %error, "server unreachable, queueing signup");
                let profile = form.local_profile();
                self.local.signup_offline(form).await?;
                Ok(Session {
                    profile,
                    mode: AuthMode::Offline,
                })
            }
            Err(error) => Err(AuthError::Remote(error)),
        }
    }

    /// Drop the bearer token
    pub fn logout(&self) {
        self.config.clear_token();
    }

    pub fn local(&self) -> &LocalAuth {
        &self.local
    }
}

/// Connectivity failures and server outages fall back to the cache
fn falls_back(error: &RemoteError) -> bool {
    match error {
        RemoteError::Offline(_) => true,
        RemoteError::Server { status, .. } => *status >= 500,
        _ => false,
    }
}
