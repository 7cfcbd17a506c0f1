//! Offline Authentication
//!
//! Lets a user sign in and register without connectivity.
//!
//! ## Features
//!
//! - **Credential Cache**: a bcrypt hash of the secret is stored after every
//!   successful online login or signup
//! - **Offline Login**: verified against the cached hash, never plaintext
//! - **Offline Signup**: the form is queued and a pending credential is cached
//!   so the new account can sign in before it reaches the server
//! - **Backlog Replay**: queued signups are sent to `POST /signup` during sync
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::local_auth::LocalAuth;
//! use tripsync::client::local_db::LocalDatabase;
//! use tripsync::client::types::SignupForm;
//!
//! # async fn example(db: LocalDatabase) -> Result<(), tripsync::shared::AuthError> {
//! let auth = LocalAuth::new(db, 12);
//! auth.signup_offline(SignupForm::new("driver-7", "correct horse")).await?;
//! let profile = auth.login_offline("driver-7", "correct horse").await?;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::credentials::PendingSignup;
use crate::client::local_db::LocalDatabase;
use crate::client::remote::AccountTransport;
use crate::client::sync::sync_state::SyncState;
use crate::client::types::{Profile, SignupForm};
use crate::shared::config::AppConfig;
use crate::shared::error::{AuthError, RemoteError, SyncError};
use uuid::Uuid;

/// Result of one backlog replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    /// Entries kept for the next cycle, with the reason
    pub failed: Vec<(Uuid, String)>,
}

/// Credential cache and signup backlog
#[derive(Debug, Clone)]
pub struct LocalAuth {
    db: LocalDatabase,
    hash_cost: u32,
}

impl LocalAuth {
    pub fn new(db: LocalDatabase, hash_cost: u32) -> Self {
        Self { db, hash_cost }
    }

    pub fn from_config(db: LocalDatabase, config: &AppConfig) -> Self {
        Self::new(db, config.credential_hash_cost)
    }

    /// Cache a credential the server just accepted
    pub async fn cache_credential(&self, identifier: &str, secret: &str, profile: &Profile) -> Result<(), AuthError> {
        let hash = self.hash(secret).await?;
        self.db
            .upsert_credential(identifier, &hash, profile, SyncState::Synced)
            .await?;
        tracing::debug!(identifier, "credential cached");
        Ok(())
    }

    /// Verify against the cached credential
    pub async fn login_offline(&self, identifier: &str, secret: &str) -> Result<Profile, AuthError> {
        let Some(credential) = self.db.get_credential(identifier).await? else {
            return Err(AuthError::NotCached(identifier.to_string()));
        };

        let secret = secret.to_string();
        let hash = credential.secret_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash)).await??;
        if !valid {
            tracing::warn!(identifier, "offline login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(identifier, pending = credential.sync_state == SyncState::Pending, "offline login");
        Ok(credential.profile)
    }

    /// Register without connectivity
    pub async fn signup_offline(&self, form: SignupForm) -> Result<PendingSignup, AuthError> {
        form.validate()?;
        if self.db.get_credential(&form.identifier).await?.is_some() {
            return Err(AuthError::validation("identifier", "already registered on this device"));
        }

        let hash = self.hash(&form.secret).await?;
        let signup = self.db.queue_signup_with_credential(&form, &hash).await?;

        tracing::info!(identifier = %form.identifier, local_id = %signup.local_id, "signup queued");
        Ok(signup)
    }

    /// Send every queued signup.
    ///
    /// A rejected credential stops the replay with `SyncError::ReauthRequired`;
    /// other failures keep the entry and move on.
    pub async fn replay_signups<T>(&self, transport: &T) -> Result<ReplayReport, SyncError>
    where
        T: AccountTransport + ?Sized,
    {
        let mut report = ReplayReport::default();
        for signup in self.db.pending_signups().await? {
            match transport.signup(&signup.form).await {
                Ok(response) => {
                    if let Err(error) = self.db.complete_signup_with_credential(&signup, &response.user).await {
                        // Kept in the backlog; a later replay meets an existing account
                        tracing::warn!(identifier = %signup.form.identifier, %error, "failed to record accepted signup");
                        report.failed.push((signup.local_id, error.to_string()));
                        continue;
                    }
                    tracing::info!(identifier = %signup.form.identifier, "queued signup accepted");
                    report.replayed += 1;
                }
                Err(RemoteError::Auth(message)) => {
                    self.db.record_signup_failure(&signup.local_id, &message).await?;
                    tracing::error!(identifier = %signup.form.identifier, "signup replay rejected credential");
                    return Err(SyncError::ReauthRequired(message));
                }
                Err(error) => {
                    let reason = error.to_string();
                    self.db.record_signup_failure(&signup.local_id, &reason).await?;
                    tracing::warn!(identifier = %signup.form.identifier, %error, "signup replay failed");
                    report.failed.push((signup.local_id, reason));
                }
            }
        }
        Ok(report)
    }

    /// Queued signups not yet accepted by the server
    pub async fn pending_signups(&self) -> Result<Vec<PendingSignup>, AuthError> {
        Ok(self.db.pending_signups().await?)
    }

    async fn hash(&self, secret: &str) -> Result<String, AuthError> {
        let secret = secret.to_string();
        let cost = self.hash_cost;
        Ok(tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost)).await??)
    }
}
