//! # Credential Cache and Signup Backlog
//!
//! Storage behind offline login: one hashed credential per identifier, plus
//! registration forms captured while offline. Hashing happens in
//! `client::local_auth`; this module never sees a plaintext secret except in a
//! stored signup form, which is deleted once replayed.

use crate::client::local_db::codec;
use crate::client::local_db::records::corrupt_row;
use crate::client::local_db::{now_millis, LocalDatabase, Result};
use crate::client::sync::sync_state::SyncState;
use crate::client::types::{Profile, SignupForm};
use crate::shared::protocol::Millis;
use sqlx::SqliteConnection;
use uuid::Uuid;

/// Cached credential row
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCredential {
    pub identifier: String,
    /// bcrypt hash of the secret
    pub secret_hash: String,
    pub profile: Profile,
    pub server_id: Option<String>,
    /// `Pending` until the account exists on the server
    pub sync_state: SyncState,
    pub updated_at: Millis,
}

/// Registration captured offline
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSignup {
    pub local_id: Uuid,
    pub form: SignupForm,
    pub created_at: Millis,
    pub attempts: i64,
    pub last_error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    identifier: String,
    secret_hash: String,
    profile: String,
    server_id: Option<String>,
    sync_state: String,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct SignupRow {
    local_id: String,
    form: String,
    created_at: i64,
    attempts: i64,
    last_error: Option<String>,
}

impl LocalDatabase {
    /// Insert or replace the cached credential for an identifier
    pub async fn upsert_credential(
        &self,
        identifier: &str,
        secret_hash: &str,
        profile: &Profile,
        sync_state: SyncState,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write_credential(&mut *conn, identifier, secret_hash, profile, sync_state).await
    }

    async fn write_credential(
        conn: &mut SqliteConnection,
        identifier: &str,
        secret_hash: &str,
        profile: &Profile,
        sync_state: SyncState,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO credentials (identifier, secret_hash, profile, server_id, sync_state, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(identifier)
        .bind(secret_hash)
        .bind(codec::encode(profile)?)
        .bind(profile.id.as_deref())
        .bind(sync_state.as_str())
        .bind(now_millis())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Look up the cached credential for an identifier
    pub async fn get_credential(&self, identifier: &str) -> Result<Option<CachedCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT identifier, secret_hash, profile, server_id, sync_state, updated_at
             FROM credentials WHERE identifier = ?",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(CachedCredential {
            identifier: row.identifier,
            secret_hash: row.secret_hash,
            profile: codec::decode(&row.profile)?,
            server_id: row.server_id,
            sync_state: row.sync_state.parse().map_err(corrupt_row)?,
            updated_at: row.updated_at,
        }))
    }

    /// Mark a credential as known to the server and store the returned profile
    async fn write_credential_synced(conn: &mut SqliteConnection, identifier: &str, profile: &Profile) -> Result<()> {
        sqlx::query(
            "UPDATE credentials SET profile = ?, server_id = ?, sync_state = 'synced', updated_at = ?
             WHERE identifier = ?",
        )
        .bind(codec::encode(profile)?)
        .bind(profile.id.as_deref())
        .bind(now_millis())
        .bind(identifier)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Queue a signup and cache its pending credential in one transaction
    pub async fn queue_signup_with_credential(&self, form: &SignupForm, secret_hash: &str) -> Result<PendingSignup> {
        let mut tx = self.pool.begin().await?;
        let signup = Self::insert_signup(&mut *tx, form).await?;
        Self::write_credential(&mut *tx, &form.identifier, secret_hash, &form.local_profile(), SyncState::Pending).await?;
        tx.commit().await?;
        Ok(signup)
    }

    /// Drop a replayed signup and mark its credential synced in one transaction
    pub async fn complete_signup_with_credential(&self, signup: &PendingSignup, profile: &Profile) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::delete_signup(&mut *tx, &signup.local_id).await?;
        Self::write_credential_synced(&mut *tx, &signup.form.identifier, profile).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_signup(conn: &mut SqliteConnection, form: &SignupForm) -> Result<PendingSignup> {
        let signup = PendingSignup {
            local_id: Uuid::new_v4(),
            form: form.clone(),
            created_at: now_millis(),
            attempts: 0,
            last_error: None,
        };

        sqlx::query(
            "INSERT INTO pending_signups (local_id, identifier, form, created_at, attempts, last_error)
             VALUES (?, ?, ?, ?, 0, NULL)",
        )
        .bind(signup.local_id.to_string())
        .bind(&form.identifier)
        .bind(codec::encode(form)?)
        .bind(signup.created_at)
        .execute(conn)
        .await?;
        Ok(signup)
    }

    /// Backlog in submission order. Unreadable entries are skipped.
    pub async fn pending_signups(&self) -> Result<Vec<PendingSignup>> {
        let rows = sqlx::query_as::<_, SignupRow>(
            "SELECT local_id, form, created_at, attempts, last_error
             FROM pending_signups ORDER BY created_at ASC, local_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut signups = Vec::with_capacity(rows.len());
        for row in rows {
            let decoded = Uuid::parse_str(&row.local_id)
                .map_err(|e| e.to_string())
                .and_then(|local_id| {
                    codec::decode::<SignupForm>(&row.form)
                        .map(|form| (local_id, form))
                        .map_err(|e| e.to_string())
                });
            match decoded {
                Ok((local_id, form)) => signups.push(PendingSignup {
                    local_id,
                    form,
                    created_at: row.created_at,
                    attempts: row.attempts,
                    last_error: row.last_error,
                }),
                Err(error) => {
                    tracing::warn!(local_id = %row.local_id, %error, "skipping corrupt signup entry")
                }
            }
        }
        Ok(signups)
    }

    /// Record a failed replay attempt
    pub async fn record_signup_failure(&self, local_id: &Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE pending_signups SET attempts = attempts + 1, last_error = ? WHERE local_id = ?",
        )
        .bind(error)
        .bind(local_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_signup(conn: &mut SqliteConnection, local_id: &Uuid) -> Result<()> {
        sqlx::query("DELETE FROM pending_signups WHERE local_id = ?")
            .bind(local_id.to_string())
            .execute(conn)
            .await?;
        Ok(())
    }
}
