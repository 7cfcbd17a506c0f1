//! Shared Types Module
//!
//! Request and response bodies for the authentication and lookup endpoints.

use crate::shared::error::AuthError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Signed-in user as returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Server id; absent for accounts created offline and not yet replayed
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
}

/// Registration form, as sent to `POST /signup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignupForm {
    pub identifier: String,
    pub secret: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Deployment-specific fields passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignupForm {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
            display_name: None,
            email: None,
            extra: Map::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Basic field checks done before anything is stored
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.identifier.trim().is_empty() {
            return Err(AuthError::validation("identifier", "must not be empty"));
        }
        if self.secret.len() < 8 {
            return Err(AuthError::validation("secret", "must be at least 8 characters"));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(AuthError::validation("email", "is not an email address"));
            }
        }
        Ok(())
    }

    /// Profile shown while the account only exists locally
    pub fn local_profile(&self) -> Profile {
        Profile {
            id: None,
            username: self.identifier.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Authentication response from server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    pub user: Profile,
}

/// One row of a lookup table such as `GET /trip_statuses`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
