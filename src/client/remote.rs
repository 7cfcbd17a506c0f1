//! # Remote API Client
//!
//! HTTP client for the backend plus the transport traits the sync engine,
//! trip uploader, auth service and location tracker are written against.
//!
//! ## Endpoints
//!
//! - `GET /sync/pull?lastPulledAt=` and `POST /sync/push`
//! - `POST /trip_logs`, `PUT /trip_logs/:id` (multipart) and `DELETE /trip_logs/:id`
//! - `POST /locations/track`
//! - `POST /login`, `POST /signup`
//! - `GET /trip_statuses`, `GET /health`
//!
//! Every call carries the bearer token when one is set and is bounded by the
//! configured request timeout. Failures are mapped onto [`RemoteError`] so
//! callers can tell "retry later" from "re-authenticate".

use crate::client::config::Config;
use crate::client::local_db::trips::TripRecord;
use crate::client::location::PositionSample;
use crate::client::types::{AuthResponse, LoginRequest, LookupEntry, SignupForm};
use crate::shared::error::RemoteError;
use crate::shared::protocol::{Millis, PullResponse, PushRequest, PushResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pull/push transport used by the sync engine
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetch every change since `since` (`None` for a first pull)
    async fn pull(&self, since: Option<Millis>) -> Result<PullResponse, RemoteError>;

    /// Send a changeset; the response reports a per-record outcome
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, RemoteError>;
}

/// Trip log endpoints
#[async_trait]
pub trait TripTransport: Send + Sync {
    /// Create a trip; returns the server id
    async fn create_trip(&self, trip: &TripRecord) -> Result<String, RemoteError>;

    /// Replace a trip the server already knows
    async fn update_trip(&self, server_id: &str, trip: &TripRecord) -> Result<String, RemoteError>;

    /// Delete a trip by its client-generated id. A trip the server never
    /// had or no longer has counts as deleted.
    async fn delete_trip(&self, trip_id: &Uuid) -> Result<(), RemoteError>;
}

/// Login and signup endpoints
#[async_trait]
pub trait AccountTransport: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, RemoteError>;

    async fn signup(&self, form: &SignupForm) -> Result<AuthResponse, RemoteError>;
}

/// Reference table endpoints
#[async_trait]
pub trait LookupTransport: Send + Sync {
    async fn trip_statuses(&self) -> Result<Vec<LookupEntry>, RemoteError>;
}

/// Best-effort position telemetry
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn track_location(&self, sample: &PositionSample) -> Result<(), RemoteError>;
}

/// Cheap reachability check
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health(&self) -> Result<(), RemoteError>;
}

/// Everything a sync cycle talks to
pub trait RemoteApi: SyncTransport + TripTransport + AccountTransport + LookupTransport {}

impl<T> RemoteApi for T where T: SyncTransport + TripTransport + AccountTransport + LookupTransport {}

/// Body of `POST /locations/track`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
}

impl From<&PositionSample> for TrackRequest {
    fn from(sample: &PositionSample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.speed_kmh,
            accuracy: sample.accuracy_m,
        }
    }
}

/// Server id in a create/update response; some deployments send numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: ServerId,
}

impl From<ServerId> for String {
    fn from(id: ServerId) -> Self {
        match id {
            ServerId::Text(text) => text,
            ServerId::Number(number) => number.to_string(),
        }
    }
}

/// HTTP implementation of every transport trait
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: Config,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: Config) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.app().request_timeout())
            .build()
            .map_err(|e| RemoteError::offline(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.get_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorized(request).send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Turn a non-2xx response into the matching error
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() { status.to_string() } else { body };
    Err(RemoteError::from_status(status.as_u16(), message))
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn pull(&self, since: Option<Millis>) -> Result<PullResponse, RemoteError> {
        let url = match since {
            Some(cursor) => format!("{}?lastPulledAt={cursor}", self.config.api_url("/sync/pull")),
            None => self.config.api_url("/sync/pull"),
        };
        tracing::debug!(?since, "pulling changes");
        self.send_json(self.client.get(url)).await
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse, RemoteError> {
        let url = self.config.api_url("/sync/push");
        self.send_json(self.client.post(url).json(request)).await
    }
}

#[async_trait]
impl TripTransport for HttpTransport {
    async fn create_trip(&self, trip: &TripRecord) -> Result<String, RemoteError> {
        let url = self.config.api_url("/trip_logs");
        let response: IdResponse = self
            .send_json(self.client.post(url).multipart(trip_form(trip)))
            .await?;
        Ok(response.id.into())
    }

    async fn update_trip(&self, server_id: &str, trip: &TripRecord) -> Result<String, RemoteError> {
        let url = self.config.api_url(&format!("/trip_logs/{server_id}"));
        let response = self.send(self.client.put(url).multipart(trip_form(trip))).await?;
        // Some deployments answer an update with an empty body
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(server_id.to_string());
        }
        let parsed: IdResponse =
            serde_json::from_str(&body).map_err(|e| RemoteError::malformed(e.to_string()))?;
        Ok(parsed.id.into())
    }

    async fn delete_trip(&self, trip_id: &Uuid) -> Result<(), RemoteError> {
        let url = self.config.api_url(&format!("/trip_logs/{trip_id}"));
        let response = self.authorized(self.client.delete(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(%trip_id, "trip not on server");
            return Ok(());
        }
        check_status(response).await.map(|_| ())
    }
}

#[async_trait]
impl AccountTransport for HttpTransport {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, RemoteError> {
        let url = self.config.api_url("/login");
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn signup(&self, form: &SignupForm) -> Result<AuthResponse, RemoteError> {
        let url = self.config.api_url("/signup");
        self.send_json(self.client.post(url).json(form)).await
    }
}

#[async_trait]
impl LookupTransport for HttpTransport {
    async fn trip_statuses(&self) -> Result<Vec<LookupEntry>, RemoteError> {
        let url = self.config.api_url("/trip_statuses");
        self.send_json(self.client.get(url)).await
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn track_location(&self, sample: &PositionSample) -> Result<(), RemoteError> {
        let url = self.config.api_url("/locations/track");
        self.send(self.client.post(url).json(&TrackRequest::from(sample)))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl HealthCheck for HttpTransport {
    async fn health(&self) -> Result<(), RemoteError> {
        let url = self.config.api_url("/health");
        // Any HTTP answer proves the server is reachable
        let response = self.client.get(url).send().await?;
        tracing::trace!(status = %response.status(), "health probe answered");
        Ok(())
    }
}

/// Named text fields of a trip upload. Absent optional fields are omitted.
pub fn trip_fields(trip: &TripRecord) -> Vec<(&'static str, String)> {
    let p = &trip.payload;
    let mut fields = vec![
        ("trip_id", trip.trip_id.to_string()),
        ("date", p.date.clone()),
    ];
    let optional = [
        ("start_time", p.start_time.clone()),
        ("end_time", p.end_time.clone()),
        ("odometer_start", p.odometer_start.map(|v| v.to_string())),
        ("odometer_end", p.odometer_end.map(|v| v.to_string())),
        ("notes", p.notes.clone()),
        ("purpose", p.purpose.clone()),
        ("vehicle_id", p.vehicle_id.clone()),
        ("driver_id", p.driver_id.clone()),
        ("status_id", p.status_id.clone()),
    ];
    fields.extend(optional.into_iter().filter_map(|(name, value)| value.map(|v| (name, v))));
    fields.push(("timestamp", trip.timestamp.to_string()));
    fields
}

fn trip_form(trip: &TripRecord) -> Form {
    let mut form = Form::new();
    for (name, value) in trip_fields(trip) {
        form = form.text(name, value);
    }
    for attachment in &trip.attachments {
        let part = Part::bytes(attachment.data.clone()).file_name(attachment.file_name.clone());
        let part = match part.mime_str(&attachment.mime_type) {
            Ok(part) => part,
            Err(_) => {
                tracing::warn!(mime = %attachment.mime_type, "invalid attachment MIME type, sending without one");
                Part::bytes(attachment.data.clone()).file_name(attachment.file_name.clone())
            }
        };
        form = form.part(attachment.kind.part_name(), part);
    }
    form
}
