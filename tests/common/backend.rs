//! In-process fake backend
//!
//! Keeps server-side state in memory and answers like the real endpoints, so
//! whole sync cycles can run without HTTP. Connectivity is a switch.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tripsync::client::local_db::TripRecord;
use tripsync::client::remote::{AccountTransport, HealthCheck, LookupTransport, SyncTransport, TripTransport};
use tripsync::client::types::{AuthResponse, LoginRequest, LookupEntry, Profile, SignupForm};
use tripsync::shared::error::RemoteError;
use tripsync::shared::protocol::{
    Millis, PullResponse, PushAck, PushRequest, PushResponse, TableChangeSet, TableChanges, WireRecord,
};
use uuid::Uuid;

/// Server-side state
#[derive(Debug, Default)]
pub struct BackendState {
    /// Records by table, then server id
    pub records: BTreeMap<String, BTreeMap<String, WireRecord>>,
    /// Server-side changes; a pull returns the ones newer than its cursor.
    /// Deletes are stamped with `pull_timestamp`.
    pub pull_changes: TableChanges,
    pub pull_timestamp: Millis,
    /// Every pull cursor received
    pub pull_cursors: Vec<Option<Millis>>,
    pub pushes: Vec<PushRequest>,
    /// Created records the server silently drops from its answer
    pub unanswered_local_ids: HashSet<String>,
    pub trips: BTreeMap<String, TripRecord>,
    /// Trip ids of every delete received
    pub deleted_trips: Vec<Uuid>,
    pub signups: Vec<SignupForm>,
    pub reject_auth: bool,
    next_id: u64,
}

impl BackendState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    online: AtomicBool,
}

impl FakeBackend {
    pub fn online() -> Self {
        let backend = Self::default();
        backend.set_online(true);
        backend
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    fn reachable(&self) -> Result<MutexGuard<'_, BackendState>, RemoteError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::offline("network unreachable"));
        }
        let state = self.state();
        if state.reject_auth {
            return Err(RemoteError::auth("token expired"));
        }
        Ok(state)
    }
}

#[async_trait]
impl SyncTransport for FakeBackend {
    async fn pull(&self, since: Option<Millis>) -> Result<PullResponse, RemoteError> {
        let mut state = self.reachable()?;
        state.pull_cursors.push(since);
        let timestamp = state.pull_timestamp;
        let newer = |updated_at: Option<Millis>| since.map_or(true, |since| updated_at.unwrap_or(timestamp) > since);

        let mut changes = TableChanges::new();
        for (table, set) in &state.pull_changes {
            let filtered = TableChangeSet {
                created: set.created.iter().filter(|r| newer(r.updated_at)).cloned().collect(),
                updated: set.updated.iter().filter(|r| newer(r.updated_at)).cloned().collect(),
                deleted: if newer(None) { set.deleted.clone() } else { Vec::new() },
            };
            if !filtered.is_empty() {
                changes.insert(table.clone(), filtered);
            }
        }
        Ok(PullResponse { changes, timestamp })
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse, RemoteError> {
        let mut state = self.reachable()?;
        state.pushes.push(request.clone());

        let mut acks = Vec::new();
        for (table, set) in &request.changes {
            for record in &set.created {
                let local_id = record.local_id.clone();
                if local_id.as_ref().is_some_and(|id| state.unanswered_local_ids.contains(id)) {
                    continue;
                }
                let id = state.next_id("srv");
                let mut stored = record.clone();
                stored.id = Some(id.clone());
                state.records.entry(table.clone()).or_default().insert(id.clone(), stored);
                acks.push(PushAck { local_id, id: Some(id) });
            }
            for record in &set.updated {
                let Some(id) = record.id.clone() else { continue };
                state.records.entry(table.clone()).or_default().insert(id.clone(), record.clone());
                acks.push(PushAck {
                    local_id: record.local_id.clone(),
                    id: Some(id),
                });
            }
            for id in &set.deleted {
                if let Some(rows) = state.records.get_mut(table) {
                    rows.remove(id);
                }
                acks.push(PushAck {
                    local_id: None,
                    id: Some(id.clone()),
                });
            }
        }
        Ok(PushResponse {
            acks,
            rejected: Vec::new(),
        })
    }
}

#[async_trait]
impl TripTransport for FakeBackend {
    async fn create_trip(&self, trip: &TripRecord) -> Result<String, RemoteError> {
        let mut state = self.reachable()?;
        let id = state.next_id("trip");
        state.trips.insert(id.clone(), trip.clone());
        Ok(id)
    }

    async fn update_trip(&self, server_id: &str, trip: &TripRecord) -> Result<String, RemoteError> {
        let mut state = self.reachable()?;
        state.trips.insert(server_id.to_string(), trip.clone());
        Ok(server_id.to_string())
    }

    async fn delete_trip(&self, trip_id: &Uuid) -> Result<(), RemoteError> {
        let mut state = self.reachable()?;
        state.trips.retain(|_, trip| trip.trip_id != *trip_id);
        state.deleted_trips.push(*trip_id);
        Ok(())
    }
}

#[async_trait]
impl AccountTransport for FakeBackend {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, RemoteError> {
        self.reachable()?;
        Ok(AuthResponse {
            token: Some(format!("token-{}", request.identifier)),
            user: Profile {
                id: Some(format!("user-{}", request.identifier)),
                username: request.identifier.clone(),
                ..Default::default()
            },
        })
    }

    async fn signup(&self, form: &SignupForm) -> Result<AuthResponse, RemoteError> {
        let mut state = self.reachable()?;
        state.signups.push(form.clone());
        let id = state.next_id("user");
        Ok(AuthResponse {
            token: None,
            user: Profile {
                id: Some(id),
                username: form.identifier.clone(),
                display_name: form.display_name.clone(),
                email: form.email.clone(),
            },
        })
    }
}

#[async_trait]
impl LookupTransport for FakeBackend {
    async fn trip_statuses(&self) -> Result<Vec<LookupEntry>, RemoteError> {
        self.reachable()?;
        Ok(vec![LookupEntry {
            id: "1".into(),
            name: "completed".into(),
            extra: Default::default(),
        }])
    }
}

#[async_trait]
impl HealthCheck for FakeBackend {
    async fn health(&self) -> Result<(), RemoteError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::offline("network unreachable"))
        }
    }
}
