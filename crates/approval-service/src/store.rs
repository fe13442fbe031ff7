//! Request storage
//!
//! Keyed store for image requests behind the `RequestStore` trait; callers
//! never see the backing, which today is process-local memory.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{NewRequest, Request, RequestStatus, RequestUpdate};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request not found: {0}")]
    NotFound(String),

    #[error("request {id} is {current}, expected {expected}")]
    InvalidState {
        id: String,
        current: RequestStatus,
        expected: RequestStatus,
    },
}

/// Storage operations for image requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new pending request, assigning its id and timestamps.
    async fn create(&self, new: NewRequest) -> Request;

    async fn get(&self, id: &str) -> Result<Request, StoreError>;

    /// Merge `changes` into the request.
    async fn update(&self, id: &str, changes: RequestUpdate) -> Result<Request, StoreError>;

    /// Merge `changes` only if the request's status is still `expected`,
    /// as one atomic step. This is what makes concurrent approve/reject
    /// races resolve to exactly one winner.
    async fn transition(
        &self,
        id: &str,
        expected: RequestStatus,
        changes: RequestUpdate,
    ) -> Result<Request, StoreError>;

    /// All requests, newest first.
    async fn list_all(&self) -> Vec<Request>;

    /// Requests submitted by one user, newest first.
    async fn list_by_user(&self, user_id: &str) -> Vec<Request>;

    /// Requests currently in one status, newest first.
    async fn list_by_status(&self, status: RequestStatus) -> Vec<Request>;

    /// Remove a request; false when it never existed.
    async fn delete(&self, id: &str) -> bool;
}

/// In-memory request store.
pub struct MemoryRequestStore {
    requests: RwLock<HashMap<String, Request>>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn create(&self, new: NewRequest) -> Request {
        let request = Request::new(format!("req-{}", Uuid::new_v4()), new);
        let mut requests = self.requests.write().await;
        requests.insert(request.id.clone(), request.clone());
        debug!("Stored request: {} ({})", request.id, request.image_name);
        request
    }

    async fn get(&self, id: &str) -> Result<Request, StoreError> {
        let requests = self.requests.read().await;
        requests
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, changes: RequestUpdate) -> Result<Request, StoreError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        changes.apply(request);
        debug!("Updated request: {} status: {}", request.id, request.status);
        Ok(request.clone())
    }

    async fn transition(
        &self,
        id: &str,
        expected: RequestStatus,
        changes: RequestUpdate,
    ) -> Result<Request, StoreError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if request.status != expected {
            return Err(StoreError::InvalidState {
                id: id.to_string(),
                current: request.status,
                expected,
            });
        }
        changes.apply(request);
        debug!("Transitioned request: {} to {}", request.id, request.status);
        Ok(request.clone())
    }

    async fn list_all(&self) -> Vec<Request> {
        let requests = self.requests.read().await;
        let mut all: Vec<Request> = requests.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    async fn list_by_user(&self, user_id: &str) -> Vec<Request> {
        let requests = self.requests.read().await;
        let mut mine: Vec<Request> = requests
            .values()
            .filter(|r| r.requester_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine
    }

    async fn list_by_status(&self, status: RequestStatus) -> Vec<Request> {
        let requests = self.requests.read().await;
        let mut matching: Vec<Request> = requests
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }

    async fn delete(&self, id: &str) -> bool {
        let mut requests = self.requests.write().await;
        requests.remove(id).is_some()
    }
}
