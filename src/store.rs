//! Repository interfaces for datasets and accounts, plus the in-memory backend.
//!
//! Both backends order datasets by `uploaded_at` descending and break ties on
//! `id` descending, so retention never keeps more than [`RETENTION_LIMIT`]
//! rows for an owner after an upload.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    Dataset, DatasetSummary, NewDatasetEntry, NewUser, Session, User, UserId, RETENTION_LIMIT,
};
use crate::error::ServiceError;

#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Inserts a dataset and prunes the owner's datasets down to the retention window.
    async fn create(&self, entry: NewDatasetEntry) -> Result<Dataset, ServiceError>;

    async fn latest(&self, owner: UserId) -> Result<Option<Dataset>, ServiceError>;

    async fn history(
        &self,
        owner: UserId,
        limit: usize,
    ) -> Result<Vec<DatasetSummary>, ServiceError>;

    /// Returns `None` both when the id is unknown and when it belongs to another owner.
    async fn get(&self, owner: UserId, id: i64) -> Result<Option<Dataset>, ServiceError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with a username field error when the name is already taken.
    async fn create_user(&self, user: NewUser) -> Result<User, ServiceError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, ServiceError>;

    async fn create_session(&self, session: Session) -> Result<(), ServiceError>;

    async fn find_session(&self, token: &str) -> Result<Option<Session>, ServiceError>;

    async fn delete_session(&self, token: &str) -> Result<(), ServiceError>;
}

pub(crate) fn clamp_history_limit(limit: usize) -> usize {
    limit.clamp(1, RETENTION_LIMIT)
}

pub(crate) fn duplicate_username_error() -> ServiceError {
    let mut errors = std::collections::BTreeMap::new();
    errors.insert(
        "username".to_string(),
        vec!["A user with that username already exists.".to_string()],
    );
    ServiceError::FieldErrors { errors }
}

fn recency_key(dataset: &Dataset) -> (DateTime<Utc>, i64) {
    (dataset.uploaded_at, dataset.id)
}

#[derive(Default)]
struct MemoryState {
    next_dataset_id: i64,
    next_user_id: i64,
    datasets: Vec<Dataset>,
    users: HashMap<UserId, User>,
    sessions: HashMap<String, Session>,
}

/// Process-local store used by tests and the `memory` storage backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_by_recency(state: &MemoryState, owner: UserId) -> Vec<&Dataset> {
        let mut owned: Vec<&Dataset> = state
            .datasets
            .iter()
            .filter(|d| d.owner == Some(owner))
            .collect();
        owned.sort_by(|a, b| recency_key(b).cmp(&recency_key(a)));
        owned
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn create(&self, entry: NewDatasetEntry) -> Result<Dataset, ServiceError> {
        let mut state = self.state.write().await;
        state.next_dataset_id += 1;

        let dataset = Dataset {
            id: state.next_dataset_id,
            owner: Some(entry.owner),
            uploaded_at: Utc::now(),
            file_name: entry.file_name,
            summary: entry.summary,
            raw_data: entry.raw_data,
        };
        state.datasets.push(dataset.clone());

        let keep: Vec<i64> = Self::owned_by_recency(&state, entry.owner)
            .into_iter()
            .take(RETENTION_LIMIT)
            .map(|d| d.id)
            .collect();
        let before = state.datasets.len();
        state
            .datasets
            .retain(|d| d.owner != Some(entry.owner) || keep.contains(&d.id));

        debug!(
            "Stored dataset {} for owner {}, pruned {}",
            dataset.id,
            entry.owner,
            before - state.datasets.len()
        );
        Ok(dataset)
    }

    async fn latest(&self, owner: UserId) -> Result<Option<Dataset>, ServiceError> {
        let state = self.state.read().await;
        Ok(Self::owned_by_recency(&state, owner)
            .first()
            .map(|d| (*d).clone()))
    }

    async fn history(
        &self,
        owner: UserId,
        limit: usize,
    ) -> Result<Vec<DatasetSummary>, ServiceError> {
        let state = self.state.read().await;
        Ok(Self::owned_by_recency(&state, owner)
            .into_iter()
            .take(clamp_history_limit(limit))
            .map(DatasetSummary::from)
            .collect())
    }

    async fn get(&self, owner: UserId, id: i64) -> Result<Option<Dataset>, ServiceError> {
        let state = self.state.read().await;
        Ok(state
            .datasets
            .iter()
            .find(|d| d.id == id && d.owner == Some(owner))
            .cloned())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, ServiceError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(duplicate_username_error());
        }

        state.next_user_id += 1;
        let created = User {
            id: state.next_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            password_salt: user.password_salt,
            created_at: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, ServiceError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn create_session(&self, session: Session) -> Result<(), ServiceError> {
        self.state
            .write()
            .await
            .sessions
            .insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        Ok(self.state.read().await.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<(), ServiceError> {
        self.state.write().await.sessions.remove(token);
        Ok(())
    }
}
