use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::analyzer::analyze_csv;
use crate::auth::{
    generate_salt, generate_session_token, hash_password, validate_registration, verify_password,
};
use crate::config::{ServiceConfig, StorageBackend};
use crate::database::DatabaseManager;
use crate::domain::{
    Dataset, DatasetSummary, NewDatasetEntry, NewUser, Session, User, MAX_FILE_NAME_LEN,
    RETENTION_LIMIT,
};
use crate::error::ServiceError;
use crate::report::{render_report, RenderedReport};
use crate::store::{AccountStore, DatasetStore, MemoryStore};
use crate::validator::validate_csv;

pub struct EquipmentEngine {
    datasets: Arc<dyn DatasetStore>,
    accounts: Arc<dyn AccountStore>,
    session_ttl: Duration,
}

impl EquipmentEngine {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        accounts: Arc<dyn AccountStore>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            datasets,
            accounts,
            session_ttl,
        }
    }

    pub fn in_memory(session_ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store, session_ttl)
    }

    pub async fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        info!("Initializing Equipment Engine");
        let session_ttl = Duration::try_hours(config.session_ttl_hours).ok_or_else(|| {
            ServiceError::ConfigError {
                message: format!("Invalid session TTL: {}h", config.session_ttl_hours),
            }
        })?;

        let engine = match config.storage_backend {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; data is lost on shutdown");
                Self::in_memory(session_ttl)
            }
            StorageBackend::Postgres => {
                let database_url =
                    config
                        .database_url
                        .as_deref()
                        .ok_or_else(|| ServiceError::ConfigError {
                            message: "DATABASE_URL is required for the postgres backend"
                                .to_string(),
                        })?;
                let database = Arc::new(
                    DatabaseManager::new(database_url, config.database_max_connections).await?,
                );
                Self::new(database.clone(), database, session_ttl)
            }
        };

        info!("Equipment Engine initialized successfully");
        Ok(engine)
    }

    /// Validate → analyze → store (with retention pruning) for one upload.
    pub async fn upload(
        &self,
        owner: &User,
        file_name: &str,
        contents: &[u8],
    ) -> Result<Dataset, ServiceError> {
        if !file_name.ends_with(".csv") {
            return Err(ServiceError::InvalidUpload {
                message: "File must be a CSV".to_string(),
            });
        }
        if file_name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(ServiceError::InvalidUpload {
                message: format!(
                    "File name must be at most {} characters",
                    MAX_FILE_NAME_LEN
                ),
            });
        }

        validate_csv(contents)?;
        let (summary, raw_data) = analyze_csv(contents)?;

        let dataset = self
            .datasets
            .create(NewDatasetEntry {
                owner: owner.id,
                file_name: file_name.to_string(),
                summary,
                raw_data,
            })
            .await?;

        info!(
            "User {} uploaded {} as dataset {} ({} rows)",
            owner.username,
            file_name,
            dataset.id,
            dataset.raw_data.len()
        );
        Ok(dataset)
    }

    pub async fn latest(&self, owner: &User) -> Result<Dataset, ServiceError> {
        self.datasets
            .latest(owner.id)
            .await?
            .ok_or(ServiceError::NoDatasets)
    }

    pub async fn history(&self, owner: &User) -> Result<Vec<DatasetSummary>, ServiceError> {
        self.datasets.history(owner.id, RETENTION_LIMIT).await
    }

    pub async fn dataset(&self, owner: &User, dataset_id: i64) -> Result<Dataset, ServiceError> {
        self.datasets
            .get(owner.id, dataset_id)
            .await?
            .ok_or_else(|| ServiceError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            })
    }

    /// Renders the given dataset, or the owner's latest when no id is passed.
    pub async fn report(
        &self,
        owner: &User,
        dataset_id: Option<i64>,
    ) -> Result<RenderedReport, ServiceError> {
        let dataset = match dataset_id {
            Some(id) => self.dataset(owner, id).await?,
            None => self.latest(owner).await?,
        };

        let generated_at = Utc::now();
        tokio::task::spawn_blocking(move || render_report(&dataset, generated_at))
            .await
            .map_err(|e| ServiceError::Report {
                message: e.to_string(),
            })?
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<User, ServiceError> {
        validate_registration(username, password, email)?;

        let salt = generate_salt();
        self.accounts
            .create_user(NewUser {
                username: username.to_string(),
                email: email.filter(|e| !e.is_empty()).map(str::to_string),
                password_hash: hash_password(password, &salt),
                password_salt: salt,
            })
            .await
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(User, Session), ServiceError> {
        let user = self
            .accounts
            .find_user_by_username(username)
            .await?
            .filter(|user| verify_password(user, password))
            .ok_or(ServiceError::InvalidCredentials)?;

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| ServiceError::InternalError {
                message: "session expiry is out of range".to_string(),
            })?;
        let session = Session {
            token: generate_session_token(),
            user_id: user.id,
            created_at: now,
            expires_at,
        };
        self.accounts.create_session(session.clone()).await?;

        info!("User {} logged in", user.username);
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        self.accounts.delete_session(token).await
    }

    /// Looks up the user behind a session token; expired sessions are discarded.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<User>, ServiceError> {
        let Some(session) = self.accounts.find_session(token).await? else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            self.accounts.delete_session(token).await?;
            return Ok(None);
        }

        self.accounts.find_user(session.user_id).await
    }
}
