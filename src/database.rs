use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};

use crate::domain::{
    Dataset, DatasetSummary, NewDatasetEntry, NewUser, Session, User, UserId, RETENTION_LIMIT,
};
use crate::error::ServiceError;
use crate::models::*;
use crate::schema::*;
use crate::store::{clamp_history_limit, duplicate_username_error, AccountStore, DatasetStore};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<AsyncPgConnection>,
}

impl DatabaseManager {
    pub async fn new(database_url: &str, max_connections: usize) -> Result<Self, ServiceError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .max_size(max_connections)
            .build()
            .map_err(|e| ServiceError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        let manager = Self { pool };
        manager.run_migrations(database_url).await?;

        Ok(manager)
    }

    pub async fn run_migrations(&self, database_url: &str) -> Result<(), ServiceError> {
        use diesel::Connection;
        use diesel::PgConnection;

        // diesel_migrations only drives synchronous connections
        let database_url = database_url.to_string();
        tokio::task::spawn_blocking(move || {
            let mut connection = PgConnection::establish(&database_url).map_err(|e| {
                ServiceError::ConfigError {
                    message: format!("Failed to establish connection for migrations: {}", e),
                }
            })?;

            let applied = connection
                .run_pending_migrations(MIGRATIONS)
                .map_err(|e| ServiceError::ConfigError {
                    message: format!("Failed to run migrations: {}", e),
                })?;
            info!("Applied {} pending migrations", applied.len());
            Ok(())
        })
        .await
        .map_err(|e| ServiceError::InternalError {
            message: format!("Migration task failed: {}", e),
        })?
    }

    async fn connection(&self) -> Result<Object<AsyncPgConnection>, ServiceError> {
        self.pool.get().await.map_err(|e| ServiceError::Database {
            message: format!("Failed to get database connection: {}", e),
        })
    }
}

#[async_trait]
impl DatasetStore for DatabaseManager {
    async fn create(&self, entry: NewDatasetEntry) -> Result<Dataset, ServiceError> {
        info!(
            "Storing dataset {} for owner {}",
            entry.file_name, entry.owner
        );
        let summary_json = serde_json::to_value(&entry.summary)?;
        let raw_json = serde_json::to_value(&entry.raw_data)?;
        let owner = entry.owner;

        let new_dataset = NewDatasetModel {
            owner_id: Some(owner),
            file_name: &entry.file_name,
            uploaded_at: Utc::now(),
            summary: &summary_json,
            raw_data: &raw_json,
        };

        let mut conn = self.connection().await?;
        let inserted = conn
            .transaction::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    let inserted = diesel::insert_into(datasets::table)
                        .values(&new_dataset)
                        .returning(DatasetModel::as_returning())
                        .get_result::<DatasetModel>(conn)
                        .await?;

                    let stale: Vec<i64> = datasets::table
                        .filter(datasets::owner_id.eq(owner))
                        .order((datasets::uploaded_at.desc(), datasets::id.desc()))
                        .offset(RETENTION_LIMIT as i64)
                        .select(datasets::id)
                        .load::<i64>(conn)
                        .await?;

                    if !stale.is_empty() {
                        let removed =
                            diesel::delete(datasets::table.filter(datasets::id.eq_any(&stale)))
                                .execute(conn)
                                .await?;
                        debug!("Pruned {} datasets for owner {}", removed, owner);
                    }

                    Ok(inserted)
                })
            })
            .await?;

        Dataset::try_from(inserted)
    }

    async fn latest(&self, owner: UserId) -> Result<Option<Dataset>, ServiceError> {
        let mut conn = self.connection().await?;

        let dataset = datasets::table
            .filter(datasets::owner_id.eq(owner))
            .order((datasets::uploaded_at.desc(), datasets::id.desc()))
            .select(DatasetModel::as_select())
            .first::<DatasetModel>(&mut conn)
            .await
            .optional()?;

        dataset.map(Dataset::try_from).transpose()
    }

    async fn history(
        &self,
        owner: UserId,
        limit: usize,
    ) -> Result<Vec<DatasetSummary>, ServiceError> {
        let mut conn = self.connection().await?;

        let rows = datasets::table
            .filter(datasets::owner_id.eq(owner))
            .order((datasets::uploaded_at.desc(), datasets::id.desc()))
            .limit(clamp_history_limit(limit) as i64)
            .select(DatasetSummaryModel::as_select())
            .load::<DatasetSummaryModel>(&mut conn)
            .await?;

        rows.into_iter().map(DatasetSummary::try_from).collect()
    }

    async fn get(&self, owner: UserId, id: i64) -> Result<Option<Dataset>, ServiceError> {
        let mut conn = self.connection().await?;

        let dataset = datasets::table
            .filter(datasets::id.eq(id))
            .filter(datasets::owner_id.eq(owner))
            .select(DatasetModel::as_select())
            .first::<DatasetModel>(&mut conn)
            .await
            .optional()?;

        dataset.map(Dataset::try_from).transpose()
    }
}

#[async_trait]
impl AccountStore for DatabaseManager {
    async fn create_user(&self, user: NewUser) -> Result<User, ServiceError> {
        let mut conn = self.connection().await?;

        let new_user = NewUserModel {
            username: &user.username,
            email: user.email.as_deref(),
            password_hash: &user.password_hash,
            password_salt: &user.password_salt,
            created_at: Utc::now(),
        };

        let created = diesel::insert_into(users::table)
            .values(&new_user)
            .returning(UserModel::as_returning())
            .get_result::<UserModel>(&mut conn)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    duplicate_username_error()
                }
                other => ServiceError::from(other),
            })?;

        info!("Registered user {}", created.username);
        Ok(created.into())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let mut conn = self.connection().await?;

        let user = users::table
            .filter(users::username.eq(username))
            .select(UserModel::as_select())
            .first::<UserModel>(&mut conn)
            .await
            .optional()?;

        Ok(user.map(User::from))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, ServiceError> {
        let mut conn = self.connection().await?;

        let user = users::table
            .find(id)
            .select(UserModel::as_select())
            .first::<UserModel>(&mut conn)
            .await
            .optional()?;

        Ok(user.map(User::from))
    }

    async fn create_session(&self, session: Session) -> Result<(), ServiceError> {
        let mut conn = self.connection().await?;

        diesel::insert_into(sessions::table)
            .values(SessionModel::from(session))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        let mut conn = self.connection().await?;

        let session = sessions::table
            .find(token)
            .select(SessionModel::as_select())
            .first::<SessionModel>(&mut conn)
            .await
            .optional()?;

        Ok(session.map(Session::from))
    }

    async fn delete_session(&self, token: &str) -> Result<(), ServiceError> {
        let mut conn = self.connection().await?;

        diesel::delete(sessions::table.find(token))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
