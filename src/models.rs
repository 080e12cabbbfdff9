use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::domain::{Dataset, DatasetSummary, Session, User};
use crate::error::ServiceError;
use crate::schema::{datasets, sessions, users};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(primary_key(id))]
pub struct DatasetModel {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub summary: serde_json::Value,
    pub raw_data: serde_json::Value,
}

/// Row projection used by history listings; never loads `raw_data`.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = datasets)]
pub struct DatasetSummaryModel {
    pub id: i64,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub summary: serde_json::Value,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDatasetModel<'a> {
    pub owner_id: Option<i64>,
    pub file_name: &'a str,
    pub uploaded_at: DateTime<Utc>,
    pub summary: &'a serde_json::Value,
    pub raw_data: &'a serde_json::Value,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(primary_key(id))]
pub struct UserModel {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub password_salt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUserModel<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub password_salt: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = sessions)]
pub struct SessionModel {
    pub token: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<DatasetModel> for Dataset {
    type Error = ServiceError;

    fn try_from(model: DatasetModel) -> Result<Self, Self::Error> {
        Ok(Dataset {
            id: model.id,
            owner: model.owner_id,
            uploaded_at: model.uploaded_at,
            file_name: model.file_name,
            summary: serde_json::from_value(model.summary)?,
            raw_data: serde_json::from_value(model.raw_data)?,
        })
    }
}

impl TryFrom<DatasetSummaryModel> for DatasetSummary {
    type Error = ServiceError;

    fn try_from(model: DatasetSummaryModel) -> Result<Self, Self::Error> {
        Ok(DatasetSummary {
            id: model.id,
            uploaded_at: model.uploaded_at,
            file_name: model.file_name,
            summary: serde_json::from_value(model.summary)?,
        })
    }
}

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        User {
            id: model.id,
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            password_salt: model.password_salt,
            created_at: model.created_at,
        }
    }
}

impl From<SessionModel> for Session {
    fn from(model: SessionModel) -> Self {
        Session {
            token: model.token,
            user_id: model.user_id,
            created_at: model.created_at,
            expires_at: model.expires_at,
        }
    }
}

impl From<Session> for SessionModel {
    fn from(session: Session) -> Self {
        SessionModel {
            token: session.token,
            user_id: session.user_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}
