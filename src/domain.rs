use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

pub const COLUMN_EQUIPMENT_NAME: &str = "Equipment Name";
pub const COLUMN_TYPE: &str = "Type";
pub const COLUMN_FLOWRATE: &str = "Flowrate";
pub const COLUMN_PRESSURE: &str = "Pressure";
pub const COLUMN_TEMPERATURE: &str = "Temperature";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    COLUMN_EQUIPMENT_NAME,
    COLUMN_TYPE,
    COLUMN_FLOWRATE,
    COLUMN_PRESSURE,
    COLUMN_TEMPERATURE,
];

pub const NUMERIC_COLUMNS: [&str; 3] = [COLUMN_FLOWRATE, COLUMN_PRESSURE, COLUMN_TEMPERATURE];

/// Number of datasets kept per owner.
pub const RETENTION_LIMIT: usize = 5;

/// Length limit of `datasets.file_name`, in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;

pub type UserId = i64;

/// Aggregate statistics for one upload.
///
/// Every field is optional so that summaries written by older versions still
/// deserialize; the analyzer always fills all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_equipment: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_flowrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_distribution: Option<IndexMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_flowrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_flowrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f64>,
}

/// One CSV row restricted to the required columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    #[serde(rename = "Equipment Name")]
    pub equipment_name: String,
    #[serde(rename = "Type")]
    pub equipment_type: String,
    #[serde(rename = "Flowrate")]
    pub flowrate: Number,
    #[serde(rename = "Pressure")]
    pub pressure: Number,
    #[serde(rename = "Temperature")]
    pub temperature: Number,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub id: i64,
    #[serde(skip_serializing)]
    pub owner: Option<UserId>,
    pub uploaded_at: DateTime<Utc>,
    pub file_name: String,
    pub summary: Summary,
    pub raw_data: Vec<EquipmentRecord>,
}

/// History view of a dataset, without the raw rows.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub id: i64,
    pub uploaded_at: DateTime<Utc>,
    pub file_name: String,
    pub summary: Summary,
}

impl From<&Dataset> for DatasetSummary {
    fn from(dataset: &Dataset) -> Self {
        Self {
            id: dataset.id,
            uploaded_at: dataset.uploaded_at,
            file_name: dataset.file_name.clone(),
            summary: dataset.summary.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDatasetEntry {
    pub owner: UserId,
    pub file_name: String,
    pub summary: Summary,
    pub raw_data: Vec<EquipmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartAverages {
    pub flowrate: Option<f64>,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub type_distribution: ChartSeries,
    pub averages: ChartAverages,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub password_salt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub password_salt: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
