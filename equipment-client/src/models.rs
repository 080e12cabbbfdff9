use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Summary {
    pub total_equipment: Option<u64>,
    pub average_flowrate: Option<f64>,
    pub average_pressure: Option<f64>,
    pub average_temperature: Option<f64>,
    pub min_flowrate: Option<f64>,
    pub max_flowrate: Option<f64>,
    pub min_pressure: Option<f64>,
    pub max_pressure: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub type_distribution: Option<IndexMap<String, u64>>,
}

/// History entry; the service omits raw rows here.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSummary {
    pub id: i64,
    pub uploaded_at: DateTime<Utc>,
    pub file_name: String,
    pub summary: Summary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub uploaded_at: DateTime<Utc>,
    pub file_name: String,
    pub summary: Summary,
    #[serde(default)]
    pub raw_data: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub message: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub file_name: String,
    pub bytes: Vec<u8>,
}
