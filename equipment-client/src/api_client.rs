use std::path::Path;

use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::models::{
    AccountResponse, AuthStatus, Credentials, Dataset, DatasetSummary, Health, Registration,
    Report,
};

/// HTTP client for the equipment service. The session cookie set by `login`
/// is kept in the client's cookie store for later calls.
#[derive(Debug, Clone)]
pub struct EquipmentApiClient {
    http: Client,
    base_url: String,
}

impl EquipmentApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());

        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::from_response(status.as_u16(), &body))
        }
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        Ok(self.send(request).await?.json().await?)
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        self.json(self.http.get(self.url("health"))).await
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<AccountResponse, ClientError> {
        let body = Registration {
            username,
            password,
            email,
        };
        self.json(self.http.post(self.url("register")).json(&body))
            .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AccountResponse, ClientError> {
        let body = Credentials { username, password };
        let account: AccountResponse = self
            .json(self.http.post(self.url("login")).json(&body))
            .await?;
        info!("Logged in as {}", account.username);
        Ok(account)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.send(self.http.post(self.url("logout"))).await?;
        Ok(())
    }

    pub async fn check_auth(&self) -> Result<AuthStatus, ClientError> {
        self.json(self.http.get(self.url("check-auth"))).await
    }

    pub async fn upload(&self, path: &Path) -> Result<Dataset, ClientError> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());

        info!("Uploading {} ({} bytes)", file_name, contents.len());
        let part = Part::bytes(contents)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        self.json(self.http.post(self.url("upload")).multipart(form))
            .await
    }

    pub async fn summary(&self) -> Result<Dataset, ClientError> {
        self.json(self.http.get(self.url("summary"))).await
    }

    pub async fn history(&self) -> Result<Vec<DatasetSummary>, ClientError> {
        self.json(self.http.get(self.url("history"))).await
    }

    pub async fn dataset(&self, dataset_id: i64) -> Result<Dataset, ClientError> {
        self.json(self.http.get(self.url(&format!("dataset/{}", dataset_id))))
            .await
    }

    /// Downloads the PDF for a dataset, or for the latest one when `dataset_id` is `None`.
    pub async fn report(&self, dataset_id: Option<i64>) -> Result<Report, ClientError> {
        let path = match dataset_id {
            Some(id) => format!("report/{}", id),
            None => "report".to_string(),
        };
        let response = self.send(self.http.get(self.url(&path))).await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_file_name)
            .unwrap_or_else(|| "equipment_report.pdf".to_string());
        let bytes = response.bytes().await?.to_vec();

        Ok(Report { file_name, bytes })
    }
}

fn attachment_file_name(disposition: &str) -> Option<String> {
    disposition
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}
