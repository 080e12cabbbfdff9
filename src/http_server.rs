use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{clear_session_cookie, session_cookie, session_token, AuthUser};
use crate::domain::{Dataset, DatasetSummary};
use crate::engine::EquipmentEngine;
use crate::error::ServiceError;

pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EquipmentEngine>,
    pub cookie_secure: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub message: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub struct HttpServer {
    state: AppState,
    max_upload_bytes: usize,
}

impl HttpServer {
    pub fn new(engine: Arc<EquipmentEngine>, cookie_secure: bool, max_upload_bytes: usize) -> Self {
        Self {
            state: AppState {
                engine,
                cookie_secure,
            },
            max_upload_bytes,
        }
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/health", get(health_check))
            .route("/login", post(login))
            .route("/register", post(register))
            .route("/logout", post(logout))
            .route("/check-auth", get(check_auth))
            .route("/upload", post(upload_csv))
            .route("/summary", get(latest_summary))
            .route("/history", get(history))
            .route("/dataset/{id}", get(dataset_by_id))
            .route("/report", get(latest_report))
            .route("/report/{id}", get(report_by_id));

        Router::new()
            .nest("/api", api)
            .layer(DefaultBodyLimit::max(self.max_upload_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn start(
        &self,
        addr: SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServiceError> {
        info!("Starting HTTP server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Dataset ids that are not integers are reported like unknown ids.
fn dataset_id(path: Result<Path<String>, PathRejection>) -> Result<i64, ServiceError> {
    let Path(raw) = path.map_err(|rejection| ServiceError::BadRequest {
        message: rejection.body_text(),
    })?;
    raw.parse()
        .map_err(|_| ServiceError::DatasetNotFound { dataset_id: raw })
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::BadRequest {
            message: rejection.body_text(),
        })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: SERVICE_VERSION.to_string(),
    })
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AccountResponse>), ServiceError> {
    let request = json_body(payload)?;
    let (username, password) = match (request.username, request.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => {
            return Err(ServiceError::BadRequest {
                message: "Username and password are required".to_string(),
            })
        }
    };

    let (user, session) = state.engine.login(&username, &password).await?;
    if let Some(previous) = session_token(&jar) {
        state.engine.logout(&previous).await?;
    }
    let jar = jar.add(session_cookie(session.token, state.cookie_secure));

    Ok((
        jar,
        Json(AccountResponse {
            message: "Login successful".to_string(),
            username: user.username,
        }),
    ))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccountResponse>), ServiceError> {
    let request = json_body(payload)?;
    let user = state
        .engine
        .register(
            request.username.as_deref().unwrap_or("").trim(),
            request.password.as_deref().unwrap_or(""),
            request.email.as_deref().map(str::trim),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "Registration successful".to_string(),
            username: user.username,
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ServiceError> {
    state.engine.logout(&auth.token).await?;
    info!("User {} logged out", auth.user.username);

    Ok((
        clear_session_cookie(jar),
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    ))
}

async fn check_auth(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<AuthStatusResponse>, ServiceError> {
    let user = match session_token(&jar) {
        Some(token) => state.engine.resolve_session(&token).await?,
        None => None,
    };

    Ok(Json(AuthStatusResponse {
        authenticated: user.is_some(),
        username: user.map(|u| u.username),
    }))
}

async fn upload_csv(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Dataset>), ServiceError> {
    let mut multipart = multipart.map_err(|rejection| ServiceError::BadRequest {
        message: rejection.body_text(),
    })?;
    let bad_multipart = |e: axum::extract::multipart::MultipartError| ServiceError::BadRequest {
        message: format!("Invalid multipart body: {}", e.body_text()),
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let contents = field.bytes().await.map_err(bad_multipart)?;
        upload = Some((file_name, contents));
        break;
    }

    let (file_name, contents) = upload.ok_or_else(|| ServiceError::InvalidUpload {
        message: "No file provided".to_string(),
    })?;

    let dataset = state
        .engine
        .upload(&auth.user, &file_name, &contents)
        .await?;

    Ok((StatusCode::CREATED, Json(dataset)))
}

async fn latest_summary(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Dataset>, ServiceError> {
    Ok(Json(state.engine.latest(&auth.user).await?))
}

async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<DatasetSummary>>, ServiceError> {
    Ok(Json(state.engine.history(&auth.user).await?))
}

async fn dataset_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Dataset>, ServiceError> {
    let id = dataset_id(path)?;
    Ok(Json(state.engine.dataset(&auth.user, id).await?))
}

async fn latest_report(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ServiceError> {
    render(&state, &auth, None).await
}

async fn report_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, ServiceError> {
    let id = dataset_id(path)?;
    render(&state, &auth, Some(id)).await
}

async fn render(
    state: &AppState,
    auth: &AuthUser,
    dataset_id: Option<i64>,
) -> Result<Response, ServiceError> {
    let report = state
        .engine
        .report(&auth.user, dataset_id)
        .await?;
    info!(
        "Generated report {} for user {}",
        report.file_name, auth.user.username
    );

    let disposition = format!("attachment; filename=\"{}\"", report.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.bytes,
    )
        .into_response())
}
