use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use equipment_service::{EquipmentEngine, HttpServer};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

static INIT: Once = Once::new();

const BOUNDARY: &str = "equipment-test-boundary";
const SAMPLE_CSV: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\n\
P-100,Pump,10,5,25\n\
P-101,Pump,20,5,30\n\
V-1,Valve,5,3,20\n";

fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

fn app() -> Router {
    init_test_logging();
    let engine = Arc::new(EquipmentEngine::in_memory(Duration::hours(1)));
    HttpServer::new(engine, false, 10 * 1024 * 1024).router()
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }
}

async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn upload_request(file_name: &str, contents: &str, cookie: Option<&str>) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
Content-Type: text/csv\r\n\r\n\
{contents}\r\n\
--{BOUNDARY}--\r\n"
    );
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn session_cookie(response: &TestResponse) -> String {
    response
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sessionid="))
        .and_then(|v| v.split(';').next())
        .expect("login should set a session cookie")
        .to_string()
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let registered = send(
        app,
        json_request(
            "POST",
            "/api/register",
            json!({"username": username, "password": "plant-pass-123", "email": format!("{username}@example.com")}),
            None,
        ),
    )
    .await;
    assert_eq!(registered.status, StatusCode::CREATED);

    let login = send(
        app,
        json_request(
            "POST",
            "/api/login",
            json!({"username": username, "password": "plant-pass-123"}),
            None,
        ),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.json()["username"], username);
    session_cookie(&login)
}

#[tokio::test]
async fn test_upload_flow_returns_summary_and_rows() {
    // Given: an authenticated user
    let app = app();
    let cookie = register_and_login(&app, "operator").await;

    // When: uploading the sample file
    let uploaded = send(&app, upload_request("plant.csv", SAMPLE_CSV, Some(&cookie))).await;

    // Then: the full dataset comes back
    assert_eq!(uploaded.status, StatusCode::CREATED);
    let body = uploaded.json();
    assert_eq!(body["file_name"], "plant.csv");
    assert_eq!(body["summary"]["total_equipment"], 3);
    assert_eq!(body["summary"]["type_distribution"], json!({"Pump": 2, "Valve": 1}));
    let average = body["summary"]["average_flowrate"].as_f64().unwrap();
    assert!((average - 35.0 / 3.0).abs() < 1e-9);
    assert_eq!(body["raw_data"].as_array().unwrap().len(), 3);
    assert_eq!(body["raw_data"][0]["Equipment Name"], "P-100");

    // And: the latest summary includes raw rows while history does not
    let summary = send(&app, get("/api/summary", Some(&cookie))).await;
    assert_eq!(summary.status, StatusCode::OK);
    assert_eq!(summary.json()["id"], body["id"]);
    assert!(summary.json().get("raw_data").is_some());

    let history = send(&app, get("/api/history", Some(&cookie))).await;
    assert_eq!(history.status, StatusCode::OK);
    let entries = history.json();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].get("raw_data").is_none());
    assert!(entries[0].get("summary").is_some());
}

#[tokio::test]
async fn test_retention_keeps_last_five_uploads() {
    let app = app();
    let cookie = register_and_login(&app, "retention").await;

    let mut ids = Vec::new();
    for i in 0..6 {
        let uploaded = send(
            &app,
            upload_request(&format!("batch-{i}.csv"), SAMPLE_CSV, Some(&cookie)),
        )
        .await;
        assert_eq!(uploaded.status, StatusCode::CREATED);
        ids.push(uploaded.json()["id"].as_i64().unwrap());
    }

    let history = send(&app, get("/api/history", Some(&cookie))).await.json();
    let kept: Vec<i64> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_i64().unwrap())
        .collect();
    let expected: Vec<i64> = ids[1..].iter().rev().copied().collect();
    assert_eq!(kept, expected);

    let evicted = send(&app, get(&format!("/api/dataset/{}", ids[0]), Some(&cookie))).await;
    assert_eq!(evicted.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_datasets_are_isolated_between_users() {
    let app = app();
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;

    let uploaded = send(&app, upload_request("alice.csv", SAMPLE_CSV, Some(&alice))).await;
    let id = uploaded.json()["id"].as_i64().unwrap();

    let own = send(&app, get(&format!("/api/dataset/{id}"), Some(&alice))).await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.json()["raw_data"].as_array().unwrap().len(), 3);

    let foreign = send(&app, get(&format!("/api/dataset/{id}"), Some(&bob))).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    assert_eq!(foreign.json()["error"], "Dataset not found");

    let foreign_report = send(&app, get(&format!("/api/report/{id}"), Some(&bob))).await;
    assert_eq!(foreign_report.status, StatusCode::NOT_FOUND);

    let bob_summary = send(&app, get("/api/summary", Some(&bob))).await;
    assert_eq!(bob_summary.status, StatusCode::NOT_FOUND);
    assert_eq!(bob_summary.json()["error"], "No datasets uploaded yet");

    let bob_history = send(&app, get("/api/history", Some(&bob))).await;
    assert_eq!(bob_history.json(), json!([]));
}

#[tokio::test]
async fn test_upload_rejections() {
    let app = app();

    // Unauthenticated uploads are refused before validation
    let anonymous = send(&app, upload_request("plant.csv", "not,a,csv", None)).await;
    assert_eq!(anonymous.status, StatusCode::FORBIDDEN);

    let cookie = register_and_login(&app, "validator").await;

    let wrong_extension = send(&app, upload_request("plant.txt", SAMPLE_CSV, Some(&cookie))).await;
    assert_eq!(wrong_extension.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_extension.json()["error"], "File must be a CSV");

    let missing = send(
        &app,
        upload_request(
            "plant.csv",
            "Equipment Name,Type,Flowrate\nP-1,Pump,1\n",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        missing.json()["error"],
        "Missing required columns: Pressure, Temperature"
    );

    let non_numeric = send(
        &app,
        upload_request(
            "plant.csv",
            "Equipment Name,Type,Flowrate,Pressure,Temperature\nP-1,Pump,1,2,hot\n",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(non_numeric.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        non_numeric.json()["error"],
        "Column 'Temperature' must contain only numeric values"
    );

    let header_only = send(
        &app,
        upload_request(
            "plant.csv",
            "Equipment Name,Type,Flowrate,Pressure,Temperature\n",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(header_only.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(header_only.json()["error"]
        .as_str()
        .unwrap()
        .starts_with("Error analyzing CSV"));

    let no_file = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::COOKIE, &cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        )))
        .unwrap();
    let no_file = send(&app, no_file).await;
    assert_eq!(no_file.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_file.json()["error"], "No file provided");

    let history = send(&app, get("/api/history", Some(&cookie))).await.json();
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn test_report_download() {
    let app = app();
    let cookie = register_and_login(&app, "reporter").await;

    let none_yet = send(&app, get("/api/report", Some(&cookie))).await;
    assert_eq!(none_yet.status, StatusCode::NOT_FOUND);

    let uploaded = send(&app, upload_request("plant.csv", SAMPLE_CSV, Some(&cookie))).await;
    let id = uploaded.json()["id"].as_i64().unwrap();

    for uri in ["/api/report".to_string(), format!("/api/report/{id}")] {
        let report = send(&app, get(&uri, Some(&cookie))).await;
        assert_eq!(report.status, StatusCode::OK);
        assert_eq!(report.headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            report.headers[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"equipment_report_{id}.pdf\"").as_str()
        );
        assert!(report.body.starts_with(b"%PDF"));
    }

    let missing = send(&app, get("/api/report/999999", Some(&cookie))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_account_flow() {
    let app = app();

    let anonymous = send(&app, get("/api/check-auth", None)).await;
    assert_eq!(anonymous.json(), json!({"authenticated": false}));

    let cookie = register_and_login(&app, "session-user").await;
    let status = send(&app, get("/api/check-auth", Some(&cookie))).await;
    assert_eq!(
        status.json(),
        json!({"authenticated": true, "username": "session-user"})
    );

    let duplicate = send(
        &app,
        json_request(
            "POST",
            "/api/register",
            json!({"username": "session-user", "password": "plant-pass-123"}),
            None,
        ),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert!(duplicate.json()["errors"]["username"].is_array());

    let weak = send(
        &app,
        json_request(
            "POST",
            "/api/register",
            json!({"username": "weak", "password": "123"}),
            None,
        ),
    )
    .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert!(weak.json()["errors"]["password"].is_array());

    let bad_login = send(
        &app,
        json_request(
            "POST",
            "/api/login",
            json!({"username": "session-user", "password": "wrong-password"}),
            None,
        ),
    )
    .await;
    assert_eq!(bad_login.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad_login.json()["error"], "Invalid credentials");

    let incomplete = send(
        &app,
        json_request("POST", "/api/login", json!({"username": "session-user"}), None),
    )
    .await;
    assert_eq!(incomplete.status, StatusCode::BAD_REQUEST);

    let logout = send(&app, json_request("POST", "/api/logout", json!({}), Some(&cookie))).await;
    assert_eq!(logout.status, StatusCode::OK);

    let after = send(&app, get("/api/summary", Some(&cookie))).await;
    assert_eq!(after.status, StatusCode::FORBIDDEN);

    let anonymous_logout = send(&app, json_request("POST", "/api/logout", json!({}), None)).await;
    assert_eq!(anonymous_logout.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_failed_login_keeps_existing_session() {
    // Given: a logged-in user
    let app = app();
    let cookie = register_and_login(&app, "alice").await;

    // When: a wrong password is submitted with the live session cookie
    let bad_login = send(
        &app,
        json_request(
            "POST",
            "/api/login",
            json!({"username": "alice", "password": "wrong-password"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(bad_login.status, StatusCode::UNAUTHORIZED);

    // Then: the original session still authenticates
    let status = send(&app, get("/api/check-auth", Some(&cookie))).await;
    assert_eq!(
        status.json(),
        json!({"authenticated": true, "username": "alice"})
    );

    // And: a successful re-login retires the old session
    let relogin = send(
        &app,
        json_request(
            "POST",
            "/api/login",
            json!({"username": "alice", "password": "plant-pass-123"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(relogin.status, StatusCode::OK);
    let fresh = session_cookie(&relogin);
    assert_ne!(fresh, cookie);
    let stale = send(&app, get("/api/summary", Some(&cookie))).await;
    assert_eq!(stale.status, StatusCode::FORBIDDEN);
    let current = send(&app, get("/api/summary", Some(&fresh))).await;
    assert_eq!(current.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let app = app();
    let cookie = register_and_login(&app, "malformed").await;

    let dataset = send(&app, get("/api/dataset/abc", Some(&cookie))).await;
    assert_eq!(dataset.status, StatusCode::NOT_FOUND);
    assert_eq!(dataset.json()["error"], "Dataset not found");

    let report = send(&app, get("/api/report/abc", Some(&cookie))).await;
    assert_eq!(report.status, StatusCode::NOT_FOUND);
    assert_eq!(report.json()["error"], "Dataset not found");

    let not_multipart = send(
        &app,
        json_request("POST", "/api/upload", json!({"file": "plant.csv"}), Some(&cookie)),
    )
    .await;
    assert_eq!(not_multipart.status, StatusCode::BAD_REQUEST);
    assert!(not_multipart.json()["error"].is_string());

    let long_name = format!("{}.csv", "a".repeat(300));
    let too_long = send(&app, upload_request(&long_name, SAMPLE_CSV, Some(&cookie))).await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        too_long.json()["error"],
        "File name must be at most 255 characters"
    );
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let health = send(&app, get("/api/health", None)).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.json()["status"], "healthy");
}
