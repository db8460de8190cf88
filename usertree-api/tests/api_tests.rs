//! Integration tests for usertree-api endpoints
//!
//! Drives the router with `oneshot` against a throwaway SQLite file.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;
use usertree_api::{build_router, AppState};
use usertree_common::db::{self, users};
use usertree_common::PasswordHasher;

const BOUNDARY: &str = "usertree-test-boundary";

/// Test helper: app over a fresh database (TempDir must outlive the pool)
async fn create_test_app() -> (TempDir, Router, SqlitePool) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = db::init_database(&dir.path().join("api_test.db"))
        .await
        .expect("Failed to initialize database");

    let hasher = PasswordHasher::with_params(1024, 1, 1).expect("Valid test params");
    let app = build_router(AppState::new(pool.clone(), hasher));

    (dir, app, pool)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload_request(file_name: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload-users")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register(app: &Router, name: &str, username: &str, parent_id: Option<i64>) -> Value {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/register",
            json!({
                "name": name,
                "username": username,
                "password": "secret123",
                "parent_id": parent_id,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register {} failed: {}", username, json);
    json
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "usertree-api");
    assert_eq!(json["database"], true);
}

#[tokio::test]
async fn test_register_returns_user_without_credential() {
    let (_dir, app, pool) = create_test_app().await;

    let json = register(&app, "Alice", "alice", None).await;

    assert_eq!(json["name"], "Alice");
    assert_eq!(json["username"], "alice");
    assert!(json["parent_id"].is_null());
    assert!(json.get("password").is_none());
    assert!(json.get("password_hash").is_none());

    let stored = users::find_by_username(&pool, "alice").await.unwrap().unwrap();
    assert!(stored.password_hash.starts_with("$argon2id$"));
}

#[tokio::test]
async fn test_register_with_parent() {
    let (_dir, app, _pool) = create_test_app().await;

    let parent = register(&app, "Alice", "alice", None).await;
    let parent_id = parent["id"].as_i64().unwrap();
    let child = register(&app, "Bob", "bob", Some(parent_id)).await;

    assert_eq!(child["parent_id"], parent_id);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(
        &app,
        json_request("POST", "/register", json!({"username": "  ", "password": "123"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    let details = &json["error"]["details"];
    assert!(details["name"].is_array());
    assert!(details["username"].is_array());
    assert_eq!(
        details["password"][0],
        "The password must be at least 6 characters."
    );
}

#[tokio::test]
async fn test_register_duplicate_username_rejected() {
    let (_dir, app, _pool) = create_test_app().await;
    register(&app, "Alice", "alice", None).await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/register",
            json!({"name": "Other", "username": "alice", "password": "secret123"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json["error"]["details"]["username"][0],
        "The username has already been taken."
    );
}

#[tokio::test]
async fn test_register_unknown_parent_rejected() {
    let (_dir, app, pool) = create_test_app().await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/register",
            json!({"name": "Bob", "username": "bob", "password": "secret123", "parent_id": 999}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["details"]["parent_id"].is_array());
    assert!(users::list_users(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_register_malformed_json_is_validation_error() {
    let (_dir, app, _pool) = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_success() {
    let (_dir, app, _pool) = create_test_app().await;
    register(&app, "Alice", "alice", None).await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/login",
            json!({"username": "alice", "password": "secret123"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["username"], "alice");
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_wrong_password_is_unauthorized() {
    let (_dir, app, _pool) = create_test_app().await;
    register(&app, "Alice", "alice", None).await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/login",
            json!({"username": "alice", "password": "not-the-password"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "INVALID_CREDENTIALS");
    assert_eq!(json["error"]["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_unknown_user_is_unauthorized() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, _json) = send(
        &app,
        json_request(
            "POST",
            "/login",
            json!({"username": "ghost", "password": "secret123"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_missing_fields() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(&app, json_request("POST", "/login", json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["details"]["username"].is_array());
    assert!(json["error"]["details"]["password"].is_array());
}

#[tokio::test]
async fn test_login_blank_fields_are_validation_errors() {
    let (_dir, app, _pool) = create_test_app().await;
    register(&app, "Alice", "alice", None).await;

    let (status, json) = send(
        &app,
        json_request("POST", "/login", json!({"username": "", "password": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(
        json["error"]["details"]["username"][0],
        "The username field is required."
    );
    assert_eq!(
        json["error"]["details"]["password"][0],
        "The password field is required."
    );
}

#[tokio::test]
async fn test_upload_over_body_limit_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = db::init_database(&dir.path().join("limit_test.db"))
        .await
        .expect("Failed to initialize database");
    let hasher = PasswordHasher::with_params(1024, 1, 1).expect("Valid test params");
    let app = build_router(AppState::new(pool.clone(), hasher).with_max_upload_bytes(200));

    let mut csv = b"name,username,password,parent_name\n".to_vec();
    let mut i = 0;
    while csv.len() < 5000 {
        csv.extend_from_slice(format!("User{i},user{i},secret-{i},\n").as_bytes());
        i += 1;
    }
    let (status, json) = send(&app, upload_request("users.csv", &csv)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert!(users::list_users(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_users_in_id_order() {
    let (_dir, app, _pool) = create_test_app().await;
    register(&app, "Alice", "alice", None).await;
    register(&app, "Bob", "bob", None).await;

    let (status, json) = send(&app, get("/users")).await;

    assert_eq!(status, StatusCode::OK);
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["username"], "alice");
    assert_eq!(list[1]["username"], "bob");
    assert!(list.iter().all(|u| u.get("password_hash").is_none()));
}

#[tokio::test]
async fn test_upload_csv_builds_hierarchy() {
    let (_dir, app, _pool) = create_test_app().await;

    let csv = b"name,username,password,parent_name\n\
D,d,secret-d,b\n\
B,b,secret-b,a\n\
A,a,secret-a,\n\
C,c,secret-c,A\n";
    let (status, json) = send(&app, upload_request("users.csv", csv)).await;

    assert_eq!(status, StatusCode::OK, "upload failed: {}", json);
    assert_eq!(json["message"], "Users imported successfully.");
    assert_eq!(json["summary"]["created"], 4);
    assert_eq!(json["summary"]["linked"], 3);

    let (status, tree) = send(&app, get("/user-tree")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        tree,
        json!([
            {"name": "A", "children": [
                {"name": "B", "children": [{"name": "D"}]},
                {"name": "C"}
            ]}
        ])
    );
}

#[tokio::test]
async fn test_user_tree_from_registered_users() {
    let (_dir, app, _pool) = create_test_app().await;

    let a = register(&app, "A", "a", None).await["id"].as_i64().unwrap();
    let b = register(&app, "B", "b", Some(a)).await["id"].as_i64().unwrap();
    register(&app, "C", "c", Some(a)).await;
    register(&app, "D", "d", Some(b)).await;

    let (status, tree) = send(&app, get("/user-tree")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        tree,
        json!([
            {"name": "A", "children": [
                {"name": "B", "children": [{"name": "D"}]},
                {"name": "C"}
            ]}
        ])
    );
}

#[tokio::test]
async fn test_upload_json_and_reimport_is_idempotent() {
    let (_dir, app, pool) = create_test_app().await;

    let payload = json!([
        {"name": "Root", "username": "root", "password": "pw-root"},
        {"name": "Leaf", "username": "leaf", "password": "pw-leaf", "parent_name": "ROOT"}
    ])
    .to_string();

    let (status, first) = send(&app, upload_request("users.json", payload.as_bytes())).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", first);
    assert_eq!(first["summary"]["created"], 2);

    let (status, second) = send(&app, upload_request("users.json", payload.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["summary"]["created"], 0);
    assert_eq!(second["summary"]["existing"], 2);
    assert_eq!(second["summary"]["linked"], 0);

    assert_eq!(users::list_users(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_pdf_is_unsupported() {
    let (_dir, app, pool) = create_test_app().await;

    let (status, json) = send(&app, upload_request("users.pdf", b"%PDF-1.4 garbage")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "UNSUPPORTED_FORMAT");
    assert_eq!(json["error"]["message"], "Unsupported file type");
    assert!(users::list_users(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_header_only_csv_is_no_data() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(
        &app,
        upload_request("users.csv", b"name,username,password,parent_name\n"),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "NO_DATA_FOUND");
    assert_eq!(json["error"]["message"], "No valid data found in the file");
}

#[tokio::test]
async fn test_upload_json_null_is_no_data() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(&app, upload_request("users.json", b"null")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "NO_DATA_FOUND");
}

#[tokio::test]
async fn test_upload_short_row_is_malformed_and_writes_nothing() {
    let (_dir, app, pool) = create_test_app().await;

    let csv = b"name,username,password,parent_name\nA,a,secret-a,\nB,b\n";
    let (status, json) = send(&app, upload_request("users.csv", csv)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "MALFORMED_ROW");
    assert!(json["error"]["message"].as_str().unwrap().contains("line 3"));
    assert!(users::list_users(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_invalid_json_is_parse_error() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(&app, upload_request("users.json", b"[{\"name\": ")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "PARSE_ERROR");
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let (_dir, app, _pool) = create_test_app().await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload-users")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["details"]["file"].is_array());
}

#[tokio::test]
async fn test_upload_not_multipart() {
    let (_dir, app, _pool) = create_test_app().await;

    let (status, json) = send(&app, json_request("POST", "/upload-users", json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["details"]["file"].is_array());
}

#[tokio::test]
async fn test_tree_page_serves_nested_list() {
    let (_dir, app, _pool) = create_test_app().await;

    let a = register(&app, "A", "a", None).await["id"].as_i64().unwrap();
    register(&app, "<B>", "b", Some(a)).await;

    let response = app.clone().oneshot(get("/tree")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/html"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<ul><li>A<ul><li>&lt;B&gt;</li></ul></li></ul>"));
}
