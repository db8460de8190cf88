//! Registration, login and user listing
//!
//! Responses always project `UserView`; the stored hash never leaves the
//! process.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};
use usertree_common::db::{users, NewUser, UserView};
use validator::Validate;

use crate::error::{field_errors, ApiError, ApiResult, FieldErrors};
use crate::AppState;

/// POST /register body
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(required(message = "The name field is required."))]
    pub name: Option<String>,
    #[validate(required(message = "The username field is required."))]
    pub username: Option<String>,
    #[validate(
        required(message = "The password field is required."),
        length(min = 6, message = "The password must be at least 6 characters.")
    )]
    pub password: Option<String>,
    pub parent_id: Option<i64>,
}

/// POST /login body
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(required(message = "The username field is required."))]
    pub username: Option<String>,
    #[validate(required(message = "The password field is required."))]
    pub password: Option<String>,
}

fn add_error(details: &mut FieldErrors, field: &str, message: &str) {
    details
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Present and not just whitespace; returns the trimmed value
fn non_blank<'a>(
    value: Option<&'a String>,
    field: &str,
    details: &mut FieldErrors,
) -> Option<&'a str> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        add_error(details, field, &format!("The {} field is required.", field));
        return None;
    }
    Some(trimmed)
}

/// POST /register
///
/// Validates, hashes and stores a new user. Duplicate usernames and unknown
/// parents are field-level validation failures.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<UserView>> {
    let Json(request) = payload?;

    let mut details = request
        .validate()
        .err()
        .map(|e| field_errors(&e))
        .unwrap_or_default();

    let name = non_blank(request.name.as_ref(), "name", &mut details);
    let username = non_blank(request.username.as_ref(), "username", &mut details);

    if let Some(username) = username {
        let taken = users::username_exists(&state.db, username)
            .await
            .map_err(|e| ApiError::RegistrationFailed(e.to_string()))?;
        if taken {
            add_error(&mut details, "username", "The username has already been taken.");
        }
    }

    if let Some(parent_id) = request.parent_id {
        let found = users::user_exists(&state.db, parent_id)
            .await
            .map_err(|e| ApiError::RegistrationFailed(e.to_string()))?;
        if !found {
            add_error(&mut details, "parent_id", "The selected parent id is invalid.");
        }
    }

    if !details.is_empty() {
        debug!("Registration rejected: {:?}", details);
        return Err(ApiError::validation(details));
    }

    // Validation passed, so all three are present
    let (Some(name), Some(username), Some(password)) = (name, username, request.password.as_deref())
    else {
        return Err(ApiError::RegistrationFailed(
            "validated request missing fields".to_string(),
        ));
    };

    let password_hash = state
        .hasher
        .hash_async(password)
        .await
        .map_err(|e| ApiError::RegistrationFailed(e.to_string()))?;

    let user = users::create_user(
        &state.db,
        &NewUser {
            name,
            username,
            password_hash: &password_hash,
            parent_id: request.parent_id,
        },
    )
    .await
    .map_err(|e| ApiError::RegistrationFailed(e.to_string()))?;

    info!("Registered user {} (id {})", user.username, user.id);
    Ok(Json(UserView::from(user)))
}

/// POST /login
///
/// Unknown usernames and wrong passwords give the same 401.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<UserView>> {
    let Json(request) = payload?;

    let mut details = request
        .validate()
        .err()
        .map(|e| field_errors(&e))
        .unwrap_or_default();

    let username = non_blank(request.username.as_ref(), "username", &mut details);
    // Blank check only; the password is verified untrimmed
    let password = non_blank(request.password.as_ref(), "password", &mut details)
        .and(request.password.as_deref());

    if !details.is_empty() {
        debug!("Login rejected: {:?}", details);
        return Err(ApiError::validation(details));
    }

    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::InvalidCredentials);
    };

    let Some(user) = users::find_by_username(&state.db, username).await? else {
        debug!("Login failed: unknown username {}", username);
        return Err(ApiError::InvalidCredentials);
    };

    if !state.hasher.verify_async(password, &user.password_hash).await? {
        debug!("Login failed: wrong password for {}", user.username);
        return Err(ApiError::InvalidCredentials);
    }

    info!("User {} logged in", user.username);
    Ok(Json(UserView::from(user)))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserView>>> {
    let all = users::list_users(&state.db).await?;
    Ok(Json(all.into_iter().map(UserView::from).collect()))
}

/// Build auth and user listing routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/users", get(list_users))
}
