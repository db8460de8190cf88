//! usertree-api library interface for testing
//!
//! Exposes `AppState` and `build_router` so integration tests can drive the
//! router without binding a socket.

pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use usertree_common::config::DEFAULT_MAX_UPLOAD_BYTES;
use usertree_common::PasswordHasher;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// User directory connection pool
    pub db: SqlitePool,
    /// Argon2id hasher with the configured cost
    pub hasher: PasswordHasher,
    /// Request body cap for uploads
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, hasher: PasswordHasher) -> Self {
        Self {
            db,
            hasher,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            startup_time: Utc::now(),
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::auth_routes())
        .merge(api::import_routes())
        .merge(api::tree_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
