//! HTTP API handlers for usertree-api

pub mod auth;
pub mod health;
pub mod import;
pub mod tree;

pub use auth::auth_routes;
pub use health::health_routes;
pub use import::import_routes;
pub use tree::tree_routes;
