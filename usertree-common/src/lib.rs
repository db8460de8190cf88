//! # usertree Common Library
//!
//! Framework-free core shared by the usertree service:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Database initialization and the user directory
//! - Credential hashing
//! - Bulk import (record parsing + two-pass reconciliation)
//! - Hierarchy tree building and rendering
//!
//! Nothing in here depends on the HTTP framework; the API crate wraps these
//! functions with handlers and status-code mapping.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod import;
pub mod tree;

pub use credentials::PasswordHasher;
pub use error::{Error, Result};
