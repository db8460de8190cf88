//! Database initialization and the user directory

pub mod init;
pub mod users;

pub use init::*;
pub use users::{NewUser, User, UserView};
