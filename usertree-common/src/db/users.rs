//! User directory operations
//!
//! Every function takes any SQLite executor, so callers can run them against
//! the pool or inside a transaction (`&mut *tx`).

use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteExecutor;
use std::collections::HashMap;

/// Stored user record
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    /// PHC-format Argon2id hash; never leaves the process
    pub password_hash: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential-free projection returned over the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            parent_id: user.parent_id,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            parent_id: user.parent_id,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Insert payload; the password must already be hashed
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub parent_id: Option<i64>,
}

const USER_COLUMNS: &str =
    "id, name, username, password_hash, parent_id, created_at, updated_at";

/// Insert a user and return the stored row
///
/// Fails with a database error if the username is already taken.
pub async fn create_user<'e, E>(executor: E, new_user: &NewUser<'_>) -> Result<User>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (name, username, password_hash, parent_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(new_user.name)
    .bind(new_user.username)
    .bind(new_user.password_hash)
    .bind(new_user.parent_id)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(user)
}

/// Load user by exact (case-sensitive) username
pub async fn find_by_username<'e, E>(executor: E, username: &str) -> Result<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Load user by id
pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

pub async fn username_exists<'e, E>(executor: E, username: &str) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
        .bind(username)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

pub async fn user_exists<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(id)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

/// Point a user at a new parent (or detach it with `None`)
pub async fn set_parent<'e, E>(executor: E, user_id: i64, parent_id: Option<i64>) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE users SET parent_id = ?, updated_at = ? WHERE id = ?")
        .bind(parent_id)
        .bind(Utc::now())
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// All users in storage order (ascending id)
pub async fn list_users<'e, E>(executor: E) -> Result<Vec<User>>
where
    E: SqliteExecutor<'e>,
{
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users ORDER BY id",
        USER_COLUMNS
    ))
    .fetch_all(executor)
    .await?;
    Ok(users)
}

/// Snapshot of every `id -> parent_id` link
pub async fn parent_links<'e, E>(executor: E) -> Result<HashMap<i64, Option<i64>>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(i64, Option<i64>)> = sqlx::query_as("SELECT id, parent_id FROM users")
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("users.db")).await.unwrap();
        (dir, pool)
    }

    fn new_user<'a>(username: &'a str, parent_id: Option<i64>) -> NewUser<'a> {
        NewUser {
            name: "Test User",
            username,
            password_hash: "$argon2id$stub",
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let (_dir, pool) = test_pool().await;

        let created = create_user(&pool, &new_user("alice", None)).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.parent_id, None);

        let loaded = find_by_username(&pool, "alice").await.unwrap().unwrap();
        assert_eq!(loaded, created);

        let by_id = find_by_id(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
    }

    #[tokio::test]
    async fn test_username_lookup_is_case_sensitive() {
        let (_dir, pool) = test_pool().await;
        create_user(&pool, &new_user("Alice", None)).await.unwrap();

        assert!(find_by_username(&pool, "alice").await.unwrap().is_none());
        assert!(username_exists(&pool, "Alice").await.unwrap());
        assert!(!username_exists(&pool, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (_dir, pool) = test_pool().await;
        create_user(&pool, &new_user("alice", None)).await.unwrap();

        let result = create_user(&pool, &new_user("alice", None)).await;
        assert!(matches!(result, Err(crate::Error::Database(_))));
    }

    #[tokio::test]
    async fn test_parent_must_exist() {
        let (_dir, pool) = test_pool().await;

        let result = create_user(&pool, &new_user("orphan", Some(999))).await;
        assert!(result.is_err(), "foreign key should reject unknown parent");
    }

    #[tokio::test]
    async fn test_set_parent_and_links_snapshot() {
        let (_dir, pool) = test_pool().await;
        let root = create_user(&pool, &new_user("root", None)).await.unwrap();
        let child = create_user(&pool, &new_user("child", None)).await.unwrap();

        set_parent(&pool, child.id, Some(root.id)).await.unwrap();

        let links = parent_links(&pool).await.unwrap();
        assert_eq!(links.get(&root.id), Some(&None));
        assert_eq!(links.get(&child.id), Some(&Some(root.id)));

        let users = list_users(&pool).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, root.id);
        assert_eq!(users[1].parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn test_view_drops_password_hash() {
        let (_dir, pool) = test_pool().await;
        let user = create_user(&pool, &new_user("alice", None)).await.unwrap();

        let json = serde_json::to_value(UserView::from(&user)).unwrap();
        assert_eq!(json["username"], "alice");
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
    }
}
