//! Two-pass import reconciliation
//!
//! Pass 1 finds or creates every user named in the batch and builds a
//! transient index keyed by lower-cased trimmed username. Pass 2 resolves
//! `parent_name` against that index, so a child may name a parent that
//! appears later in the file. The index lives for one call only.
//!
//! Both passes share one transaction: any failure rolls the batch back and is
//! reported as [`Error::ImportFailed`].

use crate::credentials::PasswordHasher;
use crate::db::users::{self, NewUser, User};
use crate::import::parser::ImportRecord;
use crate::{Error, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Counters for one import call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Records processed
    pub total: usize,
    /// Users inserted by pass 1
    pub created: usize,
    /// Records whose username already existed
    pub existing: usize,
    /// Parent links written by pass 2
    pub linked: usize,
    /// Parent links that were already correct
    pub already_linked: usize,
    /// `parent_name` values with no matching username in the batch
    pub unresolved: usize,
    /// Links refused because they would close a parent cycle
    pub cyclic: usize,
}

/// Index key: usernames compare case-insensitively, ignoring outer whitespace
fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Run both passes for a parsed batch
pub async fn import_users(
    pool: &SqlitePool,
    hasher: &PasswordHasher,
    records: &[ImportRecord],
) -> Result<ImportSummary> {
    let mut tx = pool.begin().await.map_err(import_failed)?;

    // Dropping `tx` on the error path rolls the batch back
    let summary = reconcile(&mut *tx, hasher, records)
        .await
        .map_err(import_failed)?;

    tx.commit().await.map_err(import_failed)?;

    info!(
        "Import complete: {} records, {} created, {} existing, {} linked, {} already linked, {} unresolved, {} cyclic",
        summary.total,
        summary.created,
        summary.existing,
        summary.linked,
        summary.already_linked,
        summary.unresolved,
        summary.cyclic
    );

    Ok(summary)
}

fn import_failed(err: impl Into<Error>) -> Error {
    match err.into() {
        failed @ Error::ImportFailed(_) => failed,
        other => Error::ImportFailed(other.to_string()),
    }
}

async fn reconcile(
    conn: &mut SqliteConnection,
    hasher: &PasswordHasher,
    records: &[ImportRecord],
) -> Result<ImportSummary> {
    let mut summary = ImportSummary {
        total: records.len(),
        ..Default::default()
    };

    let index = materialize(conn, hasher, records, &mut summary).await?;
    link_parents(conn, &index, records, &mut summary).await?;

    Ok(summary)
}

/// Pass 1: find-or-create by exact trimmed username
///
/// Existing users keep their name and credential; new users start unparented.
async fn materialize(
    conn: &mut SqliteConnection,
    hasher: &PasswordHasher,
    records: &[ImportRecord],
    summary: &mut ImportSummary,
) -> Result<HashMap<String, User>> {
    let mut index = HashMap::with_capacity(records.len());

    for record in records {
        let username = record.username.trim();

        let user = match users::find_by_username(&mut *conn, username).await? {
            Some(existing) => {
                summary.existing += 1;
                existing
            }
            None => {
                let password_hash = hasher.hash_async(&record.password).await?;
                let created = users::create_user(
                    &mut *conn,
                    &NewUser {
                        name: record.name.trim(),
                        username,
                        password_hash: &password_hash,
                        parent_id: None,
                    },
                )
                .await?;
                debug!("Created user '{}' (id {}) from line {}", username, created.id, record.line);
                summary.created += 1;
                created
            }
        };

        index.insert(normalize(username), user);
    }

    Ok(index)
}

/// Pass 2: wire `parent_name` → `parent_id` through the pass 1 index
async fn link_parents(
    conn: &mut SqliteConnection,
    index: &HashMap<String, User>,
    records: &[ImportRecord],
    summary: &mut ImportSummary,
) -> Result<()> {
    // Directory-wide snapshot so cycles through users outside the batch are seen too
    let mut links = users::parent_links(&mut *conn).await?;

    for record in records {
        let Some(parent_key) = record
            .parent_name
            .as_deref()
            .map(normalize)
            .filter(|key| !key.is_empty())
        else {
            continue;
        };

        let Some(parent) = index.get(&parent_key) else {
            debug!(
                "Line {}: parent '{}' not in batch, link skipped",
                record.line, parent_key
            );
            summary.unresolved += 1;
            continue;
        };

        let child = index.get(&normalize(&record.username)).ok_or_else(|| {
            Error::ImportFailed(format!(
                "user '{}' missing from import index",
                record.username.trim()
            ))
        })?;

        if links.get(&child.id) == Some(&Some(parent.id)) {
            summary.already_linked += 1;
            continue;
        }

        if creates_cycle(&links, child.id, parent.id) {
            warn!(
                "Line {}: linking '{}' under '{}' would create a cycle, link skipped",
                record.line, child.username, parent.username
            );
            summary.cyclic += 1;
            continue;
        }

        users::set_parent(&mut *conn, child.id, Some(parent.id)).await?;
        links.insert(child.id, Some(parent.id));
        summary.linked += 1;
    }

    Ok(())
}

/// True if `child_id` is `parent_id` or one of its ancestors
fn creates_cycle(links: &HashMap<i64, Option<i64>>, child_id: i64, parent_id: i64) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(parent_id);

    while let Some(id) = cursor {
        if id == child_id {
            return true;
        }
        // Pre-existing loop that does not involve the child
        if !seen.insert(id) {
            return false;
        }
        cursor = links.get(&id).copied().flatten();
    }

    false
}
