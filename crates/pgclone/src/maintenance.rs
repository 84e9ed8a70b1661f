//! Inspecting and cleaning up databases left behind by earlier runs.

use crate::admin::{AdminConnector, DatabaseAdmin};
use crate::error::{DdlOperation, Error, Result};
use crate::naming::{is_clone_of, is_template_of, CLONE_SUFFIX_LEN};
use tracing::{debug, info};

/// What a listed database is to pgclone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseRole {
    Template,
    Clone,
}

impl DatabaseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseRole::Template => "template",
            DatabaseRole::Clone => "clone",
        }
    }
}

/// A template or clone belonging to one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDatabase {
    pub name: String,
    pub role: DatabaseRole,
    /// The template name (for a template, its own name).
    pub template: String,
    /// Backends currently connected, from `pg_stat_activity`.
    pub active_connections: i64,
}

/// Classify `name` against `base_name`. Unrelated names yield `None`.
pub fn classify(name: &str, base_name: &str) -> Option<(DatabaseRole, String)> {
    if is_template_of(name, base_name) {
        return Some((DatabaseRole::Template, name.to_string()));
    }
    let split = name.len().checked_sub(CLONE_SUFFIX_LEN)?;
    if split == 0 || !name.is_char_boundary(split) {
        return None;
    }
    let template = &name[..split];
    if is_template_of(template, base_name) && is_clone_of(name, template) {
        return Some((DatabaseRole::Clone, template.to_string()));
    }
    None
}

fn like_prefix(base_name: &str) -> String {
    let mut pattern = String::with_capacity(base_name.len() + 4);
    for ch in base_name.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push_str("\\_%");
    pattern
}

/// Every template and clone on the server belonging to `base_name`.
pub async fn list_databases(admin: &AdminConnector, base_name: &str) -> Result<Vec<ManagedDatabase>> {
    let pattern = like_prefix(base_name);
    let label = base_name.to_string();
    let rows: Vec<(String, i64)> = admin
        .with_connection(None, "database listing", move |conn| {
            Box::pin(async move {
                sqlx::query_as::<_, (String, i64)>(
                    r#"
                    SELECT d.datname::text, COALESCE(a.n, 0)::bigint
                    FROM pg_database d
                    LEFT JOIN (
                        SELECT datname, count(*) AS n
                        FROM pg_stat_activity
                        GROUP BY datname
                    ) a ON a.datname = d.datname
                    WHERE d.datname LIKE $1 ESCAPE '\'
                    ORDER BY d.datname
                    "#,
                )
                .bind(&pattern)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| Error::ddl(DdlOperation::ListDatabases, label.clone(), e))
            })
        })
        .await?;

    let databases: Vec<ManagedDatabase> = rows
        .into_iter()
        .filter_map(|(name, active_connections)| {
            classify(&name, base_name).map(|(role, template)| ManagedDatabase {
                name,
                role,
                template,
                active_connections,
            })
        })
        .collect();

    debug!(base = %base_name, count = databases.len(), "Listed managed databases");
    Ok(databases)
}

/// Drop clones of `base_name` that nobody is connected to.
///
/// These are left behind by leak reports or crashed runs. Templates are never
/// touched. With `dry_run` nothing is dropped. Returns the affected names.
pub async fn prune_clones(admin: &AdminConnector, base_name: &str, dry_run: bool) -> Result<Vec<String>> {
    let candidates: Vec<String> = list_databases(admin, base_name)
        .await?
        .into_iter()
        .filter(|db| db.role == DatabaseRole::Clone && db.active_connections == 0)
        .map(|db| db.name)
        .collect();

    if dry_run {
        return Ok(candidates);
    }

    for name in &candidates {
        admin.drop_database(name).await?;
        info!(database = %name, "Pruned orphaned clone");
    }
    Ok(candidates)
}
