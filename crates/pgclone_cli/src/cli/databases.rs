//! List and prune commands - databases belonging to a base name

use crate::cli::output::{print_json, print_table};
use crate::cli::{admin_connector, ServerArgs};
use anyhow::{Context, Result};
use pgclone::maintenance::{list_databases, prune_clones, ManagedDatabase};
use serde::Serialize;

/// JSON shape of one listed database.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DatabaseRow {
    pub name: String,
    pub role: &'static str,
    pub template: String,
    pub active_connections: i64,
}

impl From<&ManagedDatabase> for DatabaseRow {
    fn from(db: &ManagedDatabase) -> Self {
        Self {
            name: db.name.clone(),
            role: db.role.as_str(),
            template: db.template.clone(),
            active_connections: db.active_connections,
        }
    }
}

pub async fn list(server: &ServerArgs, base: &str, json: bool) -> Result<()> {
    let admin = admin_connector(server)?;
    let databases = list_databases(&admin, base)
        .await
        .with_context(|| format!("Failed to list databases for '{}'", base))?;
    let rows: Vec<DatabaseRow> = databases.iter().map(DatabaseRow::from).collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No databases for '{}'", base);
        return Ok(());
    }
    print_table(&["NAME", "ROLE", "TEMPLATE", "CONNECTIONS"], table_rows(&rows));
    Ok(())
}

pub async fn prune(server: &ServerArgs, base: &str, dry_run: bool) -> Result<()> {
    let admin = admin_connector(server)?;
    let names = prune_clones(&admin, base, dry_run)
        .await
        .with_context(|| format!("Failed to prune clones for '{}'", base))?;

    if names.is_empty() {
        println!("No orphaned clones for '{}'", base);
        return Ok(());
    }
    let verb = if dry_run { "Would drop" } else { "Dropped" };
    for name in &names {
        println!("{} {}", verb, name);
    }
    println!("{} {} clone(s)", verb, names.len());
    Ok(())
}

fn table_rows(rows: &[DatabaseRow]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            vec![
                row.name.clone(),
                row.role.to_string(),
                row.template.clone(),
                row.active_connections.to_string(),
            ]
        })
        .collect()
}
