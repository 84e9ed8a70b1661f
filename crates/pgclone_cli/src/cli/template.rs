//! Warm and release commands - template lifecycle outside a test run

use crate::cli::{pool_config, ServerArgs, TemplateArgs};
use anyhow::{Context, Result};
use pgclone::{template_identity, SchemaSource, TemplatePool};
use std::time::Instant;
use tracing::info;

pub async fn warm(server: &ServerArgs, args: &TemplateArgs) -> Result<()> {
    let config = pool_config(server, args)?;
    info!(server = %config.redacted_url().unwrap_or_default(), "Warming template");

    let start = Instant::now();
    let pool = TemplatePool::new(config)?;
    let name = pool.template_name().await.context("Failed to create template")?;

    println!("Template ready: {} ({} ms)", name, start.elapsed().as_millis());
    Ok(())
}

pub async fn release(server: &ServerArgs, args: &TemplateArgs) -> Result<()> {
    let config = pool_config(server, args)?;
    let name = template_identity(&config.base_name, &config.schema)?;
    let existing = matches!(config.schema, SchemaSource::Existing(_));

    let pool = TemplatePool::new(config)?;
    let dropped = pool
        .release_template()
        .await
        .with_context(|| format!("Failed to release template {}", name))?;

    println!("{}", release_message(&name, existing, dropped));
    Ok(())
}

fn release_message(name: &str, existing: bool, dropped: bool) -> String {
    if dropped {
        format!("Dropped template {}", name)
    } else if existing {
        format!("Kept {}: existing databases are never dropped", name)
    } else {
        format!("No template {} on server", name)
    }
}
