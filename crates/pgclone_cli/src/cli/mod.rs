//! Subcommand implementations and the arguments they share.

pub mod databases;
pub mod fingerprint;
pub mod output;
pub mod template;

use anyhow::{bail, Context, Result};
use clap::Args;
use pgclone::config::{ENV_DATABASE_URL, ENV_DATABASE_URL_FALLBACK};
use pgclone::{AdminConnector, PoolConfig, SchemaSource};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Where the server is and how long to wait for it.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Server URL for administrative connections (falls back to DATABASE_URL)
    #[arg(long, env = ENV_DATABASE_URL, hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Timeout for each connect and DDL statement, in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

/// Identifies one template: base name plus schema file, or an existing database.
#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    /// Base name of the template
    #[arg(short, long, required_unless_present = "existing")]
    pub base: Option<String>,

    /// Schema script the template is built from
    #[arg(short, long, required_unless_present = "existing", conflicts_with = "existing")]
    pub schema: Option<PathBuf>,

    /// Use an existing database (e.g. template1) as the template
    #[arg(long)]
    pub existing: Option<String>,
}

impl TemplateArgs {
    pub fn base_name(&self) -> &str {
        self.base.as_deref().unwrap_or_default()
    }

    pub fn schema_source(&self) -> SchemaSource {
        match (&self.existing, &self.schema) {
            (Some(name), _) => SchemaSource::Existing(name.clone()),
            (None, Some(path)) => SchemaSource::File(path.clone()),
            (None, None) => SchemaSource::Unset,
        }
    }
}

/// Pool configuration for a template command.
///
/// The environment supplies defaults; flags override them. `PGCLONE_SKIP` is
/// ignored since the operator asked for the work explicitly.
pub fn pool_config(server: &ServerArgs, template: &TemplateArgs) -> Result<PoolConfig> {
    let mut config = PoolConfig::from_env()
        .with_base_name(template.base_name())
        .with_schema(template.schema_source())
        .with_skip(false);
    if let Some(url) = &server.database_url {
        config = config.with_database_url(url.clone());
    }
    if let Some(secs) = server.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if config.database_url.is_none() {
        bail!(
            "no database URL; pass --database-url or set {} (or {})",
            ENV_DATABASE_URL,
            ENV_DATABASE_URL_FALLBACK
        );
    }
    config.validate().context("Invalid template configuration")?;
    Ok(config)
}

/// Administrative connector for commands that work on whole base names.
pub fn admin_connector(server: &ServerArgs) -> Result<AdminConnector> {
    let config = PoolConfig::from_env();
    let timeout = server.timeout_secs.map(Duration::from_secs).unwrap_or(config.timeout);
    let url = server.database_url.clone().or(config.database_url).with_context(|| {
        format!(
            "no database URL; pass --database-url or set {} (or {})",
            ENV_DATABASE_URL, ENV_DATABASE_URL_FALLBACK
        )
    })?;
    AdminConnector::from_url(&url, timeout).context("Invalid database URL")
}

/// Run an async command on a single-threaded runtime.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    rt.block_on(future)
}
