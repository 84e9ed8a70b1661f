//! The per-suite pool: configuration plus cached template state.

use crate::admin::AdminConnector;
use crate::clone::create_clone;
use crate::config::{redact_url, PoolConfig, SchemaSource, ENV_DATABASE_URL, ENV_SKIP};
use crate::error::{Error, Result};
use crate::fixtures::{load_fixtures, load_sql, Fixture};
use crate::naming::CloneNamer;
use crate::teardown::TestDatabase;
use crate::template::{TemplateManager, TemplateState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hands out private, schema-initialized databases to tests.
///
/// Create one per test suite (typically in a `static` or `OnceLock`) and share
/// it between tests. Nothing connects until the first acquisition. Every pool
/// instance has its own template state.
///
/// # Example
///
/// ```rust,ignore
/// use pgclone::{SchemaSource, TemplatePool};
/// use std::sync::OnceLock;
///
/// fn pool() -> &'static TemplatePool {
///     static POOL: OnceLock<TemplatePool> = OnceLock::new();
///     POOL.get_or_init(|| {
///         TemplatePool::from_env("orders", SchemaSource::File("schema.sql".into())).unwrap()
///     })
/// }
///
/// #[tokio::test]
/// async fn test_orders() {
///     let db = match pool().acquire_empty().await {
///         Err(e) if e.is_disabled() => return,
///         other => other.unwrap(),
///     };
///     sqlx::query("SELECT id FROM orders").fetch_all(db.pool()).await.unwrap();
///     db.teardown().await.unwrap();
/// }
/// ```
pub struct TemplatePool {
    config: PoolConfig,
    active: Option<Active>,
}

struct Active {
    admin: Arc<AdminConnector>,
    templates: TemplateManager<AdminConnector>,
    namer: CloneNamer,
}

impl TemplatePool {
    /// Build a pool. Validates the configuration; does not connect.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let active = match (&config.database_url, config.skip) {
            (Some(url), false) => {
                let admin = Arc::new(AdminConnector::from_url(url, config.timeout)?);
                debug!(server = %redact_url(url), base = %config.base_name, "Template pool configured");
                let templates =
                    TemplateManager::new(Arc::clone(&admin), config.base_name.clone(), config.schema.clone());
                Some(Active {
                    admin,
                    templates,
                    namer: CloneNamer::new(),
                })
            }
            _ => None,
        };

        Ok(Self { config, active })
    }

    /// Build a pool from the environment with the given base name and schema.
    pub fn from_env(base_name: impl Into<String>, schema: SchemaSource) -> Result<Self> {
        Self::new(
            PoolConfig::from_env()
                .with_base_name(base_name)
                .with_schema(schema),
        )
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether acquisitions reach a server. When false every acquisition
    /// returns [`Error::Disabled`].
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    fn active(&self) -> Result<&Active> {
        self.active.as_ref().ok_or_else(|| {
            if self.config.skip {
                Error::Disabled(format!("{} is set", ENV_SKIP))
            } else {
                Error::Disabled(format!("no database URL configured; set {}", ENV_DATABASE_URL))
            }
        })
    }

    /// Template name, creating the template on first use.
    pub async fn template_name(&self) -> Result<String> {
        self.active()?.templates.get_or_create().await
    }

    /// Cached template outcome. A disabled pool is always `Uninitialized`.
    pub fn template_state(&self) -> TemplateState {
        match &self.active {
            Some(active) => active.templates.state(),
            None => TemplateState::Uninitialized,
        }
    }

    /// A private, empty clone of the template.
    pub async fn acquire_empty(&self) -> Result<TestDatabase> {
        let active = self.active()?;
        let template = active.templates.get_or_create().await?;
        create_clone(&active.admin, &active.namer, &template, self.config.max_connections).await
    }

    /// A private clone seeded with `fixtures`, run in order.
    ///
    /// On the first failing fixture the clone is torn down and
    /// [`Error::Fixture`] reports the fixture's index.
    pub async fn acquire_with_fixtures(&self, fixtures: &[Fixture]) -> Result<TestDatabase> {
        let db = self.acquire_empty().await?;
        let loaded = load_fixtures(db.pool(), db.name(), fixtures, self.config.timeout).await;
        discard_on_error(db, loaded).await
    }

    /// A private clone seeded with plain SQL strings, run in order.
    pub async fn acquire_with_sql<S: AsRef<str>>(&self, sqls: &[S]) -> Result<TestDatabase> {
        let db = self.acquire_empty().await?;
        let loaded = load_sql(db.pool(), db.name(), sqls, self.config.timeout).await;
        discard_on_error(db, loaded).await
    }

    /// Drop the template database. Templates are otherwise kept for reuse by
    /// later runs; call this at most once, after the last acquisition.
    pub async fn release_template(&self) -> Result<bool> {
        self.active()?.templates.release().await
    }
}

async fn discard_on_error(db: TestDatabase, loaded: Result<()>) -> Result<TestDatabase> {
    match loaded {
        Ok(()) => Ok(db),
        Err(err) => {
            if let Err(teardown_err) = db.teardown().await {
                warn!(database = %db.name(), error = %teardown_err, "Failed to tear down clone after fixture error");
            }
            Err(err)
        }
    }
}
