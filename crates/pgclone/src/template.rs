//! Lazy, at-most-once creation of the content-addressed template database.

use crate::admin::DatabaseAdmin;
use crate::config::SchemaSource;
use crate::error::{Error, Result};
use crate::naming::{template_name, Fingerprint};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Outcome cached by a [`TemplateManager`].
#[derive(Debug, Clone)]
pub enum TemplateState {
    /// No caller has asked for the template yet.
    Uninitialized,
    /// The template exists and carries the schema.
    Ready(String),
    /// Creation failed. Terminal for the lifetime of the manager.
    Failed(Arc<Error>),
}

impl TemplateState {
    pub fn is_ready(&self) -> bool {
        matches!(self, TemplateState::Ready(_))
    }
}

/// Resolves (creating if needed) the template database for one schema.
///
/// The outcome, success or failure, is stored in a compute-once cell: the
/// first caller runs the creation sequence while concurrent callers wait on
/// it, and every later caller reads the cached value. A failure is sticky and
/// replayed as [`Error::Template`] until the manager is dropped.
pub struct TemplateManager<A> {
    admin: Arc<A>,
    base_name: String,
    schema: SchemaSource,
    outcome: OnceCell<std::result::Result<String, Arc<Error>>>,
}

impl<A: DatabaseAdmin> TemplateManager<A> {
    pub fn new(admin: Arc<A>, base_name: impl Into<String>, schema: SchemaSource) -> Self {
        Self {
            admin,
            base_name: base_name.into(),
            schema,
            outcome: OnceCell::new(),
        }
    }

    /// Template name for the configured schema, computed without touching the
    /// server. Reads the schema file.
    pub fn identity(&self) -> Result<String> {
        template_identity(&self.base_name, &self.schema)
    }

    /// Current cached outcome.
    pub fn state(&self) -> TemplateState {
        match self.outcome.get() {
            None => TemplateState::Uninitialized,
            Some(Ok(name)) => TemplateState::Ready(name.clone()),
            Some(Err(err)) => TemplateState::Failed(Arc::clone(err)),
        }
    }

    /// Return the template name, creating the template on first use.
    pub async fn get_or_create(&self) -> Result<String> {
        let outcome = self
            .outcome
            .get_or_init(|| async {
                let start = Instant::now();
                match self.create().await {
                    Ok(name) => {
                        info!(
                            template = %name,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Template database ready"
                        );
                        Ok(name)
                    }
                    Err(err) => {
                        error!(
                            base = %self.base_name,
                            error = %err,
                            "Template creation failed; replaying this error to later callers"
                        );
                        Err(Arc::new(err))
                    }
                }
            })
            .await;

        match outcome {
            Ok(name) => Ok(name.clone()),
            Err(err) => Err(Error::Template(Arc::clone(err))),
        }
    }

    /// Drop the template database if it exists.
    ///
    /// Returns whether a database was dropped. Templates given as
    /// [`SchemaSource::Existing`] are never dropped. Clones must not be
    /// requested from this manager afterwards.
    pub async fn release(&self) -> Result<bool> {
        if matches!(self.schema, SchemaSource::Existing(_)) {
            return Ok(false);
        }
        let name = match self.outcome.get() {
            Some(Ok(name)) => name.clone(),
            // Creation already cleaned up after itself.
            Some(Err(_)) => return Ok(false),
            None => self.identity()?,
        };

        if !self.admin.database_exists(&name).await? {
            return Ok(false);
        }
        self.admin.drop_database(&name).await?;
        info!(template = %name, "Template database released");
        Ok(true)
    }

    async fn create(&self) -> Result<String> {
        if let SchemaSource::Existing(name) = &self.schema {
            if !self.admin.database_exists(name).await? {
                return Err(Error::config(format!(
                    "template database {} does not exist",
                    name
                )));
            }
            return Ok(name.clone());
        }

        let (name, script) = read_script(&self.base_name, &self.schema)?;

        if self.admin.database_exists(&name).await? {
            debug!(template = %name, "Reusing existing template database");
            return Ok(name);
        }

        self.admin.create_database(&name, None).await?;

        if let Err(err) = self.admin.apply_schema(&name, &script).await {
            // Never leave a half-initialized template behind under the content-addressed name.
            if let Err(drop_err) = self.admin.drop_database(&name).await {
                warn!(template = %name, error = %drop_err, "Failed to drop partially initialized template");
            }
            return Err(err);
        }

        Ok(name)
    }
}

/// Template name for `base_name` and `schema`, computed without touching the
/// server. Reads the schema file.
pub fn template_identity(base_name: &str, schema: &SchemaSource) -> Result<String> {
    if let SchemaSource::Existing(name) = schema {
        return Ok(name.clone());
    }
    read_script(base_name, schema).map(|(name, _)| name)
}

fn read_script(base_name: &str, schema: &SchemaSource) -> Result<(String, String)> {
    if base_name.is_empty() {
        return Err(Error::config("base name is not set"));
    }
    let bytes = schema.read()?.unwrap_or_default();
    let name = template_name(base_name, &Fingerprint::of(&bytes));
    let script = String::from_utf8(bytes).map_err(|_| Error::config("schema script is not valid UTF-8"))?;
    Ok((name, script))
}
