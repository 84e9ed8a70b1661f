//! Short-lived administrative connections.
//!
//! Every DDL statement runs on its own unpooled connection, opened against the
//! server's maintenance database (or a named database for schema scripts) and
//! closed before the call returns.

use crate::error::{DdlOperation, Error, Result};
use crate::naming::quote_ident;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Future returned by a [`AdminConnector::with_connection`] operation.
pub type AdminFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Administrative operations the template manager and cloner depend on.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Whether a database with this exact name exists.
    async fn database_exists(&self, name: &str) -> Result<bool>;

    /// `CREATE DATABASE name [WITH TEMPLATE template]`.
    async fn create_database(&self, name: &str, template: Option<&str>) -> Result<()>;

    /// `DROP DATABASE name`.
    async fn drop_database(&self, name: &str) -> Result<()>;

    /// Run a (possibly multi-statement) schema script inside `database`.
    async fn apply_schema(&self, database: &str, script: &str) -> Result<()>;
}

/// Opens one connection per unit of work, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct AdminConnector {
    options: PgConnectOptions,
    timeout: Duration,
}

impl AdminConnector {
    /// Parse a server URL. The URL's database (if any) is used for
    /// administrative statements.
    pub fn from_url(url: &str, timeout: Duration) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| Error::config(format!("invalid database URL: {}", e)))?;
        Ok(Self::new(options, timeout))
    }

    pub fn new(options: PgConnectOptions, timeout: Duration) -> Self {
        Self { options, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect options pointing at `database` on the same server.
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        self.options.clone().database(database)
    }

    fn target_label(&self, database: Option<&str>) -> String {
        database
            .or_else(|| self.options.get_database())
            .unwrap_or("postgres")
            .to_string()
    }

    /// Run `op` on a fresh connection to `database` (the URL's database when
    /// `None`).
    ///
    /// The connection is closed on every exit path. Connect plus `op` are
    /// bounded by the configured timeout; on expiry the in-flight connection is
    /// dropped, which closes its socket. A close failure is returned only when
    /// `op` itself succeeded.
    pub async fn with_connection<T, F>(
        &self,
        database: Option<&str>,
        operation: &'static str,
        op: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> AdminFuture<'c, T> + Send,
    {
        let target = self.target_label(database);
        let options = match database {
            Some(name) => self.options.clone().database(name),
            None => self.options.clone(),
        };
        let start = Instant::now();

        let work = async {
            let mut conn = options
                .connect()
                .await
                .map_err(|e| Error::connection(target.clone(), e))?;

            let result = op(&mut conn).await;

            match conn.close().await {
                Ok(()) => result,
                Err(close_err) => match result {
                    Ok(_) => Err(Error::connection(target.clone(), close_err)),
                    Err(err) => {
                        warn!(database = %target, error = %close_err, "Error closing admin connection");
                        Err(err)
                    }
                },
            }
        };

        let outcome = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                database: target.clone(),
                timeout: self.timeout,
            }),
        };

        debug!(
            database = %target,
            operation,
            ok = outcome.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Admin operation finished"
        );
        outcome
    }
}

#[async_trait]
impl DatabaseAdmin for AdminConnector {
    async fn database_exists(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_connection(None, "existence check", move |conn| {
            Box::pin(async move {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)",
                )
                .bind(&name)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| Error::ddl(DdlOperation::ExistenceCheck, name.clone(), e))
            })
        })
        .await
    }

    async fn create_database(&self, name: &str, template: Option<&str>) -> Result<()> {
        let mut sql = format!("CREATE DATABASE {}", quote_ident(name));
        if let Some(template) = template {
            sql.push_str(" WITH TEMPLATE ");
            sql.push_str(&quote_ident(template));
        }
        let name = name.to_string();
        self.with_connection(None, "CREATE DATABASE", move |conn| {
            Box::pin(async move {
                conn.execute(sqlx::raw_sql(&sql))
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::ddl(DdlOperation::CreateDatabase, name.clone(), e))
            })
        })
        .await
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let sql = format!("DROP DATABASE {}", quote_ident(name));
        let name = name.to_string();
        self.with_connection(None, "DROP DATABASE", move |conn| {
            Box::pin(async move {
                conn.execute(sqlx::raw_sql(&sql))
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::ddl(DdlOperation::DropDatabase, name.clone(), e))
            })
        })
        .await
    }

    async fn apply_schema(&self, database: &str, script: &str) -> Result<()> {
        let script = script.to_string();
        let name = database.to_string();
        self.with_connection(Some(database), "schema script", move |conn| {
            Box::pin(async move {
                conn.execute(sqlx::raw_sql(&script))
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::SchemaApply {
                        database: name.clone(),
                        source: e,
                    })
            })
        })
        .await
    }
}

/// SQLSTATE 42P04: the database name is already taken.
pub(crate) fn is_duplicate_database(err: &Error) -> bool {
    match err {
        Error::Ddl {
            operation: DdlOperation::CreateDatabase,
            source: sqlx::Error::Database(db_err),
            ..
        } => db_err.code().as_deref() == Some("42P04"),
        _ => false,
    }
}
