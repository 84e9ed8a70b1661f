//! Cloning the template into a private per-test database.

use crate::admin::{is_duplicate_database, AdminConnector, DatabaseAdmin};
use crate::error::{Error, Result};
use crate::naming::CloneNamer;
use crate::teardown::TestDatabase;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Attempts made when the server reports a generated clone name as taken.
const MAX_NAME_ATTEMPTS: usize = 3;

/// Create a clone of `template` and open a pool scoped to it.
///
/// If the pool cannot be opened the clone is dropped best-effort before the
/// error is returned.
pub async fn create_clone(
    admin: &Arc<AdminConnector>,
    namer: &CloneNamer,
    template: &str,
    max_connections: u32,
) -> Result<TestDatabase> {
    let (name, pool) = clone_and_open(&**admin, namer, template, |name| async move {
        open_pool(admin, &name, max_connections).await
    })
    .await?;
    Ok(TestDatabase::new(pool, name, Arc::clone(admin)))
}

/// Clone `template`, then hand the clone's name to `open`. A failed `open`
/// drops the clone again.
pub(crate) async fn clone_and_open<A, O, F, P>(
    admin: &A,
    namer: &CloneNamer,
    template: &str,
    open: O,
) -> Result<(String, P)>
where
    A: DatabaseAdmin + ?Sized,
    O: FnOnce(String) -> F,
    F: Future<Output = Result<P>>,
{
    let start = Instant::now();
    let name = create_clone_database(admin, namer, template).await?;

    match open(name.clone()).await {
        Ok(pool) => {
            debug!(
                database = %name,
                template = %template,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Clone database ready"
            );
            Ok((name, pool))
        }
        Err(err) => {
            if let Err(drop_err) = admin.drop_database(&name).await {
                warn!(database = %name, error = %drop_err, "Failed to drop clone after pool error");
            }
            Err(err)
        }
    }
}

/// Issue `CREATE DATABASE <clone> WITH TEMPLATE <template>` under a fresh name.
pub(crate) async fn create_clone_database<A: DatabaseAdmin + ?Sized>(
    admin: &A,
    namer: &CloneNamer,
    template: &str,
) -> Result<String> {
    let mut attempt = 1;
    loop {
        let name = namer.next_name(template);
        match admin.create_database(&name, Some(template)).await {
            Ok(()) => return Ok(name),
            Err(err) if attempt < MAX_NAME_ATTEMPTS && is_duplicate_database(&err) => {
                warn!(database = %name, attempt, "Clone name already taken, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn open_pool(admin: &AdminConnector, name: &str, max_connections: u32) -> Result<PgPool> {
    let connect = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(admin.timeout())
        .connect_with(admin.connect_options(name));

    let timed_out = || Error::Timeout {
        operation: "pool connect",
        database: name.to_string(),
        timeout: admin.timeout(),
    };
    match tokio::time::timeout(admin.timeout(), connect).await {
        Ok(Ok(pool)) => Ok(pool),
        // The pool's own acquire timeout shares the same deadline.
        Ok(Err(sqlx::Error::PoolTimedOut)) => Err(timed_out()),
        Ok(Err(e)) => Err(Error::connection(name, e)),
        Err(_) => Err(timed_out()),
    }
}
