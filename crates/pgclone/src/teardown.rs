//! Clone handles and the leak-gated teardown protocol.

use crate::admin::{AdminConnector, DatabaseAdmin};
use crate::error::{Error, Result};
use sqlx::postgres::PgConnectOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How long teardown waits for connections dropped just before it to finish
/// returning to the pool. sqlx hands a dropped connection back on a spawned task.
const RELEASE_SETTLE: Duration = Duration::from_millis(250);
const RELEASE_POLL: Duration = Duration::from_millis(10);

/// A private clone database and the pool scoped to it.
///
/// Call [`teardown`](TestDatabase::teardown) when the test is done. Teardown
/// refuses to drop the clone while connections are still checked out from
/// [`pool`](TestDatabase::pool), and leaves it in place for inspection.
pub struct TestDatabase {
    pool: PgPool,
    name: String,
    admin: Arc<AdminConnector>,
    released: AtomicBool,
    leaked: AtomicBool,
}

impl TestDatabase {
    pub(crate) fn new(pool: PgPool, name: String, admin: Arc<AdminConnector>) -> Self {
        Self {
            pool,
            name,
            admin,
            released: AtomicBool::new(false),
            leaked: AtomicBool::new(false),
        }
    }

    /// Pool connected to the clone.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Name of the clone database.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options for opening extra connections to the clone. Connections opened
    /// this way must be closed before teardown, or the drop will fail.
    pub fn connect_options(&self) -> PgConnectOptions {
        self.admin.connect_options(&self.name)
    }

    /// Connections currently checked out of the pool.
    pub fn acquired_connections(&self) -> u32 {
        acquired_count(self.pool.size(), self.pool.num_idle())
    }

    /// Whether the clone has been dropped.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Close the pool and drop the clone, unless connections are outstanding.
    ///
    /// With outstanding connections this returns [`Error::Leak`] and the clone
    /// is kept. After a successful teardown later calls return `Ok(())`
    /// without touching the server.
    pub async fn teardown(&self) -> Result<()> {
        if self.is_released() {
            return Ok(());
        }

        let acquired = settled_acquired(&self.pool).await;
        if let Err(err) = check_no_leaks(acquired, &self.name) {
            self.leaked.store(true, Ordering::Release);
            error!(database = %self.name, acquired, "Clone kept: connections were not released");
            return Err(err);
        }
        self.leaked.store(false, Ordering::Release);

        self.pool.close().await;
        self.admin.drop_database(&self.name).await?;
        self.released.store(true, Ordering::Release);
        info!(database = %self.name, "Clone database dropped");
        Ok(())
    }
}

impl std::fmt::Debug for TestDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDatabase")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if self.is_released() {
            return;
        }
        if self.leaked.load(Ordering::Acquire) {
            warn!(database = %self.name, "Leaving clone database in place after leak report");
            return;
        }

        // Best effort: the runtime may shut down before this task runs.
        let pool = self.pool.clone();
        let name = self.name.clone();
        let admin = Arc::clone(&self.admin);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let acquired = settled_acquired(&pool).await;
                if acquired > 0 {
                    warn!(database = %name, acquired, "Dropped with unreleased connections; clone kept");
                    return;
                }
                pool.close().await;
                match admin.drop_database(&name).await {
                    Ok(()) => info!(database = %name, "Clone database dropped on handle drop"),
                    Err(e) => warn!(database = %name, error = %e, "Failed to drop clone database"),
                }
            });
        } else {
            warn!(
                database = %name,
                "Not in async context, cannot drop clone database"
            );
        }
    }
}

fn acquired_count(size: u32, idle: usize) -> u32 {
    size.saturating_sub(u32::try_from(idle).unwrap_or(u32::MAX))
}

fn check_no_leaks(acquired: u32, database: &str) -> Result<()> {
    if acquired > 0 {
        return Err(Error::Leak {
            acquired,
            database: database.to_string(),
        });
    }
    Ok(())
}

async fn settled_acquired(pool: &PgPool) -> u32 {
    let deadline = Instant::now() + RELEASE_SETTLE;
    loop {
        let acquired = acquired_count(pool.size(), pool.num_idle());
        if acquired == 0 || Instant::now() >= deadline {
            return acquired;
        }
        tokio::time::sleep(RELEASE_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_acquired_count() {
        assert_eq!(acquired_count(0, 0), 0);
        assert_eq!(acquired_count(3, 3), 0);
        assert_eq!(acquired_count(3, 1), 2);
        // Idle can briefly exceed size while the pool is shrinking.
        assert_eq!(acquired_count(1, 2), 0);
    }

    #[test]
    fn test_leak_check() {
        check_no_leaks(0, "t_1").unwrap();

        let err = check_no_leaks(1, "t_1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Leak);
        assert_eq!(
            err.to_string(),
            "unreleased connections exists: 1, can't drop database t_1"
        );
    }

    #[tokio::test]
    async fn test_lazy_pool_has_nothing_acquired() {
        let admin = Arc::new(
            AdminConnector::from_url("postgres://u:p@127.0.0.1:1/postgres", Duration::from_secs(1)).unwrap(),
        );
        let pool = sqlx::postgres::PgPoolOptions::new().connect_lazy_with(admin.connect_options("t_x"));
        let db = TestDatabase::new(pool, "t_x".to_string(), admin);

        assert_eq!(db.acquired_connections(), 0);
        assert_eq!(db.name(), "t_x");
        assert!(!db.is_released());
        assert_eq!(db.connect_options().get_database(), Some("t_x"));

        // Mark released so the drop does not reach for the unreachable server.
        db.released.store(true, Ordering::Release);
        db.teardown().await.unwrap();
    }
}
