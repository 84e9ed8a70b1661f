//! pgclone
//!
//! Private, schema-initialized PostgreSQL databases for tests, without
//! re-running the schema for every test.
//!
//! # How it works
//!
//! - The schema script is fingerprinted; the template database is named
//!   `<base>_<fingerprint>` and created (once per pool, and only if it does not
//!   already exist on the server). Templates persist across runs.
//! - Each acquisition clones the template with
//!   `CREATE DATABASE <clone> WITH TEMPLATE <template>` and opens a pool
//!   scoped to the clone.
//! - [`TestDatabase::teardown`] drops the clone, but refuses to while
//!   connections are still checked out. The clone is then kept for
//!   inspection and [`Error::Leak`] fails the test.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pgclone::{Fixture, SchemaSource, TemplatePool};
//!
//! #[tokio::test]
//! async fn test_users() {
//!     let pool = TemplatePool::from_env("users", SchemaSource::File("schema.sql".into())).unwrap();
//!     let db = match pool
//!         .acquire_with_fixtures(&[Fixture::new("INSERT INTO users (name) VALUES ($1)").bind("ada")])
//!         .await
//!     {
//!         Err(e) if e.is_disabled() => return,
//!         other => other.unwrap(),
//!     };
//!
//!     let count: i64 = sqlx::query_scalar("SELECT count(*) FROM users")
//!         .fetch_one(db.pool())
//!         .await
//!         .unwrap();
//!     assert_eq!(count, 1);
//!
//!     db.teardown().await.unwrap();
//! }
//! ```

pub mod admin;
pub mod clone;
pub mod config;
mod error;
pub mod fixtures;
pub mod maintenance;
pub mod naming;
mod pool;
pub mod teardown;
pub mod template;

pub use admin::{AdminConnector, DatabaseAdmin};
pub use config::{PoolConfig, SchemaSource};
pub use error::{DdlOperation, Error, ErrorKind, Result};
pub use fixtures::{Fixture, FixtureValue};
pub use naming::Fingerprint;
pub use pool::TemplatePool;
pub use teardown::TestDatabase;
pub use template::{template_identity, TemplateManager, TemplateState};
