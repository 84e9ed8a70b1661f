//! Seeding a fresh clone with fixture statements.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A positional fixture parameter.
///
/// Each variant carries an `Option` so a NULL keeps its column type.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Bytes(Option<Vec<u8>>),
    Json(Option<serde_json::Value>),
    Timestamp(Option<DateTime<Utc>>),
}

macro_rules! fixture_value_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for FixtureValue {
            fn from(value: $ty) -> Self {
                FixtureValue::$variant(Some(value.into()))
            }
        }

        impl From<Option<$ty>> for FixtureValue {
            fn from(value: Option<$ty>) -> Self {
                FixtureValue::$variant(value.map(Into::into))
            }
        }
    };
}

fixture_value_from!(Bool, bool);
fixture_value_from!(Int, i16);
fixture_value_from!(Int, i32);
fixture_value_from!(Int, i64);
fixture_value_from!(Float, f32);
fixture_value_from!(Float, f64);
fixture_value_from!(Text, String);
fixture_value_from!(Text, &str);
fixture_value_from!(Bytes, Vec<u8>);
fixture_value_from!(Json, serde_json::Value);
fixture_value_from!(Timestamp, DateTime<Utc>);

/// One parameterized statement run against a fresh clone.
///
/// # Example
///
/// ```rust,ignore
/// use pgclone::Fixture;
///
/// let fixtures = [
///     Fixture::new("INSERT INTO users (id, name) VALUES ($1, $2)").bind(1).bind("ada"),
///     Fixture::new("INSERT INTO users (id, name) VALUES ($1, $2)").bind(2).bind(None::<&str>),
/// ];
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub query: String,
    pub params: Vec<FixtureValue>,
}

impl Fixture {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter.
    pub fn bind(mut self, value: impl Into<FixtureValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl From<&str> for Fixture {
    fn from(query: &str) -> Self {
        Fixture::new(query)
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &FixtureValue,
) -> Query<'q, Postgres, PgArguments> {
    match value.clone() {
        FixtureValue::Bool(v) => query.bind(v),
        FixtureValue::Int(v) => query.bind(v),
        FixtureValue::Float(v) => query.bind(v),
        FixtureValue::Text(v) => query.bind(v),
        FixtureValue::Bytes(v) => query.bind(v),
        FixtureValue::Json(v) => query.bind(v),
        FixtureValue::Timestamp(v) => query.bind(v),
    }
}

/// Run `fixtures` in order. Stops at the first failure and reports its index.
pub async fn load_fixtures(pool: &PgPool, database: &str, fixtures: &[Fixture], timeout: Duration) -> Result<()> {
    bounded(database, timeout, async {
        for (index, fixture) in fixtures.iter().enumerate() {
            let query = fixture
                .params
                .iter()
                .fold(sqlx::query(&fixture.query), bind_value);
            query
                .execute(pool)
                .await
                .map_err(|source| Error::Fixture { index, source })?;
        }
        debug!(database = %database, count = fixtures.len(), "Fixtures loaded");
        Ok(())
    })
    .await
}

/// Run plain SQL strings in order over the simple query protocol, so one
/// string may hold several statements.
pub async fn load_sql<S: AsRef<str>>(pool: &PgPool, database: &str, sqls: &[S], timeout: Duration) -> Result<()> {
    bounded(database, timeout, async {
        for (index, sql) in sqls.iter().enumerate() {
            sqlx::raw_sql(sql.as_ref())
                .execute(pool)
                .await
                .map_err(|source| Error::Fixture { index, source })?;
        }
        debug!(database = %database, count = sqls.len(), "SQL fixtures loaded");
        Ok(())
    })
    .await
}

async fn bounded(database: &str, timeout: Duration, work: impl Future<Output = Result<()>>) -> Result<()> {
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "fixture load",
            database: database.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_parameter_order() {
        let fixture = Fixture::new("INSERT INTO t (a, b, c) VALUES ($1, $2, $3)")
            .bind(7)
            .bind("seven")
            .bind(None::<i64>);

        assert_eq!(
            fixture.params,
            vec![
                FixtureValue::Int(Some(7)),
                FixtureValue::Text(Some("seven".to_string())),
                FixtureValue::Int(None),
            ]
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(FixtureValue::from(true), FixtureValue::Bool(Some(true)));
        assert_eq!(FixtureValue::from(3i16), FixtureValue::Int(Some(3)));
        assert_eq!(FixtureValue::from(1.5f32), FixtureValue::Float(Some(1.5)));
        assert_eq!(FixtureValue::from(vec![1u8, 2]), FixtureValue::Bytes(Some(vec![1, 2])));
        assert_eq!(
            FixtureValue::from(serde_json::json!({"k": 1})),
            FixtureValue::Json(Some(serde_json::json!({"k": 1})))
        );
        assert_eq!(FixtureValue::from(None::<DateTime<Utc>>), FixtureValue::Timestamp(None));
    }

    #[test]
    fn test_nulls_keep_their_column_type() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(FixtureValue::from(at), FixtureValue::Timestamp(Some(at)));
        assert_eq!(FixtureValue::from(None::<bool>), FixtureValue::Bool(None));
        assert_eq!(FixtureValue::from(None::<&str>), FixtureValue::Text(None));
        assert_eq!(FixtureValue::from(None::<f64>), FixtureValue::Float(None));
        assert_eq!(FixtureValue::from(None::<Vec<u8>>), FixtureValue::Bytes(None));
        assert_eq!(FixtureValue::from(None::<serde_json::Value>), FixtureValue::Json(None));
    }

    #[test]
    fn test_plain_query_has_no_params() {
        let fixture = Fixture::from("DELETE FROM t");
        assert_eq!(fixture.query, "DELETE FROM t");
        assert!(fixture.params.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let err = bounded("t_1", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Timeout);
    }
}
