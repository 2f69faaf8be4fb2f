//! Postgres database implementation
//!
//! Wraps an async `tokio_postgres::Client` behind the blocking [`Database`]
//! port. The adapter owns a current-thread runtime; the connection task only
//! makes progress while a call is blocked on that runtime, which is all the
//! time the runner needs it.

use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use crate::domain::result::{Error, Result};
use crate::ports::{Database, Dialect};

/// Maximum number of connection attempts
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Errors worth retrying while a freshly started database comes up
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("connection refused")
        || lower.contains("the database system is starting up")
        || lower.contains("timed out")
        || lower.contains("connection reset")
}

/// Postgres-backed [`Database`]
pub struct PostgresDatabase {
    runtime: Runtime,
    client: Client,
}

impl PostgresDatabase {
    /// Connect using a `postgres://` URL
    ///
    /// Transient failures are retried with exponential backoff; the final
    /// failure is reported as a connectivity error.
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let mut last_error = String::new();

        for attempt in 0..MAX_RETRIES {
            match runtime.block_on(tokio_postgres::connect(url, NoTls)) {
                Ok((client, connection)) => {
                    runtime.spawn(async move {
                        if let Err(e) = connection.await {
                            eprintln!("[pgmigrate] Postgres connection closed: {}", e);
                        }
                    });
                    return Ok(Self { runtime, client });
                }
                Err(e) => {
                    last_error = e.to_string();
                    if is_retryable_error(&last_error) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[pgmigrate] Database unavailable, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            last_error
                        );
                        thread::sleep(delay);
                        continue;
                    }
                    break;
                }
            }
        }

        Err(Error::Connectivity(last_error))
    }
}

fn bind<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl Database for PostgresDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.runtime.block_on(self.client.batch_execute(sql))?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<u64> {
        let bound = bind(params);
        let affected = self.runtime.block_on(self.client.execute(sql, &bound))?;
        Ok(affected)
    }

    fn query_rows(
        &mut self,
        sql: &str,
        params: &[&str],
        columns: usize,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let bound = bind(params);
        let rows = self.runtime.block_on(self.client.query(sql, &bound))?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let values = (0..columns)
                .map(|idx| row.try_get::<_, Option<String>>(idx))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result.push(values);
        }
        Ok(result)
    }

    /// Session-level advisory lock; blocks until the holder releases it
    fn lock(&mut self, key: i64) -> Result<()> {
        self.batch_execute(&format!("SELECT pg_advisory_lock({})", key))
            .map_err(|e| Error::Lock(e.to_string()))
    }

    fn unlock(&mut self, key: i64) -> Result<()> {
        self.batch_execute(&format!("SELECT pg_advisory_unlock({})", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error(
            "error connecting to server: Connection refused (os error 111)"
        ));
        assert!(is_retryable_error("db error: FATAL: the database system is starting up"));
        assert!(!is_retryable_error("db error: FATAL: password authentication failed"));
    }
}
