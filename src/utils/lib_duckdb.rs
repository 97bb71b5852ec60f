use std::{fmt::Display, thread, time::Duration};

use duckdb::{AccessMode, Config};
use log::warn;

/// How long to keep trying while another process holds the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 8,
            initial_wait: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Call `f` until it succeeds, fails with an error that is not
    /// transient, or runs out of attempts.  The wait doubles after each try.
    pub fn run<T, E: Display>(
        &self,
        what: &str,
        mut f: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempts = 0;
        let mut wait_duration = self.initial_wait;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.max_attempts || !is_transient(&e.to_string()) {
                        return Err(e);
                    }
                    warn!(
                        "Retrying {} after error: {} (attempt {}/{})",
                        what, e, attempts, self.max_attempts
                    );
                    thread::sleep(wait_duration);
                    wait_duration *= 2;
                }
            }
        }
    }
}

/// DuckDB reports a file held by another process, or a transaction
/// conflict, with these messages.  Anything else will fail the same way on
/// the next try.
pub fn is_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    [
        "could not set lock",
        "conflicting lock",
        "write-write conflict",
        "io error",
    ]
    .iter()
    .any(|m| message.contains(m))
}

pub trait WithRetry {
    /// Use this function for `execute_batch` statements that may collide with
    /// another writer holding the database, e.g. schema creation.
    fn execute_batch_with_retry(&self, sql: &str, policy: RetryPolicy)
        -> Result<(), duckdb::Error>;
}

impl WithRetry for duckdb::Connection {
    fn execute_batch_with_retry(
        &self,
        sql: &str,
        policy: RetryPolicy,
    ) -> Result<(), duckdb::Error> {
        policy.run("DuckDB execute_batch", || self.execute_batch(sql))
    }
}

/// Open a DuckDB connection.  Another process writing to the same file holds
/// a lock, so back off and try again.
pub fn open_with_retry(
    duckdb_path: &str,
    access_mode: AccessMode,
    policy: RetryPolicy,
) -> Result<duckdb::Connection, duckdb::Error> {
    policy.run(&format!("open {}", duckdb_path), || {
        // AccessMode is not Clone; rebuild the same variant for each attempt.
        let mode = match access_mode {
            AccessMode::Automatic => AccessMode::Automatic,
            AccessMode::ReadOnly => AccessMode::ReadOnly,
            AccessMode::ReadWrite => AccessMode::ReadWrite,
        };
        let config = Config::default().access_mode(mode)?;
        duckdb::Connection::open_with_flags(duckdb_path, config)
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, error::Error, time::Instant};

    use super::*;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_wait: Duration::from_millis(1),
        }
    }

    #[test]
    fn transient_messages() {
        assert!(is_transient(
            "IO Error: Could not set lock on file \"/data/energy.duckdb\": Conflicting lock is held"
        ));
        assert!(is_transient(
            "TransactionContext Error: Catalog write-write conflict on create with \"dim_date\""
        ));
        assert!(!is_transient(
            "Catalog Error: Table with name \"dim_date\" already exists!"
        ));
        assert!(!is_transient("Parser Error: syntax error at or near \"TABEL\""));
    }

    #[test]
    fn lock_errors_are_retried() {
        let calls = Cell::new(0);
        let res: Result<(), String> = quick(3).run("test", || {
            calls.set(calls.get() + 1);
            Err("IO Error: Could not set lock on file".to_string())
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 3);

        let calls = Cell::new(0);
        let res: Result<u32, String> = quick(5).run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("IO Error: Could not set lock on file".to_string())
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(res, Ok(3));
    }

    #[test]
    fn other_errors_fail_at_once() {
        let calls = Cell::new(0);
        let res: Result<(), String> = quick(8).run("test", || {
            calls.set(calls.get() + 1);
            Err("Parser Error: syntax error".to_string())
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn bad_ddl_is_not_retried() -> Result<(), Box<dyn Error>> {
        let conn = duckdb::Connection::open_in_memory()?;
        conn.execute_batch_with_retry("CREATE TABLE t (x INTEGER);", RetryPolicy::default())?;
        let start = Instant::now();
        let res =
            conn.execute_batch_with_retry("CREATE TABLE t (x INTEGER);", RetryPolicy::default());
        assert!(res.is_err());
        // 8 attempts from 25ms would sleep for over 3s
        assert!(start.elapsed() < Duration::from_millis(500));
        Ok(())
    }
}
