use rusqlite::Connection;
use std::cell::RefCell;

use crate::errors::AppError;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

// Thread-local connection slot, keyed by the path it was opened with.
thread_local! {
    static DB_CONN: RefCell<Option<(String, Connection)>> = const { RefCell::new(None) };
}

#[derive(Clone, Debug)]
pub struct Database {
    path: String,
}

impl Database {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Provides a mutable connection to the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AppError>,
    {
        DB_CONN
            .try_with(|cell| {
                let mut slot = cell.borrow_mut();
                let stale = !matches!(slot.as_ref(), Some((path, _)) if *path == self.path);
                if stale {
                    let conn = Connection::open(&self.path)
                        .map_err(|e| AppError::DbError(format!("Open DB failed: {e}")))?;
                    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                    *slot = Some((self.path.clone(), conn));
                }
                match slot.as_mut() {
                    Some((_, conn)) => f(conn),
                    None => Err(AppError::DbError("connection slot empty".into())),
                }
            })
            .map_err(|_| AppError::DbError("thread-local connection unavailable".into()))?
    }
}

/// Creates the history tables if they are missing.
pub fn init_db(db: &Database) -> Result<(), AppError> {
    db.with_conn(|conn| {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::DbError(format!("Failed to apply schema: {e}")))?;
        Ok(())
    })?;

    tracing::debug!(path = db.path(), "history database ready");
    Ok(())
}
