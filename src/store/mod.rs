//! Persistence layer over SQLite.
//!
//! The database is the only authoritative state in the system: the engine
//! re-derives everything (due-ness, expiry, orphaned runs) from these tables
//! after a restart. All multi-row mutations go through transactions.

mod error;
mod metrics;
mod models;
mod runs;
mod schedules;
mod targets;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use error::{Result, StoreError};
pub use metrics::{MetricsSnapshot, ScheduleMetrics};
pub use models::{Attempt, ErrorType, Run, RunStatus, Schedule, ScheduleStatus, ScheduleType, Target};
pub use runs::{NewAttempt, RunFilter};
pub use schedules::NewSchedule;
pub use targets::{NewTarget, TargetPatch};

const SCHEMA: &str = include_str!("schema.sql");

/// Handle to the SQLite database. Cheap to clone; all repositories are
/// methods on this type.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database on a single pinned connection.
    ///
    /// SQLite gives every connection its own `:memory:` database, so the
    /// pool must never open a second connection or drop the first.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the schema (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
