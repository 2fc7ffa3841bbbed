//! Database layer for the strata toolkit.
//!
//! Provides SQLite connection pooling (via `r2d2`), per-connection
//! initialization, versioned SQL migrations loaded from a script directory,
//! and the configuration they are built from. Schema changes reach the
//! database only through migration scripts managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite as the backing store**: the toolkit targets embedded,
//!   single-process use. `:memory:` and shared-cache memory URIs are
//!   supported for tests.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management. The pool is built without touching the database,
//!   so connection failures surface at acquisition time, not construction.
//! - **Directory-scanned migrations**: scripts named `V<version>__<desc>.sql`
//!   are enumerated in numeric version order and applied at most once,
//!   tracked by the `_strata_migrations` table. Each script runs inside its
//!   own IMMEDIATE transaction together with its tracking row.

mod config;
mod migrate;
mod pool;

pub use config::{load_config, Config, ConfigError, DatabaseConfig};
pub use migrate::{
    migration_info, run_migrations, MigrationError, MigrationRecord, MigrationState,
};
pub use pool::{acquire, create_pool, ConnectionError, DbConnection, DbPool};
