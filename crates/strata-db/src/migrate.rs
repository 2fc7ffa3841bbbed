//! Versioned SQL migration runner.
//!
//! Migrations are plain SQL files in a script directory, named
//! `V<version>__<description>.sql` (for example `V1__create_person.sql`).
//! They run sequentially in numeric version order, tracked by the
//! `_strata_migrations` table. Each migration runs exactly once — if it has
//! already been applied, it is skipped. A script and its tracking row
//! commit in one IMMEDIATE transaction, so a failed script leaves nothing
//! behind and halts the run before any later script.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

/// A single migration script loaded from the script directory.
struct MigrationScript {
    version: u64,
    description: String,
    path: PathBuf,
    sql: String,
}

/// Whether a script has been recorded in the tracking table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// The script has been applied and its tracking row committed.
    Applied,
    /// The script has not run yet.
    Pending,
}

/// One row of the migration report returned by [`migration_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Numeric version parsed from the filename.
    pub version: u64,
    /// Human-readable description parsed from the filename, with
    /// underscores replaced by spaces.
    pub description: String,
    /// Physical location of the script file.
    pub location: PathBuf,
    /// Applied or pending.
    pub state: MigrationState,
}

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The script directory could not be read.
    #[error("failed to read migration directory '{path}': {source}")]
    DirRead {
        /// The directory that failed to enumerate.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A script file could not be read.
    #[error("failed to read migration script '{path}': {source}")]
    ScriptRead {
        /// The script that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A `.sql` file does not follow the `V<version>__<description>.sql`
    /// naming convention.
    #[error("migration script '{path}' does not match V<version>__<description>.sql")]
    BadScriptName {
        /// The offending file.
        path: PathBuf,
    },

    /// Two scripts declare the same version.
    #[error("duplicate migration version {version} at '{path}'")]
    DuplicateVersion {
        /// The duplicated version number.
        version: u64,
        /// The second script claiming it.
        path: PathBuf,
    },

    /// A SQL statement within a migration failed.
    #[error("migration V{version} ({description}) failed: {source}")]
    ExecutionFailed {
        /// Version of the migration that failed.
        version: u64,
        /// Description of the migration that failed.
        description: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Parses `V<version>__<description>.sql` into its version and description.
fn parse_script_name(file_name: &str) -> Option<(u64, String)> {
    let stem = file_name.strip_suffix(".sql")?;
    let rest = stem.strip_prefix('V')?;
    let (version, description) = rest.split_once("__")?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = version.parse().ok()?;
    Some((version, description.replace('_', " ")))
}

/// Enumerates the script directory in ascending version order.
///
/// Files without a `.sql` extension are ignored; `.sql` files that do not
/// follow the naming convention, and duplicate versions, fail the whole
/// run before anything is applied.
fn load_scripts(dir: &Path) -> Result<Vec<MigrationScript>, MigrationError> {
    let entries = std::fs::read_dir(dir).map_err(|e| MigrationError::DirRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::DirRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::BadScriptName { path: path.clone() })?;
        let (version, description) = parse_script_name(file_name)
            .ok_or_else(|| MigrationError::BadScriptName { path: path.clone() })?;

        let sql = std::fs::read_to_string(&path).map_err(|e| MigrationError::ScriptRead {
            path: path.clone(),
            source: e,
        })?;

        scripts.push(MigrationScript {
            version,
            description,
            path,
            sql,
        });
    }

    scripts.sort_by_key(|s| s.version);
    for pair in scripts.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(MigrationError::DuplicateVersion {
                version: pair[1].version,
                path: pair[1].path.clone(),
            });
        }
    }

    Ok(scripts)
}

/// Creates the tracking table when it does not exist yet.
fn ensure_tracking_table(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _strata_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(MigrationError::StateQuery)
}

fn is_applied(conn: &Connection, version: u64) -> Result<bool, MigrationError> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM _strata_migrations WHERE version = ?1",
        [version as i64],
        |row| row.get(0),
    )
    .map_err(MigrationError::StateQuery)
}

/// Runs all pending migrations from `dir` against the given connection.
///
/// Scripts already recorded in `_strata_migrations` are skipped. Pending
/// scripts are applied in ascending version order; each script body and its
/// tracking row commit in one IMMEDIATE transaction, which also serialises
/// concurrent runners against the same database. The run halts at the first
/// failing script, leaving later scripts unapplied.
///
/// Returns the number of scripts applied by this run.
///
/// # Errors
///
/// Returns `MigrationError` if the directory cannot be enumerated, a script
/// is misnamed or unreadable, a version is duplicated, a script fails to
/// execute, or the tracking table cannot be queried.
pub fn run_migrations(conn: &mut Connection, dir: &Path) -> Result<usize, MigrationError> {
    let scripts = load_scripts(dir)?;
    ensure_tracking_table(conn)?;

    let mut applied = 0;

    for script in &scripts {
        if is_applied(conn, script.version)? {
            tracing::debug!(
                version = script.version,
                description = %script.description,
                "migration already applied, skipping"
            );
            continue;
        }

        let fail = |e: rusqlite::Error| MigrationError::ExecutionFailed {
            version: script.version,
            description: script.description.clone(),
            source: e,
        };

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(fail)?;

        // A concurrent runner may have applied this script between the
        // check above and our taking the write lock. Re-check now that the
        // lock is held so the race resolves to a skip, not a conflict.
        if is_applied(&tx, script.version)? {
            tracing::debug!(
                version = script.version,
                description = %script.description,
                "migration applied by a concurrent runner, skipping"
            );
            continue;
        }

        tracing::info!(
            version = script.version,
            description = %script.description,
            location = %script.path.display(),
            "applying migration"
        );

        tx.execute_batch(&script.sql).map_err(fail)?;

        tx.execute(
            "INSERT INTO _strata_migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![script.version as i64, script.description],
        )
        .map_err(fail)?;

        tx.commit().map_err(fail)?;

        applied += 1;
    }

    Ok(applied)
}

/// Reports every script in `dir` with its applied/pending state, in
/// ascending version order.
///
/// # Errors
///
/// Returns `MigrationError` if the directory cannot be enumerated, a script
/// is misnamed, or the tracking table cannot be queried.
pub fn migration_info(
    conn: &Connection,
    dir: &Path,
) -> Result<Vec<MigrationRecord>, MigrationError> {
    let scripts = load_scripts(dir)?;
    ensure_tracking_table(conn)?;

    let mut records = Vec::with_capacity(scripts.len());
    for script in scripts {
        let state = if is_applied(conn, script.version)? {
            MigrationState::Applied
        } else {
            MigrationState::Pending
        };
        records.push(MigrationRecord {
            version: script.version,
            description: script.description,
            location: script.path,
            state,
        });
    }

    Ok(records)
}
