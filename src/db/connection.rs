use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use crate::config::{Settings, DEFAULT_LOCK_TIMEOUT_MS};
use crate::db::migrations::MigrationManager;

const MAX_BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Database connection manager
pub struct DbConnection;

impl DbConnection {
    /// Connect to the database named in the rc file, creating it and parent directories if needed
    pub fn connect() -> Result<Connection> {
        let settings = Settings::load()?;
        Self::connect_with(&settings)
    }

    /// Connect to the configured database; waits on another writer are bounded by `lock.timeout_ms`
    pub fn connect_with(settings: &Settings) -> Result<Connection> {
        Self::open_file(&settings.data_location, settings.lock_timeout)
    }

    /// Connect to a database file at an explicit path
    pub fn connect_at(db_path: &Path) -> Result<Connection> {
        Self::open_file(db_path, Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS))
    }

    fn open_file(db_path: &Path, busy_timeout: Duration) -> Result<Connection> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // SQLite takes the wait in whole milliseconds as an i32
        conn.busy_timeout(busy_timeout.min(MAX_BUSY_TIMEOUT))
            .context("Failed to set busy timeout")?;
        // WAL lets readers keep a consistent snapshot while an assignment commits
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        log::debug!("Journal mode {}", mode);
        Self::configure(&conn)?;

        log::debug!("Opened ledger at {}", db_path.display());
        Ok(conn)
    }

    /// Connect to an in-memory database (for testing)
    pub fn connect_in_memory() -> Result<Connection> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory database")?;
        Self::configure(&conn)?;
        Ok(conn)
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        MigrationManager::initialize(conn)
            .context("Failed to initialize database schema")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_connect_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("ledger.db");

        let _conn = DbConnection::connect_at(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_concurrent_first_connections_migrate_once() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ledger.db");
        let mode: String = Connection::open(&db_path)
            .unwrap()
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db_path = db_path.clone();
                std::thread::spawn(move || DbConnection::connect_at(&db_path).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let conn = DbConnection::connect_at(&db_path).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_connect_with_extreme_lock_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            data_location: temp_dir.path().join("ledger.db"),
            lock_timeout: Duration::from_millis(u64::MAX),
        };
        assert!(DbConnection::connect_with(&settings).is_ok());
    }

    #[test]
    fn test_connect_in_memory() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let version = MigrationManager::get_version(&conn).unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
