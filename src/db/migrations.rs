use rusqlite::{Connection, Result, Transaction, TransactionBehavior};
use std::collections::HashMap;

/// Current database schema version
const CURRENT_VERSION: u32 = 2;

/// Migration system for managing database schema versions
pub struct MigrationManager;

impl MigrationManager {
    /// Initialize the database with the current schema
    /// This creates the schema_version table and applies all migrations
    ///
    /// Pending migrations run under one write lock, so connections opening a
    /// fresh file at the same time apply each version exactly once.
    pub fn initialize(conn: &Connection) -> Result<()> {
        if Self::is_current(conn)? {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        // Another connection may have migrated while we waited for the lock
        let current_version = Self::get_version(&tx)?;
        for version in (current_version + 1)..=CURRENT_VERSION {
            Self::apply_migration(&tx, version)?;
        }

        tx.commit()
    }

    /// Whether the schema is already at the current version (read only)
    fn is_current(conn: &Connection) -> Result<bool> {
        let has_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
            [],
            |row| row.get(0),
        )?;
        Ok(has_table && Self::get_version(conn)? >= CURRENT_VERSION)
    }

    /// Apply a specific migration by version number
    fn apply_migration(tx: &Transaction, version: u32) -> Result<()> {
        let migrations = get_migrations();
        if let Some(migration) = migrations.get(&version) {
            migration(tx)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
            log::debug!("Applied schema migration v{}", version);
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
                Some(format!("No migration found for version {}", version)),
            ))
        }
    }

    /// Get the current schema version
    pub fn get_version(conn: &Connection) -> Result<u32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

type Migration = fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>;

/// Get all migrations indexed by version
fn get_migrations() -> HashMap<u32, Migration> {
    let mut migrations: HashMap<u32, Migration> = HashMap::new();
    migrations.insert(1, migration_v1);
    migrations.insert(2, migration_v2);
    migrations
}

/// Migration v1: lot ledger and transition history
fn migration_v1(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    // One row per lot per stage residency
    tx.execute(
        "CREATE TABLE lots (
            id INTEGER PRIMARY KEY,
            unique_code TEXT NOT NULL,
            split_id TEXT NULL,
            parent_lot_id INTEGER NULL REFERENCES lots(id),
            parent_order_qty INTEGER NOT NULL CHECK(parent_order_qty > 0),
            qty INTEGER NOT NULL CHECK(qty > 0),
            qty_executed INTEGER NOT NULL DEFAULT 0
                CHECK(qty_executed >= 0 AND qty_executed <= qty),
            stage TEXT NOT NULL,
            party TEXT NOT NULL DEFAULT '',
            product_code TEXT NOT NULL DEFAULT '',
            entry_date TEXT NOT NULL DEFAULT '',
            attrs_json TEXT NULL,
            created_ts INTEGER NOT NULL,
            modified_ts INTEGER NOT NULL
        )",
        [],
    )?;
    // Note: attrs_json stores the order line's specifications as a flat JSON object

    tx.execute("CREATE INDEX idx_lots_stage ON lots(stage)", [])?;
    tx.execute("CREATE INDEX idx_lots_unique_code ON lots(unique_code)", [])?;
    tx.execute("CREATE INDEX idx_lots_split_id ON lots(split_id)", [])?;

    // Each order line enters Planning exactly once
    tx.execute(
        "CREATE UNIQUE INDEX idx_lots_root_code ON lots(unique_code) WHERE parent_lot_id IS NULL",
        [],
    )?;

    tx.execute(
        "CREATE TABLE lot_history (
            id INTEGER PRIMARY KEY,
            lot_id INTEGER NOT NULL REFERENCES lots(id) ON DELETE CASCADE,
            stage TEXT NOT NULL,
            entered_ts INTEGER NOT NULL,
            exited_ts INTEGER NULL,
            qty_processed INTEGER NOT NULL DEFAULT 0 CHECK(qty_processed >= 0),
            CHECK(exited_ts IS NULL OR exited_ts >= entered_ts)
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_lot_history_lot_entered ON lot_history(lot_id, entered_ts)",
        [],
    )?;

    // At most one open visit per lot
    tx.execute(
        "CREATE UNIQUE INDEX idx_lot_history_open ON lot_history(lot_id) WHERE exited_ts IS NULL",
        [],
    )?;

    Ok(())
}

/// Migration v2: urgency and remarks keyed by business code
fn migration_v2(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "CREATE TABLE lot_flags (
            unique_code TEXT PRIMARY KEY,
            urgent INTEGER NOT NULL DEFAULT 0 CHECK(urgent IN (0, 1)),
            remark TEXT NOT NULL DEFAULT '',
            modified_ts INTEGER NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_lot_flags_urgent ON lot_flags(urgent)",
        [],
    )?;
    Ok(())
}
