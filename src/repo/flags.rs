use rusqlite::{Connection, OptionalExtension};
use crate::engine::EngineError;
use crate::models::LotFlags;
use anyhow::{Context, Result};

/// Urgency and remarks store
///
/// Keyed by the order line's business code rather than a lot record id, so a
/// flag set while the lot sits in Semi QC is still visible after it has moved
/// on to Assembly or been split across two stages.
pub struct FlagRepo;

impl FlagRepo {
    /// Mark or unmark an order line as urgent
    pub fn set_urgent(conn: &Connection, unique_code: &str, urgent: bool) -> Result<LotFlags> {
        let key = validate_key(unique_code)?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO lot_flags (unique_code, urgent, remark, modified_ts) VALUES (?1, ?2, '', ?3)
             ON CONFLICT(unique_code) DO UPDATE SET urgent = excluded.urgent, modified_ts = excluded.modified_ts",
            rusqlite::params![key, urgent, now],
        )
        .with_context(|| format!("Failed to set urgent flag for {}", key))?;

        log::info!("Urgent flag for {} set to {}", key, urgent);
        Self::get(conn, key)
    }

    /// Replace the remark on an order line; an empty remark clears it
    pub fn set_remark(conn: &Connection, unique_code: &str, remark: &str) -> Result<LotFlags> {
        let key = validate_key(unique_code)?;
        let now = chrono::Utc::now().timestamp();
        let remark = remark.trim();

        conn.execute(
            "INSERT INTO lot_flags (unique_code, urgent, remark, modified_ts) VALUES (?1, 0, ?2, ?3)
             ON CONFLICT(unique_code) DO UPDATE SET remark = excluded.remark, modified_ts = excluded.modified_ts",
            rusqlite::params![key, remark, now],
        )
        .with_context(|| format!("Failed to set remark for {}", key))?;

        Self::get(conn, key)
    }

    /// Flags for an order line; unset codes read as not urgent with no remark
    pub fn get(conn: &Connection, unique_code: &str) -> Result<LotFlags> {
        let key = validate_key(unique_code)?;
        let mut stmt = conn.prepare(
            "SELECT unique_code, urgent, remark, modified_ts FROM lot_flags WHERE unique_code = ?1",
        )?;

        let flags = stmt
            .query_row([key], |row| {
                Ok(LotFlags {
                    unique_code: row.get(0)?,
                    urgent: row.get(1)?,
                    remark: row.get(2)?,
                    modified_ts: Some(row.get(3)?),
                })
            })
            .optional()
            .context("Failed to query lot flags")?;

        Ok(flags.unwrap_or_else(|| LotFlags::unset(key)))
    }

    /// Order lines currently marked urgent
    pub fn list_urgent(conn: &Connection) -> Result<Vec<LotFlags>> {
        Self::query_flags(
            conn,
            "SELECT unique_code, urgent, remark, modified_ts FROM lot_flags
             WHERE urgent = 1 ORDER BY unique_code",
        )
    }

    /// Every order line that has ever been flagged or remarked
    pub fn list_all(conn: &Connection) -> Result<Vec<LotFlags>> {
        Self::query_flags(
            conn,
            "SELECT unique_code, urgent, remark, modified_ts FROM lot_flags ORDER BY unique_code",
        )
    }

    fn query_flags(conn: &Connection, sql: &str) -> Result<Vec<LotFlags>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(LotFlags {
                unique_code: row.get(0)?,
                urgent: row.get(1)?,
                remark: row.get(2)?,
                modified_ts: Some(row.get(3)?),
            })
        })?;

        let mut flags = Vec::new();
        for row in rows {
            flags.push(row?);
        }
        Ok(flags)
    }
}

fn validate_key(unique_code: &str) -> Result<&str> {
    let key = unique_code.trim();
    if key.is_empty() {
        return Err(EngineError::EmptyKey.into());
    }
    Ok(key)
}
