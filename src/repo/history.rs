use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{HistoryEntry, Stage};
use anyhow::{Context, Result};

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: Some(row.get(0)?),
        lot_id: row.get(1)?,
        stage: row.get(2)?,
        entered_ts: row.get(3)?,
        exited_ts: row.get(4)?,
        qty_processed: row.get(5)?,
    })
}

/// Transition history repository
///
/// Append-only: entries are opened when a lot enters a stage, accumulate the
/// quantity processed there, and are stamped with `exited_ts` once nothing
/// is left pending. Nothing else rewrites them.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Open a stage visit for a lot
    /// Returns error if the lot already has an open visit (enforced by unique index)
    pub fn open(conn: &Connection, lot_id: i64, stage: Stage, entered_ts: i64) -> Result<HistoryEntry> {
        conn.execute(
            "INSERT INTO lot_history (lot_id, stage, entered_ts, exited_ts, qty_processed)
             VALUES (?1, ?2, ?3, NULL, 0)",
            rusqlite::params![lot_id, stage, entered_ts],
        )
        .map_err(|e| {
            let message = if e.to_string().contains("UNIQUE constraint") {
                format!("Lot {} already has an open stage visit", lot_id)
            } else {
                format!("Failed to open history for lot {}", lot_id)
            };
            anyhow::Error::new(e).context(message)
        })?;

        Ok(HistoryEntry {
            id: Some(conn.last_insert_rowid()),
            lot_id,
            stage,
            entered_ts,
            exited_ts: None,
            qty_processed: 0,
        })
    }

    /// Get the open visit for a lot (if any)
    pub fn get_open(conn: &Connection, lot_id: i64) -> Result<Option<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, lot_id, stage, entered_ts, exited_ts, qty_processed
             FROM lot_history WHERE lot_id = ?1 AND exited_ts IS NULL",
        )?;
        stmt.query_row([lot_id], entry_from_row)
            .optional()
            .context("Failed to query open history entry")
    }

    /// Add processed quantity to the lot's open visit, closing it at `close_ts` if given
    pub fn record(conn: &Connection, lot_id: i64, qty_delta: i64, close_ts: Option<i64>) -> Result<HistoryEntry> {
        let open = Self::get_open(conn, lot_id)?
            .with_context(|| format!("Lot {} has no open stage visit", lot_id))?;
        let entry_id = open.id.context("History entry has no id")?;

        conn.execute(
            "UPDATE lot_history SET qty_processed = qty_processed + ?1, exited_ts = ?2 WHERE id = ?3",
            rusqlite::params![qty_delta, close_ts, entry_id],
        )
        .with_context(|| format!("Failed to update history for lot {}", lot_id))?;

        Ok(HistoryEntry {
            exited_ts: close_ts,
            qty_processed: open.qty_processed + qty_delta,
            ..open
        })
    }

    /// Stamp `exited_ts` on the lot's open visit without changing its quantity
    pub fn close(conn: &Connection, lot_id: i64, exited_ts: i64) -> Result<Option<HistoryEntry>> {
        match Self::get_open(conn, lot_id)? {
            Some(_) => Ok(Some(Self::record(conn, lot_id, 0, Some(exited_ts))?)),
            None => Ok(None),
        }
    }

    /// All visits of one lot, ordered by entry time (oldest first)
    pub fn timeline(conn: &Connection, lot_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, lot_id, stage, entered_ts, exited_ts, qty_processed
             FROM lot_history
             WHERE lot_id = ?1
             ORDER BY entered_ts ASC, id ASC",
        )?;
        let rows = stmt.query_map([lot_id], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// The whole journey of an order line across every lot record it produced
    pub fn lineage(conn: &Connection, unique_code: &str) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT h.id, h.lot_id, h.stage, h.entered_ts, h.exited_ts, h.qty_processed
             FROM lot_history h
             JOIN lots l ON l.id = h.lot_id
             WHERE l.unique_code = ?1
             ORDER BY h.entered_ts ASC, h.id ASC",
        )?;
        let rows = stmt.query_map([unique_code], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Every history entry in insertion order
    pub fn list_all(conn: &Connection) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, lot_id, stage, entered_ts, exited_ts, qty_processed
             FROM lot_history ORDER BY id",
        )?;
        let rows = stmt.query_map([], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
