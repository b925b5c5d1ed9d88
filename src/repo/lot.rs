use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{Lot, Stage};
use crate::repo::HistoryRepo;
use anyhow::{Context, Result};
use std::collections::HashMap;

impl ToSql for Stage {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Stage {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Stage::from_str(s).ok_or_else(|| FromSqlError::Other(format!("unknown stage '{}'", s).into()))
    }
}

const LOT_COLUMNS: &str = "id, unique_code, split_id, parent_lot_id, parent_order_qty, qty, qty_executed,
                           stage, party, product_code, entry_date, attrs_json, created_ts, modified_ts";

fn lot_from_row(row: &Row<'_>) -> rusqlite::Result<Lot> {
    let attrs_json: Option<String> = row.get(11)?;
    let mut attrs = HashMap::new();
    if let Some(json) = attrs_json {
        if let Ok(parsed) = serde_json::from_str::<HashMap<String, String>>(&json) {
            attrs = parsed;
        }
    }

    Ok(Lot {
        id: Some(row.get(0)?),
        unique_code: row.get(1)?,
        split_id: row.get(2)?,
        parent_lot_id: row.get(3)?,
        parent_order_qty: row.get(4)?,
        qty: row.get(5)?,
        qty_executed: row.get(6)?,
        stage: row.get(7)?,
        party: row.get(8)?,
        product_code: row.get(9)?,
        entry_date: row.get(10)?,
        attrs,
        created_ts: row.get(12)?,
        modified_ts: row.get(13)?,
    })
}

/// Lot repository for database operations
///
/// Rows are append-only apart from `qty_executed`: forwarding quantity to the
/// next stage always inserts a new row, so every row describes exactly one
/// stage residency.
///
/// # Example
///
/// ```no_run
/// use lotflow::db::DbConnection;
/// use lotflow::models::Lot;
/// use lotflow::repo::LotRepo;
///
/// let conn = DbConnection::connect().unwrap();
/// let lot = LotRepo::create_root(&conn, &Lot::new_root("SO-2291-4".to_string(), 36)).unwrap();
/// ```
pub struct LotRepo;

impl LotRepo {
    /// Register a Planning lot for an order line and open its first history entry
    pub fn create_root(conn: &Connection, lot: &Lot) -> Result<Lot> {
        if lot.unique_code.trim().is_empty() {
            anyhow::bail!("Order line code cannot be empty");
        }
        if lot.qty <= 0 || lot.qty != lot.parent_order_qty {
            anyhow::bail!(
                "Order quantity must be positive and fully pending (qty {}, order qty {})",
                lot.qty,
                lot.parent_order_qty
            );
        }
        if lot.stage != Stage::Planning || lot.parent_lot_id.is_some() || lot.qty_executed != 0 {
            anyhow::bail!("New order lines must start unprocessed in Planning");
        }

        let tx = conn.unchecked_transaction()?;
        let created = Self::insert(&tx, lot).map_err(|e| {
            if format!("{:#}", e).contains("UNIQUE constraint") {
                anyhow::anyhow!("Order line '{}' is already in the ledger", lot.unique_code)
            } else {
                e
            }
        })?;
        let lot_id = created.id.context("Inserted lot has no id")?;
        HistoryRepo::open(&tx, lot_id, created.stage, created.created_ts)?;
        tx.commit()?;

        log::info!(
            "Lot {} ({}) entered {} with qty {}",
            lot_id, created.unique_code, created.stage, created.qty
        );
        Ok(created)
    }

    /// Insert a lot row as-is. Callers own history bookkeeping.
    pub fn insert(conn: &Connection, lot: &Lot) -> Result<Lot> {
        let attrs_json = if lot.attrs.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&lot.attrs)?)
        };

        conn.execute(
            "INSERT INTO lots (unique_code, split_id, parent_lot_id, parent_order_qty, qty, qty_executed,
                    stage, party, product_code, entry_date, attrs_json, created_ts, modified_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                lot.unique_code,
                lot.split_id,
                lot.parent_lot_id,
                lot.parent_order_qty,
                lot.qty,
                lot.qty_executed,
                lot.stage,
                lot.party,
                lot.product_code,
                lot.entry_date,
                attrs_json,
                lot.created_ts,
                lot.modified_ts,
            ],
        )
        .with_context(|| format!("Failed to insert lot {} at {}", lot.unique_code, lot.stage))?;

        Ok(Lot {
            id: Some(conn.last_insert_rowid()),
            ..lot.clone()
        })
    }

    /// Get lot by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Lot>> {
        let sql = format!("SELECT {} FROM lots WHERE id = ?1", LOT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_row([id], lot_from_row)
            .optional()
            .with_context(|| format!("Failed to query lot {}", id))
    }

    /// All lots resident in one stage, oldest first
    pub fn list_by_stage(conn: &Connection, stage: Stage) -> Result<Vec<Lot>> {
        let sql = format!("SELECT {} FROM lots WHERE stage = ?1 ORDER BY id", LOT_COLUMNS);
        Self::query_lots(conn, &sql, rusqlite::params![stage])
    }

    /// Every lot record that belongs to an order line
    pub fn list_by_code(conn: &Connection, unique_code: &str) -> Result<Vec<Lot>> {
        let sql = format!("SELECT {} FROM lots WHERE unique_code = ?1 ORDER BY id", LOT_COLUMNS);
        Self::query_lots(conn, &sql, rusqlite::params![unique_code])
    }

    /// Siblings produced by one split event, plus anything later forwarded from them
    pub fn list_by_split(conn: &Connection, split_id: &str) -> Result<Vec<Lot>> {
        let sql = format!("SELECT {} FROM lots WHERE split_id = ?1 ORDER BY id", LOT_COLUMNS);
        Self::query_lots(conn, &sql, rusqlite::params![split_id])
    }

    /// List all lot records
    pub fn list_all(conn: &Connection) -> Result<Vec<Lot>> {
        let sql = format!("SELECT {} FROM lots ORDER BY id", LOT_COLUMNS);
        Self::query_lots(conn, &sql, [])
    }

    /// Add `delta` to a lot's executed quantity.
    ///
    /// The update only applies if `qty_executed` still equals
    /// `expected_executed` and the result stays within `qty`; returns false
    /// when another writer got there first.
    pub fn record_execution(
        conn: &Connection,
        id: i64,
        expected_executed: i64,
        delta: i64,
        now: i64,
    ) -> Result<bool> {
        let updated = conn
            .execute(
                "UPDATE lots SET qty_executed = qty_executed + ?1, modified_ts = ?2
                 WHERE id = ?3 AND qty_executed = ?4 AND qty_executed + ?1 <= qty",
                rusqlite::params![delta, now, id, expected_executed],
            )
            .with_context(|| format!("Failed to record execution on lot {}", id))?;
        Ok(updated == 1)
    }

    fn query_lots<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Lot>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, lot_from_row)?;

        let mut lots = Vec::new();
        for row in rows {
            lots.push(row?);
        }
        Ok(lots)
    }
}
