//! Cross-stage lot index
//!
//! One searchable view over every stage's lots, joined with the urgency and
//! remarks store. All reads for a single call happen inside one read
//! transaction, so a lot that moves concurrently shows up exactly once.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use anyhow::Result;
use crate::filter::FilterExpr;
use crate::models::{Lot, LotFlags, LotStatus, Stage, StageGraph};
use crate::repo::{FlagRepo, LotRepo};

/// A lot as seen by search: ledger row, derived status and flags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedLot {
    #[serde(flatten)]
    pub lot: Lot,
    pub status: LotStatus,
    pub qty_pending: i64,
    pub flags: LotFlags,
}

impl IndexedLot {
    pub fn new(lot: Lot, flags: LotFlags) -> Self {
        Self {
            status: lot.status(),
            qty_pending: lot.qty_pending(),
            lot,
            flags,
        }
    }
}

/// Per-stage dashboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub lots: usize,
    pub total_qty: i64,
    pub pending_qty: i64,
    pub urgent: usize,
}

/// Quantity accounting for one order line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConservationReport {
    pub unique_code: String,
    pub parent_order_qty: i64,
    /// Pending quantity summed over every record of the order line
    pub in_flight: i64,
    /// Quantity executed at the terminal stage
    pub dispatched: i64,
    pub records: usize,
}

impl ConservationReport {
    pub fn holds(&self) -> bool {
        self.in_flight + self.dispatched == self.parent_order_qty
    }
}

pub struct CrossStageIndex;

impl CrossStageIndex {
    /// Lots resident in one stage, joined with their flags
    pub fn list_lots(conn: &Connection, stage: Stage) -> Result<Vec<IndexedLot>> {
        let tx = conn.unchecked_transaction()?;
        let lots = LotRepo::list_by_stage(&tx, stage)?;
        let flags = flags_by_code(&tx)?;
        tx.commit()?;

        Ok(lots.into_iter().map(|lot| join_flags(lot, &flags)).collect())
    }

    /// Every lot matching `filter`, in workflow order then by id.
    ///
    /// Lots fully dispatched at the terminal stage are left out unless
    /// `include_dispatched` is set or the filter names a stage or lot id.
    pub fn search(conn: &Connection, filter: &FilterExpr, include_dispatched: bool) -> Result<Vec<IndexedLot>> {
        let include_dispatched = include_dispatched || filter.mentions_stage();

        let tx = conn.unchecked_transaction()?;
        let lots = LotRepo::list_all(&tx)?;
        let flags = flags_by_code(&tx)?;
        tx.commit()?;

        let mut rows: Vec<IndexedLot> = lots
            .into_iter()
            .filter(|lot| include_dispatched || !lot.is_dispatched())
            .map(|lot| join_flags(lot, &flags))
            .filter(|row| filter.matches(row))
            .collect();
        rows.sort_by_key(|row| (row.lot.stage, row.lot.id));

        log::debug!("Search matched {} lots", rows.len());
        Ok(rows)
    }

    /// Lot count and quantities for every stage, in workflow order
    pub fn stage_summary(conn: &Connection) -> Result<Vec<StageSummary>> {
        let rows = Self::search(conn, &FilterExpr::All, false)?;

        let summary = StageGraph::ordered()
            .iter()
            .map(|&stage| {
                let at_stage: Vec<&IndexedLot> = rows.iter().filter(|row| row.lot.stage == stage).collect();
                StageSummary {
                    stage,
                    lots: at_stage.len(),
                    total_qty: at_stage.iter().map(|row| row.lot.qty).sum(),
                    pending_qty: at_stage.iter().map(|row| row.qty_pending).sum(),
                    urgent: at_stage.iter().filter(|row| row.flags.urgent).count(),
                }
            })
            .collect();
        Ok(summary)
    }

    /// Check that an order line's quantity is fully accounted for
    pub fn conservation(conn: &Connection, unique_code: &str) -> Result<ConservationReport> {
        let code = unique_code.trim();
        let lots = LotRepo::list_by_code(conn, code)?;
        let Some(first) = lots.first() else {
            anyhow::bail!("Order line '{}' not found", code);
        };

        let in_flight = lots.iter().map(Lot::qty_pending).sum();
        let dispatched = lots
            .iter()
            .filter(|lot| StageGraph::is_terminal(lot.stage))
            .map(|lot| lot.qty_executed)
            .sum();

        Ok(ConservationReport {
            unique_code: code.to_string(),
            parent_order_qty: first.parent_order_qty,
            in_flight,
            dispatched,
            records: lots.len(),
        })
    }
}

fn flags_by_code(conn: &Connection) -> Result<HashMap<String, LotFlags>> {
    Ok(FlagRepo::list_all(conn)?
        .into_iter()
        .map(|flags| (flags.unique_code.clone(), flags))
        .collect())
}

fn join_flags(lot: Lot, flags: &HashMap<String, LotFlags>) -> IndexedLot {
    let flags = flags
        .get(&lot.unique_code)
        .cloned()
        .unwrap_or_else(|| LotFlags::unset(&lot.unique_code));
    IndexedLot::new(lot, flags)
}
