use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Context;
use crate::config::Settings;
use crate::engine::locks::elapsed_ms;
use crate::engine::{EngineError, LotLocks};
use crate::models::{Lot, Stage, StageGraph};
use crate::repo::{HistoryRepo, LotRepo};

/// One destination of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Leg {
    pub stage: Stage,
    pub qty: i64,
}

/// A request to forward quantity from one lot
///
/// With `split` set, both legs are taken from the same lot in one step and
/// must together consume everything still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignRequest {
    pub lot_id: i64,
    pub to: Leg,
    pub split: Option<Leg>,
}

impl AssignRequest {
    pub fn plain(lot_id: i64, stage: Stage, qty: i64) -> Self {
        Self {
            lot_id,
            to: Leg { stage, qty },
            split: None,
        }
    }

    pub fn split(lot_id: i64, first: (Stage, i64), second: (Stage, i64)) -> Self {
        Self {
            lot_id,
            to: Leg { stage: first.0, qty: first.1 },
            split: Some(Leg { stage: second.0, qty: second.1 }),
        }
    }

    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    pub fn legs(&self) -> impl Iterator<Item = Leg> {
        std::iter::once(self.to).chain(self.split)
    }

    /// Quantity taken from the source lot; `None` if the legs overflow
    pub fn total_qty(&self) -> Option<i64> {
        self.legs().try_fold(0i64, |total, leg| total.checked_add(leg.qty))
    }
}

/// Result of a committed assignment
#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub from_stage: Stage,
    /// Source lot as it stands after the assignment
    pub source: Lot,
    /// New lot records, in leg order
    pub created: Vec<Lot>,
    pub split_id: Option<String>,
    /// Whether the source's stage visit was closed
    pub source_closed: bool,
}

/// Validates and executes stage transitions
///
/// # Example
///
/// ```no_run
/// use lotflow::db::DbConnection;
/// use lotflow::engine::{AssignmentEngine, AssignRequest};
/// use lotflow::models::Stage;
/// use std::time::Duration;
///
/// let conn = DbConnection::connect().unwrap();
/// let engine = AssignmentEngine::new(Duration::from_secs(2));
/// let outcome = engine
///     .assign(&conn, &AssignRequest::split(1, (Stage::SemiQc, 16), (Stage::PhosphatingQc, 10)))
///     .unwrap();
/// assert_eq!(outcome.created.len(), 2);
/// ```
pub struct AssignmentEngine {
    locks: Arc<LotLocks>,
    lock_timeout: Duration,
}

impl AssignmentEngine {
    /// Engine sharing the process-wide lock table
    pub fn new(lock_timeout: Duration) -> Self {
        Self::with_locks(LotLocks::global(), lock_timeout)
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.lock_timeout)
    }

    pub fn with_locks(locks: Arc<LotLocks>, lock_timeout: Duration) -> Self {
        Self { locks, lock_timeout }
    }

    /// Forward quantity from a lot to one stage, or split all of its pending
    /// quantity across two stages.
    ///
    /// All-or-nothing: on error the ledger and history are untouched.
    pub fn assign(&self, conn: &Connection, request: &AssignRequest) -> Result<AssignOutcome, EngineError> {
        let result = self.try_assign(conn, request);
        match &result {
            Ok(outcome) => {
                let targets: Vec<String> = outcome
                    .created
                    .iter()
                    .map(|lot| format!("{} x{} -> lot {}", lot.stage, lot.qty, lot.id.unwrap_or_default()))
                    .collect();
                log::info!(
                    "Lot {} ({}) at {}: {}",
                    request.lot_id,
                    outcome.source.unique_code,
                    outcome.from_stage,
                    targets.join(", ")
                );
            }
            Err(err) => log::warn!("Assignment on lot {} rejected: {}", request.lot_id, err),
        }
        result
    }

    fn try_assign(&self, conn: &Connection, request: &AssignRequest) -> Result<AssignOutcome, EngineError> {
        if let Some(split) = request.split {
            if split.stage == request.to.stage {
                return Err(EngineError::DuplicateDestination(split.stage));
            }
        }

        let lot_id = request.lot_id;
        let started = Instant::now();
        let _guard = self.locks.acquire(lot_id, self.lock_timeout)?;
        let tx = begin_write(conn, lot_id, started)?;

        let source = LotRepo::get_by_id(&tx, lot_id)?.ok_or(EngineError::UnknownLot(lot_id))?;
        let available = source.qty_pending();
        if available <= 0 {
            return Err(EngineError::NothingPending { lot_id, stage: source.stage });
        }

        for leg in request.legs() {
            if !StageGraph::can_reach(source.stage, leg.stage) {
                return Err(EngineError::InvalidDestination { from: source.stage, to: leg.stage });
            }
        }
        for leg in request.legs() {
            check_quantity(leg.qty, available)?;
        }

        let consumed = request.total_qty().ok_or(EngineError::QuantityOutOfRange {
            requested: i64::MAX,
            available,
        })?;
        if request.is_split() && consumed != available {
            return Err(EngineError::IncompleteSplit { total: consumed, available });
        }

        // History entries must never exit before they entered
        let now = chrono::Utc::now().timestamp().max(source.created_ts);
        if !LotRepo::record_execution(&tx, lot_id, source.qty_executed, consumed, now)? {
            return Err(EngineError::ConcurrentModification { lot_id, waited_ms: 0 });
        }

        let source_closed = consumed == available;
        HistoryRepo::record(&tx, lot_id, consumed, source_closed.then_some(now))?;

        // A split starts a new sibling group; plain forwards stay in the source's group
        let split_id = if request.is_split() {
            Some(uuid::Uuid::new_v4().to_string())
        } else {
            source.split_id.clone()
        };

        let mut created = Vec::new();
        for leg in request.legs() {
            let child = LotRepo::insert(&tx, &source.forwarded(leg.stage, leg.qty, split_id.clone(), now))?;
            let child_id = child.id.context("Inserted lot has no id")?;
            HistoryRepo::open(&tx, child_id, leg.stage, now)?;
            created.push(child);
        }

        tx.commit()?;

        let from_stage = source.stage;
        Ok(AssignOutcome {
            from_stage,
            source: Lot {
                qty_executed: source.qty_executed + consumed,
                modified_ts: now,
                ..source
            },
            created,
            split_id,
            source_closed,
        })
    }

    /// Record quantity leaving the factory from a lot at the terminal stage
    pub fn dispatch(&self, conn: &Connection, lot_id: i64, qty: i64) -> Result<Lot, EngineError> {
        let result = self.try_dispatch(conn, lot_id, qty);
        match &result {
            Ok(lot) => log::info!(
                "Lot {} ({}) dispatched {}, {} still pending",
                lot_id, lot.unique_code, qty, lot.qty_pending()
            ),
            Err(err) => log::warn!("Dispatch on lot {} rejected: {}", lot_id, err),
        }
        result
    }

    fn try_dispatch(&self, conn: &Connection, lot_id: i64, qty: i64) -> Result<Lot, EngineError> {
        let started = Instant::now();
        let _guard = self.locks.acquire(lot_id, self.lock_timeout)?;
        let tx = begin_write(conn, lot_id, started)?;

        let lot = LotRepo::get_by_id(&tx, lot_id)?.ok_or(EngineError::UnknownLot(lot_id))?;
        if !StageGraph::is_terminal(lot.stage) {
            return Err(EngineError::NotTerminal { lot_id, stage: lot.stage });
        }
        let available = lot.qty_pending();
        if available <= 0 {
            return Err(EngineError::NothingPending { lot_id, stage: lot.stage });
        }
        check_quantity(qty, available)?;

        let now = chrono::Utc::now().timestamp().max(lot.created_ts);
        if !LotRepo::record_execution(&tx, lot_id, lot.qty_executed, qty, now)? {
            return Err(EngineError::ConcurrentModification { lot_id, waited_ms: 0 });
        }
        HistoryRepo::record(&tx, lot_id, qty, (qty == available).then_some(now))?;
        tx.commit()?;

        Ok(Lot {
            qty_executed: lot.qty_executed + qty,
            modified_ts: now,
            ..lot
        })
    }
}

/// Take the database write lock; another writer holding it past the busy
/// timeout is reported like a contended lot
fn begin_write(conn: &Connection, lot_id: i64, started: Instant) -> Result<Transaction<'_>, EngineError> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(|err| match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            EngineError::ConcurrentModification { lot_id, waited_ms: elapsed_ms(started) }
        }
        other => other.into(),
    })
}

fn check_quantity(requested: i64, available: i64) -> Result<(), EngineError> {
    if requested < 1 || requested > available {
        return Err(EngineError::QuantityOutOfRange { requested, available });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;

    fn engine() -> AssignmentEngine {
        AssignmentEngine::with_locks(Arc::new(LotLocks::new()), Duration::from_millis(200))
    }

    fn planning_lot(conn: &Connection, code: &str, qty: i64) -> i64 {
        let lot = LotRepo::create_root(conn, &Lot::new_root(code.to_string(), qty)).unwrap();
        lot.id.unwrap()
    }

    #[test]
    fn test_request_helpers() {
        let plain = AssignRequest::plain(1, Stage::SemiQc, 10);
        assert!(!plain.is_split());
        assert_eq!(plain.total_qty(), Some(10));

        let split = AssignRequest::split(1, (Stage::SemiQc, 16), (Stage::PhosphatingQc, 10));
        assert!(split.is_split());
        assert_eq!(split.total_qty(), Some(26));
        assert_eq!(split.legs().count(), 2);
    }

    #[test]
    fn test_split_total_overflow_is_out_of_range() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", i64::MAX);
        let half = i64::MAX / 2 + 1;

        let err = engine()
            .assign(&conn, &AssignRequest::split(id, (Stage::SemiQc, half), (Stage::PhosphatingQc, half)))
            .unwrap_err();
        assert!(matches!(err, EngineError::QuantityOutOfRange { available: i64::MAX, .. }));
        assert_eq!(LotRepo::get_by_id(&conn, id).unwrap().unwrap().qty_executed, 0);
        assert!(LotRepo::list_by_stage(&conn, Stage::SemiQc).unwrap().is_empty());
    }

    #[test]
    fn test_plain_assign_leaves_residual() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 36);

        let outcome = engine()
            .assign(&conn, &AssignRequest::plain(id, Stage::MaterialIssue, 10))
            .unwrap();

        assert_eq!(outcome.from_stage, Stage::Planning);
        assert_eq!(outcome.source.qty_executed, 10);
        assert_eq!(outcome.source.qty_pending(), 26);
        assert!(!outcome.source_closed);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].qty, 10);
        assert_eq!(outcome.created[0].stage, Stage::MaterialIssue);
        assert_eq!(outcome.split_id, None);

        let open = HistoryRepo::get_open(&conn, id).unwrap().unwrap();
        assert_eq!(open.qty_processed, 10);
    }

    #[test]
    fn test_plain_assign_never_merges() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 10);
        let engine = engine();

        engine.assign(&conn, &AssignRequest::plain(id, Stage::SemiQc, 3)).unwrap();
        engine.assign(&conn, &AssignRequest::plain(id, Stage::SemiQc, 3)).unwrap();

        let semi = LotRepo::list_by_stage(&conn, Stage::SemiQc).unwrap();
        assert_eq!(semi.len(), 2);
        assert!(semi.iter().all(|lot| lot.qty == 3));
    }

    #[test]
    fn test_split_gets_fresh_split_id() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 26);

        let outcome = engine()
            .assign(&conn, &AssignRequest::split(id, (Stage::SemiQc, 16), (Stage::PhosphatingQc, 10)))
            .unwrap();

        let split_id = outcome.split_id.clone().unwrap();
        assert!(outcome.source_closed);
        assert_eq!(outcome.created.len(), 2);
        assert!(outcome.created.iter().all(|lot| lot.split_id.as_deref() == Some(split_id.as_str())));
        assert_eq!(LotRepo::list_by_split(&conn, &split_id).unwrap().len(), 2);

        // Forwarding a split child keeps it in the sibling group
        let child = outcome.created[0].id.unwrap();
        let next = engine()
            .assign(&conn, &AssignRequest::plain(child, Stage::AssemblyA, 16))
            .unwrap();
        assert_eq!(next.created[0].split_id.as_deref(), Some(split_id.as_str()));
    }

    #[test]
    fn test_nothing_pending() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 5);
        let engine = engine();
        engine.assign(&conn, &AssignRequest::plain(id, Stage::SemiQc, 5)).unwrap();

        let err = engine.assign(&conn, &AssignRequest::plain(id, Stage::SemiQc, 1)).unwrap_err();
        assert!(matches!(err, EngineError::NothingPending { lot_id, stage: Stage::Planning } if lot_id == id));
    }

    #[test]
    fn test_quantity_bounds() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 5);
        let engine = engine();

        for qty in [0, -3, 6] {
            let err = engine.assign(&conn, &AssignRequest::plain(id, Stage::SemiQc, qty)).unwrap_err();
            assert!(
                matches!(err, EngineError::QuantityOutOfRange { requested, available: 5 } if requested == qty),
                "qty {} gave {:?}",
                qty,
                err
            );
        }
        assert_eq!(LotRepo::list_all(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_lot() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let err = engine().assign(&conn, &AssignRequest::plain(99, Stage::SemiQc, 1)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownLot(99)));
    }

    #[test]
    fn test_dispatch_requires_terminal_stage() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 5);
        let err = engine().dispatch(&conn, id, 5).unwrap_err();
        assert!(matches!(err, EngineError::NotTerminal { stage: Stage::Planning, .. }));
    }

    #[test]
    fn test_lock_held_elsewhere_is_surfaced() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let id = planning_lot(&conn, "SO1-1", 5);
        let locks = Arc::new(LotLocks::new());
        let engine = AssignmentEngine::with_locks(Arc::clone(&locks), Duration::from_millis(20));

        let _held = locks.acquire(id, Duration::from_millis(10)).unwrap();
        let err = engine.assign(&conn, &AssignRequest::plain(id, Stage::SemiQc, 1)).unwrap_err();
        assert!(matches!(err, EngineError::ConcurrentModification { .. }));
        assert_eq!(LotRepo::get_by_id(&conn, id).unwrap().unwrap().qty_executed, 0);
    }
}
