use thiserror::Error;
use crate::models::Stage;

/// Errors returned by the assignment engine
///
/// Every variant except `Storage` describes an input the caller can correct;
/// none of them leave partial writes behind.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Lot {0} not found")]
    UnknownLot(i64),

    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    #[error("Cannot move a lot from {from} to {to}: {to} does not follow {from}")]
    InvalidDestination { from: Stage, to: Stage },

    #[error("Quantity {requested} is out of range: must be between 1 and {available}")]
    QuantityOutOfRange { requested: i64, available: i64 },

    #[error("Split total {total} does not equal available {available}")]
    IncompleteSplit { total: i64, available: i64 },

    #[error("Both split legs go to {0}; a split needs two different stages")]
    DuplicateDestination(Stage),

    #[error("Lot {lot_id} is busy: gave up after waiting {waited_ms}ms for another assignment")]
    ConcurrentModification { lot_id: i64, waited_ms: u64 },

    #[error("Lot {lot_id} has nothing pending at {stage}")]
    NothingPending { lot_id: i64, stage: Stage },

    #[error("Lot {lot_id} is at {stage}; only lots at a terminal stage can be dispatched")]
    NotTerminal { lot_id: i64, stage: Stage },

    #[error("Lot key cannot be empty")]
    EmptyKey,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(anyhow::Error::new(err))
    }
}

impl EngineError {
    /// True when the caller supplied something invalid, false for storage failures
    pub fn is_user_error(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_violation() {
        let err = EngineError::IncompleteSplit { total: 30, available: 36 };
        assert_eq!(err.to_string(), "Split total 30 does not equal available 36");

        let err = EngineError::InvalidDestination { from: Stage::Planning, to: Stage::Dispatch };
        assert_eq!(
            err.to_string(),
            "Cannot move a lot from Planning to Dispatch: Dispatch does not follow Planning"
        );

        let err = EngineError::QuantityOutOfRange { requested: 40, available: 26 };
        assert!(err.to_string().contains("between 1 and 26"));
    }

    #[test]
    fn test_user_vs_storage_errors() {
        assert!(EngineError::UnknownLot(3).is_user_error());
        assert!(EngineError::ConcurrentModification { lot_id: 1, waited_ms: 10 }.is_user_error());
        assert!(!EngineError::Storage(anyhow::anyhow!("disk I/O error")).is_user_error());
        let from_sqlite: EngineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(!from_sqlite.is_user_error());
    }
}
