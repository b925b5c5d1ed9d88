use serde::{Deserialize, Serialize};
use crate::models::Stage;

/// One stage visit of a lot
///
/// Open while the lot still has pending quantity at `stage`; closed
/// (`exited_ts` set) once everything has been forwarded or dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub lot_id: i64,
    pub stage: Stage,
    pub entered_ts: i64,
    pub exited_ts: Option<i64>,
    pub qty_processed: i64,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.exited_ts.is_none()
    }

    /// Seconds spent at the stage; open entries are measured up to `now_ts`
    pub fn duration_secs(&self, now_ts: i64) -> i64 {
        let end = self.exited_ts.unwrap_or(now_ts);
        (end - self.entered_ts).max(0)
    }
}
