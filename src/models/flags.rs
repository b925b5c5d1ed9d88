use serde::{Deserialize, Serialize};

/// Operator-set attributes of a lot, keyed by its business code so they
/// follow the lot through every stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotFlags {
    pub unique_code: String,
    pub urgent: bool,
    pub remark: String,
    pub modified_ts: Option<i64>,
}

impl LotFlags {
    /// Flags for a code that has never been marked
    pub fn unset(unique_code: &str) -> Self {
        Self {
            unique_code: unique_code.to_string(),
            ..Default::default()
        }
    }

    pub fn has_remark(&self) -> bool {
        !self.remark.trim().is_empty()
    }
}
