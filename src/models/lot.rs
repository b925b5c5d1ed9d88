use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::models::Stage;

/// Display status derived from a lot's quantity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LotStatus {
    Pending,
    InProgress,
    Completed,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Pending => "pending",
            LotStatus::InProgress => "in-progress",
            LotStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LotStatus::Pending),
            "in-progress" | "in_progress" | "inprogress" => Some(LotStatus::InProgress),
            "completed" | "done" => Some(LotStatus::Completed),
            _ => None,
        }
    }
}

/// A production lot resident at one workflow stage
///
/// Quantity bookkeeping: `qty` is what this record carries, `qty_executed` is
/// what has already left the current stage. Pending quantity is derived and
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: Option<i64>,
    pub unique_code: String,
    pub split_id: Option<String>,
    pub parent_lot_id: Option<i64>,
    pub parent_order_qty: i64,
    pub qty: i64,
    pub qty_executed: i64,
    pub stage: Stage,
    pub party: String,
    pub product_code: String,
    pub entry_date: String,
    pub attrs: HashMap<String, String>, // Specifications passed through from the order line
    pub created_ts: i64,
    pub modified_ts: i64,
}

impl Lot {
    /// A fresh Planning lot for an order line; the whole order quantity is pending
    pub fn new_root(unique_code: String, order_qty: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            unique_code,
            split_id: None,
            parent_lot_id: None,
            parent_order_qty: order_qty,
            qty: order_qty,
            qty_executed: 0,
            stage: Stage::Planning,
            party: String::new(),
            product_code: String::new(),
            entry_date: today_string(),
            attrs: HashMap::new(),
            created_ts: now,
            modified_ts: now,
        }
    }

    /// Business key for an order line: `<sales order>-<line item>`
    pub fn compose_unique_code(sales_order: &str, line_item: &str) -> String {
        format!("{}-{}", sales_order.trim(), line_item.trim())
    }

    pub fn qty_pending(&self) -> i64 {
        self.qty - self.qty_executed
    }

    pub fn status(&self) -> LotStatus {
        let pending = self.qty_pending();
        if pending == 0 {
            LotStatus::Completed
        } else if self.qty_executed > 0 {
            LotStatus::InProgress
        } else {
            LotStatus::Pending
        }
    }

    /// Whether the lot has left the factory entirely
    pub fn is_dispatched(&self) -> bool {
        crate::models::StageGraph::is_terminal(self.stage) && self.qty_pending() == 0
    }

    /// The record created in `stage` when `qty` is forwarded from this lot
    pub fn forwarded(&self, stage: Stage, qty: i64, split_id: Option<String>, now: i64) -> Lot {
        Lot {
            id: None,
            unique_code: self.unique_code.clone(),
            split_id,
            parent_lot_id: self.id,
            parent_order_qty: self.parent_order_qty,
            qty,
            qty_executed: 0,
            stage,
            party: self.party.clone(),
            product_code: self.product_code.clone(),
            entry_date: self.entry_date.clone(),
            attrs: self.attrs.clone(),
            created_ts: now,
            modified_ts: now,
        }
    }
}

fn today_string() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}
