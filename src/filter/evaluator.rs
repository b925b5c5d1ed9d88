//! Filter expression evaluator
//!
//! Evaluates filter expressions against index rows (a lot joined with its
//! urgency flag and derived status).
//!
//! # Filter Terms
//!
//! - `id` - Match by lot ID
//! - `stage=<slug>` - Match by current stage
//! - `status=<status>` - Derived: pending, in-progress or completed
//! - `code=`, `party=`, `product=` - Case-insensitive substring match
//! - `pending<op><n>` - Compare pending quantity
//! - `entered=<date>` - Entry date by year, month or inclusive range; lots
//!   with placeholder dates never match
//! - `urgent` - Order line is flagged urgent
//! - `split` - Lot belongs to a split sibling group

use crate::filter::parser::FilterTerm;
use crate::index::IndexedLot;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    All, // Match all
    Term(FilterTerm),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Evaluate filter against an index row
    pub fn matches(&self, row: &IndexedLot) -> bool {
        match self {
            FilterExpr::All => true,
            FilterExpr::Term(term) => term.matches(row),
            FilterExpr::And(exprs) => exprs.iter().all(|expr| expr.matches(row)),
            FilterExpr::Or(exprs) => exprs.iter().any(|expr| expr.matches(row)),
            FilterExpr::Not(expr) => !expr.matches(row),
        }
    }

    /// Whether the filter names stages explicitly (so dispatched lots should be visible)
    pub fn mentions_stage(&self) -> bool {
        match self {
            FilterExpr::All => false,
            FilterExpr::Term(term) => matches!(term, FilterTerm::Stage(_) | FilterTerm::Id(_)),
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => exprs.iter().any(FilterExpr::mentions_stage),
            FilterExpr::Not(expr) => expr.mentions_stage(),
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl FilterTerm {
    pub fn matches(&self, row: &IndexedLot) -> bool {
        let lot = &row.lot;
        match self {
            FilterTerm::Id(id) => lot.id == Some(*id),
            FilterTerm::Stage(stages) => stages.contains(&lot.stage),
            FilterTerm::Status(statuses) => statuses.contains(&row.status),
            FilterTerm::Code(code) => contains_ci(&lot.unique_code, code),
            FilterTerm::Party(party) => contains_ci(&lot.party, party),
            FilterTerm::Product(product) => contains_ci(&lot.product_code, product),
            FilterTerm::Pending(op, qty) => op.compare(lot.qty_pending(), *qty),
            FilterTerm::Entered(filter) => filter.matches_raw(&lot.entry_date),
            FilterTerm::Urgent => row.flags.urgent,
            FilterTerm::Split => lot.split_id.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_filter;
    use crate::models::{Lot, LotFlags, Stage};

    fn row(code: &str, stage: Stage, executed: i64, entry_date: &str, urgent: bool) -> IndexedLot {
        let mut lot = Lot::new_root(code.to_string(), 10);
        lot.id = Some(1);
        lot.stage = stage;
        lot.qty_executed = executed;
        lot.entry_date = entry_date.to_string();
        lot.party = "Acme Valves".to_string();
        lot.product_code = "GV-50".to_string();
        let mut flags = LotFlags::unset(code);
        flags.urgent = urgent;
        IndexedLot::new(lot, flags)
    }

    fn filter(s: &str) -> FilterExpr {
        parse_filter(s.split_whitespace().map(String::from).collect()).unwrap()
    }

    #[test]
    fn test_stage_and_status() {
        let r = row("SO1-1", Stage::SemiQc, 4, "2026-03-01", false);
        assert!(filter("stage=semi-qc").matches(&r));
        assert!(filter("status=in-progress").matches(&r));
        assert!(!filter("status=pending,completed").matches(&r));
        assert!(!filter("stage=planning").matches(&r));
    }

    #[test]
    fn test_substring_fields_ignore_case() {
        let r = row("SO-2291-4", Stage::Planning, 0, "2026-03-01", false);
        assert!(filter("code=2291").matches(&r));
        assert!(filter("party=acme").matches(&r));
        assert!(filter("product=gv").matches(&r));
        assert!(!filter("party=globex").matches(&r));
    }

    #[test]
    fn test_entered_excludes_placeholder_dates() {
        let dated = row("SO1-1", Stage::Planning, 0, "15/03/2026", false);
        let held = row("SO1-2", Stage::Planning, 0, "HOLD", false);

        for f in ["entered=2026", "entered=2026-03", "entered=2026-03-01..2026-03-31"] {
            assert!(filter(f).matches(&dated), "{}", f);
            assert!(!filter(f).matches(&held), "{}", f);
        }
        assert!(!filter("entered=2026-04").matches(&dated));
        // Placeholder lots still show up when no date filter is given
        assert!(FilterExpr::All.matches(&held));
    }

    #[test]
    fn test_urgent_or_pending() {
        let urgent = row("SO1-1", Stage::Svs, 10, "2026-03-01", true);
        let plain = row("SO1-2", Stage::Svs, 2, "2026-03-01", false);

        let f = filter("urgent or pending>5");
        assert!(f.matches(&urgent));
        assert!(f.matches(&plain));
        assert!(!filter("not urgent pending=0").matches(&urgent));
    }

    #[test]
    fn test_mentions_stage() {
        assert!(filter("stage=dispatch").mentions_stage());
        assert!(filter("urgent or not stage=svs").mentions_stage());
        assert!(!filter("urgent").mentions_stage());
        assert!(!FilterExpr::All.mentions_stage());
    }
}
