//! Filter parser for lot searches
//!
//! Implements boolean expression parsing with AND/OR/NOT operators.
//!
//! # Grammar
//!
//! ```text
//! filter := term | filter "or" term | "not" term
//! term := id | stage=<slug>[,<slug>] | status=<status>[,..] | code=<text> | party=<text>
//!       | product=<text> | pending<op><n> | entered=<date> | urgent | split
//! ```
//!
//! # Precedence
//!
//! 1. `not` (highest)
//! 2. Implicit `and` (between adjacent terms)
//! 3. `or` (lowest)
//!
//! # Examples
//!
//! ```text
//! // Implicit AND
//! stage=semi-qc urgent
//!
//! // Explicit OR
//! stage=testing-1 or stage=testing-2
//!
//! // NOT
//! not status=completed
//!
//! // Date modes: year, month, inclusive range
//! entered=2026 entered=2026-03 entered=2026-01-01..2026-01-31
//! ```

use crate::filter::evaluator::FilterExpr;
use crate::models::{LotStatus, Stage};
use crate::utils::DateFilter;

/// Comparison operators for filter expressions
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOp {
    Eq,    // =
    Neq,   // != or <>
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
}

impl ComparisonOp {
    pub fn compare(&self, left: i64, right: i64) -> bool {
        match self {
            ComparisonOp::Eq => left == right,
            ComparisonOp::Neq => left != right,
            ComparisonOp::Gt => left > right,
            ComparisonOp::Lt => left < right,
            ComparisonOp::Gte => left >= right,
            ComparisonOp::Lte => left <= right,
        }
    }
}

/// Parse filter tokens into a FilterExpr
///
/// # Arguments
/// * `tokens` - Vector of filter tokens (e.g., `vec!["stage=semi-qc".to_string(), "urgent".to_string()]`)
///
/// # Returns
/// `FilterExpr` representing the parsed filter, or an error string if parsing fails
///
/// # Example
///
/// ```
/// use lotflow::filter::parse_filter;
///
/// let filter = parse_filter(vec!["stage=semi-qc".to_string(), "urgent".to_string()]).unwrap();
/// ```
pub fn parse_filter(tokens: Vec<String>) -> Result<FilterExpr, String> {
    if tokens.is_empty() {
        return Ok(FilterExpr::All); // No filter = match all
    }

    let mut parsed: Vec<FilterToken> = Vec::new();
    for token in &tokens {
        match token.as_str() {
            "or" => parsed.push(FilterToken::Or),
            "not" => parsed.push(FilterToken::Not),
            _ => match parse_filter_term(token)? {
                Some(term) => parsed.push(FilterToken::Term(term)),
                None => return Err(format!("Invalid filter token: {}", token)),
            },
        }
    }

    // Precedence: not > and > or
    build_expression(parsed)
}

#[derive(Debug, Clone)]
enum FilterToken {
    Term(FilterTerm),
    Not,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    Id(i64),
    Stage(Vec<Stage>),       // Any of the listed stages
    Status(Vec<LotStatus>),  // Any of the listed derived statuses
    Code(String),            // Business code substring (case-insensitive)
    Party(String),           // Party substring (case-insensitive)
    Product(String),         // Product code substring (case-insensitive)
    Pending(ComparisonOp, i64),
    Entered(DateFilter),
    Urgent,
    Split,                   // Produced by a split
}

/// Split a token into (key, operator, value) using operator detection.
/// Returns None if no operator is found.
fn split_on_operator(token: &str) -> Option<(String, ComparisonOp, String)> {
    let op_start = token.find(['=', '>', '<', '!'])?;

    let key = token[..op_start].to_string();
    if key.is_empty() {
        return None;
    }

    let rest = &token[op_start..];
    let (op, op_len) = if rest.starts_with(">=") {
        (ComparisonOp::Gte, 2)
    } else if rest.starts_with("<=") {
        (ComparisonOp::Lte, 2)
    } else if rest.starts_with("!=") || rest.starts_with("<>") {
        (ComparisonOp::Neq, 2)
    } else if rest.starts_with('=') {
        (ComparisonOp::Eq, 1)
    } else if rest.starts_with('>') {
        (ComparisonOp::Gt, 1)
    } else if rest.starts_with('<') {
        (ComparisonOp::Lt, 1)
    } else {
        return None;
    };

    let value = rest[op_len..].to_string();
    Some((key, op, value))
}

/// Known filter keys (exact match only)
const FILTER_KEYS: &[&str] = &[
    "id", "stage", "status", "code", "party", "product", "pending", "entered",
];

/// Parse a single filter term token
fn parse_filter_term(token: &str) -> Result<Option<FilterTerm>, String> {
    // Bare numeric lot ID
    if let Ok(id) = token.parse::<i64>() {
        return Ok(Some(FilterTerm::Id(id)));
    }

    match token {
        "urgent" => return Ok(Some(FilterTerm::Urgent)),
        "split" => return Ok(Some(FilterTerm::Split)),
        _ => {}
    }

    let Some((key, op, value)) = split_on_operator(token) else {
        return Ok(None);
    };
    let key_lower = key.to_lowercase();

    if !FILTER_KEYS.contains(&key_lower.as_str()) {
        return Err(format!("Unknown filter field '{}'. Known fields: {}", key, FILTER_KEYS.join(", ")));
    }

    // Only `pending` compares; every other field is an equality match
    if key_lower != "pending" && op != ComparisonOp::Eq {
        return Err(format!(
            "{} filter only supports '=' operator, got '{}'. Use 'not {}=value' for negation.",
            key_lower,
            format_op(&op),
            key_lower
        ));
    }
    if value.trim().is_empty() {
        return Err(format!("Filter '{}' needs a value", key_lower));
    }

    let term = match key_lower.as_str() {
        "id" => value
            .parse::<i64>()
            .map(FilterTerm::Id)
            .map_err(|_| format!("Invalid lot ID: '{}'", value))?,
        "stage" => {
            let stages = value
                .split(',')
                .map(|v| Stage::from_str(v).ok_or_else(|| format!("Unknown stage '{}'", v.trim())))
                .collect::<Result<Vec<_>, _>>()?;
            FilterTerm::Stage(stages)
        }
        "status" => {
            let statuses = value
                .split(',')
                .map(|v| {
                    let v = v.trim().to_lowercase();
                    LotStatus::from_str(&v).ok_or_else(|| {
                        format!("Unknown status '{}'. Use pending, in-progress or completed.", v)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            FilterTerm::Status(statuses)
        }
        "code" => FilterTerm::Code(value),
        "party" => FilterTerm::Party(value),
        "product" => FilterTerm::Product(value),
        "pending" => {
            let qty = value
                .parse::<i64>()
                .map_err(|_| format!("Invalid pending quantity: '{}'", value))?;
            FilterTerm::Pending(op, qty)
        }
        "entered" => FilterTerm::Entered(DateFilter::parse(&value)?),
        _ => return Ok(None),
    };
    Ok(Some(term))
}

/// Format a ComparisonOp for display
fn format_op(op: &ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "=",
        ComparisonOp::Neq => "!=",
        ComparisonOp::Gt => ">",
        ComparisonOp::Lt => "<",
        ComparisonOp::Gte => ">=",
        ComparisonOp::Lte => "<=",
    }
}

/// Build expression tree from parsed tokens
/// Precedence: not > and > or
fn build_expression(tokens: Vec<FilterToken>) -> Result<FilterExpr, String> {
    if tokens.is_empty() {
        return Ok(FilterExpr::All);
    }

    // First, apply NOT operators (highest precedence)
    let mut after_not = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if let FilterToken::Not = tokens[i] {
            if i + 1 >= tokens.len() {
                return Err("NOT operator requires a following term".to_string());
            }
            if let FilterToken::Term(term) = &tokens[i + 1] {
                after_not.push(FilterToken::Term(term.clone()));
                after_not.push(FilterToken::Not); // Mark as negated
                i += 2;
            } else {
                return Err("NOT operator must be followed by a term".to_string());
            }
        } else {
            after_not.push(tokens[i].clone());
            i += 1;
        }
    }

    // Split by OR to get AND groups
    let mut or_groups: Vec<Vec<FilterToken>> = Vec::new();
    let mut current_group = Vec::new();

    for token in after_not {
        if let FilterToken::Or = token {
            if !current_group.is_empty() {
                or_groups.push(current_group);
                current_group = Vec::new();
            }
        } else {
            current_group.push(token);
        }
    }
    if !current_group.is_empty() {
        or_groups.push(current_group);
    }

    let mut or_exprs = Vec::new();
    for group in or_groups {
        or_exprs.push(build_and_expression(group)?);
    }

    match or_exprs.len() {
        0 => Ok(FilterExpr::All),
        1 => Ok(or_exprs.remove(0)),
        _ => Ok(FilterExpr::Or(or_exprs)),
    }
}

/// Build AND expression from a group of terms (implicit AND)
fn build_and_expression(tokens: Vec<FilterToken>) -> Result<FilterExpr, String> {
    let mut and_terms = Vec::new();

    for token in tokens {
        match token {
            FilterToken::Term(term) => {
                and_terms.push(FilterExpr::Term(term));
            }
            FilterToken::Not => {
                // Apply NOT to the last term
                if let Some(last) = and_terms.pop() {
                    and_terms.push(FilterExpr::Not(Box::new(last)));
                } else {
                    return Err("NOT operator without preceding term".to_string());
                }
            }
            FilterToken::Or => {
                return Err("Unexpected OR in AND group".to_string());
            }
        }
    }

    match and_terms.len() {
        0 => Ok(FilterExpr::All),
        1 => Ok(and_terms.remove(0)),
        _ => Ok(FilterExpr::And(and_terms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::evaluator::FilterExpr;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_simple_id() {
        let expr = parse_filter(tokens("10")).unwrap();
        assert!(matches!(expr, FilterExpr::Term(FilterTerm::Id(10))));
    }

    #[test]
    fn test_parse_stage_and_urgent() {
        let expr = parse_filter(tokens("stage=semi-qc urgent")).unwrap();
        match expr {
            FilterExpr::And(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(&terms[0], FilterExpr::Term(FilterTerm::Stage(s)) if s == &vec![Stage::SemiQc]));
                assert!(matches!(&terms[1], FilterExpr::Term(FilterTerm::Urgent)));
            }
            _ => panic!("Expected And expression"),
        }
    }

    #[test]
    fn test_parse_stage_list_accepts_labels() {
        let expr = parse_filter(tokens("stage=testing-1,Testing_2")).unwrap();
        assert_eq!(expr, FilterExpr::Term(FilterTerm::Stage(vec![Stage::Testing1, Stage::Testing2])));
    }

    #[test]
    fn test_parse_or() {
        let expr = parse_filter(tokens("stage=svs or urgent")).unwrap();
        assert!(matches!(expr, FilterExpr::Or(ref e) if e.len() == 2));
    }

    #[test]
    fn test_parse_not() {
        let expr = parse_filter(tokens("not status=completed")).unwrap();
        match expr {
            FilterExpr::Not(inner) => {
                assert_eq!(*inner, FilterExpr::Term(FilterTerm::Status(vec![LotStatus::Completed])));
            }
            _ => panic!("Expected Not expression"),
        }
    }

    #[test]
    fn test_parse_status_list() {
        let expr = parse_filter(tokens("status=pending,in-progress")).unwrap();
        assert_eq!(
            expr,
            FilterExpr::Term(FilterTerm::Status(vec![LotStatus::Pending, LotStatus::InProgress]))
        );
    }

    #[test]
    fn test_parse_entered_modes() {
        assert_eq!(
            parse_filter(tokens("entered=2026")).unwrap(),
            FilterExpr::Term(FilterTerm::Entered(DateFilter::Year(2026)))
        );
        assert_eq!(
            parse_filter(tokens("entered=2026-03")).unwrap(),
            FilterExpr::Term(FilterTerm::Entered(DateFilter::Month { year: 2026, month: 3 }))
        );
        assert!(matches!(
            parse_filter(tokens("entered=2026-01-01..2026-02-01")).unwrap(),
            FilterExpr::Term(FilterTerm::Entered(DateFilter::Range { .. }))
        ));
    }

    #[test]
    fn test_parse_pending_comparison() {
        let expr = parse_filter(tokens("pending>=5")).unwrap();
        assert_eq!(expr, FilterExpr::Term(FilterTerm::Pending(ComparisonOp::Gte, 5)));
        assert!(ComparisonOp::Gte.compare(5, 5));
        assert!(!ComparisonOp::Lt.compare(5, 5));
    }

    #[test]
    fn test_unknown_field_error() {
        let err = parse_filter(tokens("colour=red")).unwrap_err();
        assert!(err.contains("Unknown filter field"));
    }

    #[test]
    fn test_unknown_stage_error() {
        let err = parse_filter(tokens("stage=painting")).unwrap_err();
        assert!(err.contains("Unknown stage 'painting'"));
    }

    #[test]
    fn test_equality_only_fields() {
        assert!(parse_filter(tokens("stage>svs")).is_err());
        assert!(parse_filter(tokens("party!=acme")).is_err());
        assert!(parse_filter(tokens("code=")).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let err = parse_filter(tokens("whatever")).unwrap_err();
        assert!(err.contains("Invalid filter token"));
    }

    #[test]
    fn test_dangling_not() {
        assert!(parse_filter(tokens("urgent not")).is_err());
    }
}
