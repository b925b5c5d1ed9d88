pub mod parser;
pub mod evaluator;

pub use parser::{parse_filter, ComparisonOp, FilterTerm};
pub use evaluator::FilterExpr;
