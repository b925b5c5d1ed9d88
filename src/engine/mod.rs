//! Workflow progression engine
//!
//! [`AssignmentEngine`] is the only code path that moves quantity between
//! stages. Each call validates against the stage graph and the lot's pending
//! quantity, then mutates the ledger and the transition history inside one
//! SQLite transaction while holding an exclusive per-lot lock.

pub mod error;
pub mod locks;
pub mod assign;

pub use error::*;
pub use locks::*;
pub use assign::*;
