// Core data models for Lot Flow
// These structs represent the domain entities

pub mod lot;
pub mod history;
pub mod flags;
pub mod stage;

pub use lot::*;
pub use history::*;
pub use flags::*;
pub use stage::*;
