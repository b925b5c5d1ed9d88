pub mod lot;
pub mod history;
pub mod flags;

pub use lot::*;
pub use history::*;
pub use flags::*;
