//! Lot Flow - production lot tracking through a fixed manufacturing workflow
//!
//! This library provides the core functionality for Lot Flow, including:
//! - The workflow stage graph (Planning through Dispatch)
//! - The lot quantity ledger and its transition history
//! - The assignment engine that moves and splits quantity between stages
//! - Urgency flags and remarks keyed by order line
//! - A cross-stage index with filter expressions
//! - Database operations and migrations
//! - CLI command parsing and execution
//!
//! # Example
//!
//! ```no_run
//! use lotflow::cli::run;
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         eprintln!("Error: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod config;
pub mod db;
pub mod models;
pub mod repo;
pub mod engine;
pub mod index;
pub mod cli;
pub mod utils;
pub mod filter;
