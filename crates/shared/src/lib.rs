//! Parley Shared Types and Utilities
//!
//! Domain types, the core error taxonomy and database helpers shared by the
//! Parley chat server and its tooling.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
