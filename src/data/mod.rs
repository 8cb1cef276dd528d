//! Data layer module
//!
//! SQLite persistence for users and contact messages.

mod database;
mod models;

pub use database::Database;
pub use models::*;
