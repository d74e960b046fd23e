//! SQLite adapter for the persistence port.
//!
//! The database is shared with the goal-tracker web application; this
//! crate owns the schema bootstrap and the narrow query set the bot needs.

mod store;

pub use store::{DbPool, SqliteStore};
