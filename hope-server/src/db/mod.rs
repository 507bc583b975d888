//! Database layer - connection pool, schema and repositories
//!
//! # Design Principles
//!
//! - Connection pool shared through `AppState` - no Arc<Mutex<Connection>>
//! - List operations use JOINs and `COUNT(*) OVER()` - no N+1 queries
//! - Rely on DB constraints and map violations - no check-then-insert
//! - Transactions for multi-step operations; an uncommitted transaction
//!   rolls back when dropped

pub mod error;
pub mod migrations;
pub mod patch;
pub mod pool;
pub mod repos;

pub use error::DbError;
pub use patch::{Patch, PatchValue};
pub use pool::{create_pool, create_pool_with_options};
pub use repos::*;
