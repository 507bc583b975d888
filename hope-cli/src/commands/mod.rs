//! Command implementations for hopectl

pub mod admin;
pub mod migrate;
pub mod serve;

pub use admin::run_admin;
pub use migrate::run_migrate;
pub use serve::run_serve;
