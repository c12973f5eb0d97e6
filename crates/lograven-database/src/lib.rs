//! Database connection management and shared test fixtures

pub use sea_orm;
mod connection;

pub use connection::{connect, establish_connection, run_migrations, DbConnection};

// Used by the integration tests of the service crates
pub mod test_utils;
