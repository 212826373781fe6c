//! Diesel runtime: pooled engine and request sessions
//!
//! The backend is picked by cargo feature (`sqlite`, `postgres`, `mysql`).
//! [`DbConnection`] and [`SqlBuilder`] always name the matching diesel
//! connection and sea-query builder.

pub mod database;
pub mod session;

// Re-export key types
pub use database::{
    DatabaseConfig, DbBackend, DbConnection, Engine, Pool, PooledConnection, SqlBuilder,
};
pub use session::{render, Session, SessionError, SessionFactory, SessionOptions};
