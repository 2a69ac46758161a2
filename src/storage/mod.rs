//! # Storage and Persistence
//!
//! Repository contracts for users, refresh tokens and email tokens, the
//! transaction manager that scopes them, and two backends: PostgreSQL and an
//! in-memory store with the same semantics.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod repositories;
pub mod tx;

pub use crate::config::DatabaseConfig;

pub use memory::{MemoryState, MemoryStore, MemoryTransactionManager};
pub use migrations::run_migrations;
pub use pool::{check_connection, create_pool, DbPool};
pub use postgres::{PgHandle, PgTransactionManager};
pub use repositories::{
    EmailTokenRepository, RefreshTokenRepository, SqlxEmailTokenRepository,
    SqlxRefreshTokenRepository, SqlxUserRepository, UserRepository,
};
pub use tx::{Repositories, TransactionManager, UnitOfWork};
