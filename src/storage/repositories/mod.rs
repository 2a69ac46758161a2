//! Repository modules for data access
//!
//! Each file holds one repository contract next to its PostgreSQL
//! implementation. In-memory implementations live in `storage::memory`.

pub mod email_token;
pub mod refresh_token;
pub mod user;

pub use email_token::{EmailTokenRepository, SqlxEmailTokenRepository};
pub use refresh_token::{retention_cutoff, RefreshTokenRepository, SqlxRefreshTokenRepository};
pub use user::{SqlxUserRepository, UserRepository};
