//! Domain layer
//!
//! Pure identifier types shared by the credential core, with no storage or
//! transport dependencies.

pub mod id;

pub use id::{EmailTokenId, RefreshTokenId, UserId};
