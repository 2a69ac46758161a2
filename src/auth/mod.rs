//! Authentication module entry point.
//!
//! This module exposes the credential stack: password hashing, signed session
//! tokens, single-use email tokens, the workflows composed from them, and the
//! background sweeper that prunes dead tokens.

pub mod cleanup_service;
pub mod email_token;
pub mod hashing;
pub mod models;
pub mod token_service;
pub mod validation;
pub mod workflow;

pub use cleanup_service::{CleanupService, SweepReport};
pub use hashing::{Argon2PasswordService, PasswordError, PasswordService};
pub use token_service::{Claims, JwtTokenService, TokenError, TokenService};
pub use workflow::{AuthWorkflow, WorkflowSettings};
