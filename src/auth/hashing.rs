//! Password hashing capability.

use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::sync::LazyLock;

/// Prefix of hashes that can never be matched by any password. Accounts created
/// on someone's behalf start with one until the owner sets a password.
pub const UNUSABLE_PASSWORD_PREFIX: &str = "!";

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hashes and compares credentials. Stateless.
pub trait PasswordService: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, PasswordError>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    fn compare_password(&self, hash: &str, password: &str) -> Result<bool, PasswordError>;
}

pub fn password_hasher() -> Argon2<'static> {
    // Argon2id with moderate memory and a single iteration keeps verification
    // within interactive latency while retaining side-channel protections.
    const MEMORY_COST_KIB: u32 = 768;
    const ITERATIONS: u32 = 1;
    const PARALLELISM: u32 = 1;
    let params = Params::new(MEMORY_COST_KIB, ITERATIONS, PARALLELISM, Some(32))
        .unwrap_or_else(|_| Params::default());
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Marker hash for accounts that must not be able to log in with a password.
pub fn unusable_password_hash() -> String {
    let suffix: String = OsRng.sample_iter(&Alphanumeric).take(40).map(char::from).collect();
    format!("{UNUSABLE_PASSWORD_PREFIX}{suffix}")
}

pub fn is_usable_password_hash(hash: &str) -> bool {
    !hash.starts_with(UNUSABLE_PASSWORD_PREFIX)
}

/// Argon2id implementation of [`PasswordService`].
#[derive(Clone)]
pub struct Argon2PasswordService {
    argon2: Argon2<'static>,
}

impl Default for Argon2PasswordService {
    fn default() -> Self {
        Self::new()
    }
}

impl Argon2PasswordService {
    pub fn new() -> Self {
        Self { argon2: password_hasher() }
    }
}

impl PasswordService for Argon2PasswordService {
    fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| PasswordError::Hash(err.to_string()))?;
        Ok(hash.to_string())
    }

    fn compare_password(&self, hash: &str, password: &str) -> Result<bool, PasswordError> {
        if !is_usable_password_hash(hash) {
            return Ok(false);
        }
        let parsed =
            PasswordHash::new(hash).map_err(|err| PasswordError::MalformedHash(err.to_string()))?;
        Ok(self.argon2.verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

/// Pre-computed hash compared against when the account does not exist, so the
/// response time matches a real verification.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    Argon2PasswordService::new()
        .hash_password("dummy_startup_value")
        .unwrap_or_else(|_| "$argon2id$v=19$m=768,t=1,p=1$ZHVtbXlzYWx0$ZHVtbXloYXNo".to_string())
});

/// Burn one comparison's worth of work against the dummy hash.
pub fn equalize_timing(passwords: &dyn PasswordService, candidate: &str) {
    if let Err(err) = passwords.compare_password(&DUMMY_HASH, candidate) {
        tracing::warn!(error = %err, "dummy hash verification failed unexpectedly");
    }
}
