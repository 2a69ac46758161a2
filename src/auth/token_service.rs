//! Signed access and refresh tokens.
//!
//! Minting and verification are CPU-only; nothing here touches storage. The
//! refresh token's `jti` is the id of the record the workflow persists for it.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::models::{AccessToken, IssuedRefreshToken};
use crate::config::AuthConfig;
use crate::domain::{RefreshTokenId, UserId};

const ACCESS_TYPE: &str = "access";
const REFRESH_TYPE: &str = "refresh";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub jti: String, // Token id
    pub iat: i64,    // Issued at
    pub exp: i64,    // Expiration time
    pub typ: String, // "access" or "refresh"
}

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token type mismatch")]
    WrongType,

    #[error("malformed claim `{0}`")]
    MalformedClaim(&'static str),
}

impl TokenError {
    /// True when we failed to produce a token, as opposed to rejecting one.
    pub fn is_encoding_failure(&self) -> bool {
        matches!(self, TokenError::Encode(_))
    }
}

/// Mints and verifies signed access/refresh tokens.
pub trait TokenService: Send + Sync {
    fn gen_access_token(&self, user_id: &UserId) -> Result<AccessToken, TokenError>;

    fn gen_refresh_token(&self, user_id: &UserId) -> Result<IssuedRefreshToken, TokenError>;

    fn verify_access_token(&self, raw: &str) -> Result<UserId, TokenError>;

    /// Returns the `sub` and `jti` claims of a valid refresh token.
    fn verify_refresh_token(&self, raw: &str) -> Result<(UserId, RefreshTokenId), TokenError>;
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn new(secret: &[u8]) -> Self {
        Self { encoding: EncodingKey::from_secret(secret), decoding: DecodingKey::from_secret(secret) }
    }
}

/// HS256 implementation of [`TokenService`] with one secret per token type.
pub struct JwtTokenService {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl JwtTokenService {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            access: KeyPair::new(access_secret),
            refresh: KeyPair::new(refresh_secret),
            access_ttl,
            refresh_ttl,
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.access_token_secret.as_bytes(),
            config.refresh_token_secret.as_bytes(),
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        )
    }

    fn sign(
        &self,
        keys: &KeyPair,
        user_id: &UserId,
        jti: &str,
        typ: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            typ: typ.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(TokenError::Encode)
    }

    fn verify(&self, keys: &KeyPair, raw: &str, typ: &str) -> Result<Claims, TokenError> {
        let data =
            decode::<Claims>(raw, &keys.decoding, &self.validation).map_err(TokenError::Invalid)?;
        if data.claims.typ != typ {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims)
    }
}

impl TokenService for JwtTokenService {
    fn gen_access_token(&self, user_id: &UserId) -> Result<AccessToken, TokenError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.access_ttl;
        let jti = uuid::Uuid::new_v4().to_string();
        let token = self.sign(&self.access, user_id, &jti, ACCESS_TYPE, issued_at, expires_at)?;
        Ok(AccessToken { token, expires_at })
    }

    fn gen_refresh_token(&self, user_id: &UserId) -> Result<IssuedRefreshToken, TokenError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.refresh_ttl;
        let id = RefreshTokenId::new();
        let token =
            self.sign(&self.refresh, user_id, id.as_str(), REFRESH_TYPE, issued_at, expires_at)?;
        Ok(IssuedRefreshToken { token, id, issued_at, expires_at })
    }

    fn verify_access_token(&self, raw: &str) -> Result<UserId, TokenError> {
        let claims = self.verify(&self.access, raw, ACCESS_TYPE)?;
        UserId::parse(&claims.sub).map_err(|_| TokenError::MalformedClaim("sub"))
    }

    fn verify_refresh_token(&self, raw: &str) -> Result<(UserId, RefreshTokenId), TokenError> {
        let claims = self.verify(&self.refresh, raw, REFRESH_TYPE)?;
        let user_id = UserId::parse(&claims.sub).map_err(|_| TokenError::MalformedClaim("sub"))?;
        let token_id =
            RefreshTokenId::parse(&claims.jti).map_err(|_| TokenError::MalformedClaim("jti"))?;
        Ok((user_id, token_id))
    }
}
