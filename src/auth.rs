//! Session tokens: compact HS256 JWTs carrying the caller's department.
//!
//! The chat endpoint trusts exactly one thing about the caller, the
//! `department` claim of a token signed with `SRAG_SESSION_SECRET`.
//! Tokens are minted by `srag token` (or any HS256 issuer sharing the
//! secret) and checked here for signature, expiry and a non-blank
//! department.

use anyhow::{anyhow, Result};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Department;

pub const SECRET_ENV: &str = "SRAG_SESSION_SECRET";
const MIN_SECRET_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token missing department scope")]
    MissingDepartment,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::UnsupportedAlgorithm
            }
            _ => AuthError::Malformed,
        }
    }
}

/// HMAC key for signing and verifying session tokens.
#[derive(Clone)]
pub struct SessionKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_BYTES {
            return Err(anyhow!(
                "session secret must be at least {} bytes",
                MIN_SECRET_BYTES
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(SECRET_ENV)
            .map_err(|_| anyhow!("{} environment variable not set", SECRET_ENV))?;
        Self::new(secret)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    /// Check algorithm, signature and expiry (no leeway) and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(decode::<Claims>(token.trim(), &self.decoding, &validation)?.claims)
    }

    /// Verify `token` and extract its department.
    pub fn department(&self, token: &str) -> Result<Department, AuthError> {
        self.verify(token)?
            .department
            .and_then(Department::new)
            .ok_or(AuthError::MissingDepartment)
    }
}
