//! Password hashing and bearer-token issuance.
//!
//! Passwords are stored as Argon2id PHC strings. Access tokens are compact
//! HMAC-SHA256-signed payloads (`base64url(json).base64url(mac)`) carrying
//! the user id and an expiry; the signing secret comes from the environment
//! variable named in `[auth]` and its absence is startup-fatal.

use anyhow::anyhow;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AuthConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Serialize, Deserialize)]
struct TokenClaims {
    /// User id.
    sub: i64,
    /// Expiry, UTC unix seconds.
    exp: i64,
}

/// Issues and verifies access tokens. One instance per process, built at
/// startup from config.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    /// Reads the signing secret from the environment variable the config
    /// names. Missing secret aborts startup.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = std::env::var(&config.secret_env)
            .map_err(|_| Error::MissingCredential(config.secret_env.clone()))?;
        Ok(Self {
            secret: secret.into_bytes(),
            ttl: Duration::minutes(config.token_ttl_minutes),
        })
    }

    /// Build directly from a secret, bypassing the environment lookup.
    pub fn with_secret(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String> {
        let claims = TokenClaims {
            sub: user_id,
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        let payload = serde_json::to_vec(&claims).map_err(anyhow::Error::from)?;
        let encoded = URL_SAFE_NO_PAD.encode(&payload);
        Ok(format!("{}.{}", encoded, self.sign(encoded.as_bytes())?))
    }

    /// Returns the user id for a well-formed, correctly signed, unexpired
    /// token.
    pub fn verify(&self, token: &str) -> Result<i64> {
        let (payload, mac) = token
            .split_once('.')
            .ok_or(Error::Unauthorized("malformed token"))?;

        let mut verifier = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
        verifier.update(payload.as_bytes());
        let mac_bytes = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|_| Error::Unauthorized("malformed token"))?;
        verifier
            .verify_slice(&mac_bytes)
            .map_err(|_| Error::Unauthorized("invalid token signature"))?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::Unauthorized("malformed token"))?;
        let claims: TokenClaims = serde_json::from_slice(&payload_bytes)
            .map_err(|_| Error::Unauthorized("malformed token"))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(Error::Unauthorized("token expired"));
        }
        Ok(claims.sub)
    }

    fn sign(&self, data: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
        mac.update(data);
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}
