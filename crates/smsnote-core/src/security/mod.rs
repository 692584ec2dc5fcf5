//! Password hashing and signed identity tokens.
//!
//! Both concerns sit behind the [`Security`] trait so backends and the service
//! can be exercised with a fake, and so the secret and hash cost are tuned in
//! one place:
//! - **Argon2id** for password hashes (PHC strings)
//! - **HS256** (HMAC-SHA256) for claim tokens; no other algorithm is accepted
//!
//! There is no revocation list. A token is valid for as long as the signing
//! secret is unchanged.

pub mod password;
pub mod token;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::{Result, SmsNoteError};
use crate::storage::UserId;

pub use password::HashCost;

/// Claims carried by a signed token.
pub type Claims = serde_json::Map<String, Value>;

/// Claim holding the user identifier.
pub const CLAIM_USER_ID: &str = "UserID";
/// Claim holding the token purpose.
pub const CLAIM_KIND: &str = "Kind";
/// Claim holding a reset token's issue time (unix seconds).
pub const CLAIM_TIME: &str = "Time";
/// Claim binding a reset token to the password hash it was issued against.
pub const CLAIM_STAMP: &str = "Stamp";

pub const KIND_SESSION: &str = "session";
pub const KIND_RESET: &str = "reset";

/// Hashing and token signing seam.
pub trait Security: Send + Sync {
    fn hash_password(&self, plaintext: &str) -> Result<String>;

    /// Fails with `Credentials` when the plaintext does not match.
    fn verify_password(&self, plaintext: &str, hash: &str) -> Result<()>;

    fn issue_token(&self, claims: &Claims) -> Result<String>;

    /// Fails with the generic `Token` error for any bad input.
    fn parse_token(&self, token: &str) -> Result<Claims>;
}

/// Production implementation: Argon2id + HS256 with one server secret.
pub struct StandardSecurity {
    secret: SecretString,
    cost: HashCost,
}

impl StandardSecurity {
    pub fn new(secret: SecretString) -> Result<Self> {
        Self::with_cost(secret, HashCost::default())
    }

    pub fn with_cost(secret: SecretString, cost: HashCost) -> Result<Self> {
        if secret.expose_secret().trim().is_empty() {
            return Err(SmsNoteError::Validation(
                "Signing secret cannot be empty".to_string(),
            ));
        }
        Ok(Self { secret, cost })
    }
}

impl std::fmt::Debug for StandardSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardSecurity")
            .field("secret", &"[REDACTED]")
            .field("cost", &self.cost)
            .finish()
    }
}

impl Security for StandardSecurity {
    fn hash_password(&self, plaintext: &str) -> Result<String> {
        password::hash_password(plaintext, &self.cost)
    }

    fn verify_password(&self, plaintext: &str, hash: &str) -> Result<()> {
        password::verify_password(plaintext, hash)
    }

    fn issue_token(&self, claims: &Claims) -> Result<String> {
        token::issue_token(&self.secret, claims)
    }

    fn parse_token(&self, token: &str) -> Result<Claims> {
        token::parse_token(&self.secret, token)
    }
}

/// Claims for a session token.
pub fn session_claims(user_id: &UserId) -> Claims {
    let mut claims = Claims::new();
    claims.insert(
        CLAIM_USER_ID.to_string(),
        Value::String(user_id.as_str().to_string()),
    );
    claims.insert(
        CLAIM_KIND.to_string(),
        Value::String(KIND_SESSION.to_string()),
    );
    claims
}

/// Mint a session token for `user_id`.
pub fn issue_session_token(security: &dyn Security, user_id: &UserId) -> Result<String> {
    security.issue_token(&session_claims(user_id))
}

/// Resolve a session token to the user id it names.
///
/// Tokens of any other kind (reset links) are rejected.
pub fn session_user_id(security: &dyn Security, token: &str) -> Result<UserId> {
    let claims = security.parse_token(token)?;
    match claims.get(CLAIM_KIND).and_then(Value::as_str) {
        Some(KIND_SESSION) => {}
        _ => return Err(SmsNoteError::Token),
    }
    claims
        .get(CLAIM_USER_ID)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(UserId::from)
        .ok_or(SmsNoteError::Token)
}

/// Short fingerprint of a password hash.
///
/// Embedded in reset tokens: once the password changes the fingerprint no
/// longer matches, which makes a reset link single-use without server state.
pub fn password_stamp(password_hash: &str) -> String {
    let digest = blake3::hash(password_hash.as_bytes());
    digest.to_hex().as_str()[..16].to_string()
}
