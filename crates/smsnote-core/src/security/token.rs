//! HS256 signed claim tokens.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};

use super::Claims;
use crate::error::{Result, SmsNoteError};

/// Sign `claims` with the shared secret.
pub fn issue_token(secret: &SecretString, claims: &Claims) -> Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| SmsNoteError::Crypto(format!("Failed to sign token: {}", e)))
}

/// Verify a token and return its claims.
///
/// Only HS256 is accepted. Expiry lives in our own claims, so the registered
/// `exp` claim is neither required nor checked here.
pub fn parse_token(secret: &SecretString, token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(reason = %e, "rejected token");
        SmsNoteError::Token
    })
}
