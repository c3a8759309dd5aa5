use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to sign token: {0}")]
    SigningFailed(#[from] jsonwebtoken::errors::Error),
    #[error("token is missing or invalid")]
    InvalidToken,
    #[error("invalid credentials")]
    InvalidCredentials,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub exp: usize,
}

/// Signs a JWT (HS256) for `username` with a 24-hour expiry, mirroring
/// `jwt.NewWithClaims(jwt.SigningMethodHS256, ...).SignedString(secret)`
/// in the traced original.
pub fn mint_token(username: &str, secret: &str, now_unix: u64) -> Result<String, AuthError> {
    let claims = Claims {
        username: username.to_string(),
        exp: (now_unix + TOKEN_TTL_SECS) as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verifies and decodes a token, rejecting anything invalid or expired.
/// An invalid token is treated identically to a missing one by the gate.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_and_verifies_a_token() {
        let token = mint_token("alice", "s3cr3t", 1_700_000_000).unwrap();
        let claims = verify_token(&token, "s3cr3t").unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp, 1_700_000_000 + TOKEN_TTL_SECS as usize);
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let token = mint_token("alice", "s3cr3t", 1_700_000_000).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let token = mint_token("alice", "s3cr3t", 0).unwrap();
        assert!(verify_token(&token, "s3cr3t").is_err());
    }
}
