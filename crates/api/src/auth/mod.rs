//! Credential verification for live connections.

pub mod jwt;

use inksketch_core::types::UserId;
use inksketch_core::CoreError;

use self::jwt::JwtConfig;

/// Verify a bearer token and return the owning user.
///
/// This is the relay's single authentication seam: a connection is
/// registered only after this succeeds.
pub fn verify_credential(token: &str, config: &JwtConfig) -> Result<UserId, CoreError> {
    let claims = jwt::validate_token(token, config)
        .map_err(|e| CoreError::Unauthorized(format!("Invalid token: {e}")))?;
    Ok(claims.sub)
}
