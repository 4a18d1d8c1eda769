use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

/// Issues a signed token of the given type for an operator.
pub fn generate_token(
    token_type: TokenType,
    user_id: u64,
    username: &str,
    role: u8,
    secret: &str,
    ttl: usize,
    now: DateTime<Utc>,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id,
        sub: username.to_string(),
        role,
        exp: now.timestamp().max(0) as usize + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn issued_tokens_verify_with_the_same_secret() -> TestResult {
        let (token, claims) =
            generate_token(TokenType::Refresh, 7, "gate-1", 3, "secret", 60, Utc::now())?;

        let verified = verify_token(&token, "secret")?;
        assert_eq!(verified.user_id, 7);
        assert_eq!(verified.jti, claims.jti);
        assert_eq!(verified.token_type, TokenType::Refresh);

        assert!(verify_token(&token, "other-secret").is_err());
        Ok(())
    }

    #[test]
    fn expired_tokens_are_rejected() -> TestResult {
        let long_ago = Utc::now() - chrono::Duration::days(1);
        let (token, _) = generate_token(TokenType::Access, 1, "admin", 1, "secret", 60, long_ago)?;
        assert!(verify_token(&token, "secret").is_err());
        Ok(())
    }
}
