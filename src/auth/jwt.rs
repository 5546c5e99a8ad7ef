use crate::models::Claims;
use jsonwebtoken::{DecodingKey, Validation, decode};

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

/// Tokens are issued by the identity provider; tests mint their own.
#[cfg(test)]
pub fn generate_access_token(
    username: &str,
    role: u8,
    tenant: Option<&str>,
    secret: &str,
    ttl: usize,
) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        sub: username.to_string(),
        role,
        tenant: tenant.map(str::to_string),
        exp: now + ttl,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_with_the_shared_secret() {
        let token = generate_access_token("hr.user", 2, Some("erp_mbl"), "s3cret", 60);
        let claims = verify_token(&token, "s3cret").unwrap();

        assert_eq!(claims.sub, "hr.user");
        assert_eq!(claims.role, 2);
        assert_eq!(claims.tenant.as_deref(), Some("erp_mbl"));
        assert!(verify_token(&token, "other").is_err());
    }
}
