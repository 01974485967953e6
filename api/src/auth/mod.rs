pub mod claims;
pub mod extractors;
pub mod guards;

pub use claims::{AuthUser, Claims, Role};

use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use util::config::AppConfig;

/// Generates a JWT and its expiry timestamp for a given subject.
pub fn generate_jwt(subject_id: i64, role: Role) -> (String, String) {
    let (secret, duration_minutes) = {
        let cfg = AppConfig::global();
        (cfg.jwt_secret.clone(), cfg.jwt_duration_minutes as i64)
    };

    let expiry = Utc::now() + Duration::minutes(duration_minutes);
    let claims = Claims {
        sub: subject_id,
        exp: expiry.timestamp() as usize,
        role,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Token encoding failed");

    (token, expiry.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    #[test]
    fn issued_token_round_trips() {
        unsafe {
            std::env::set_var("DATABASE_PATH", "data/test.db");
            std::env::set_var("JWT_SECRET", "api-test-secret");
            std::env::set_var("QR_TOKEN_SECRET", "qr-test-secret");
        }
        AppConfig::set_jwt_secret("api-test-secret");
        AppConfig::set_jwt_duration_minutes(30u64);

        let (token, _expiry) = generate_jwt(42, Role::Faculty);
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret("api-test-secret".as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, 42);
        assert_eq!(data.claims.role, Role::Faculty);
    }
}
