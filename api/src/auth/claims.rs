use serde::{Deserialize, Serialize};

/// Caller role as asserted by the identity provider that minted the JWT.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);
