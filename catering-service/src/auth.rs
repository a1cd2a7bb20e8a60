//! Bearer-token sessions. The token carries the same facts the web app keeps
//! in its session: who the user is, their role, the branches they manage and
//! the kitchen station they work at.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{Actor, Role};

use crate::api::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub station_assignment: Option<String>,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthConfig {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        actor: &Actor,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user_id.to_string(),
            email: actor.email.clone(),
            role: actor.role,
            branches: actor.branches.clone(),
            station_assignment: actor.station_assignment.clone(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> ApiResult<Actor> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("Rejected session token: {}", e);
            ApiError::Unauthorized
        })?;
        let claims = data.claims;
        Ok(Actor {
            email: claims.email,
            role: claims.role,
            branches: claims.branches,
            station_assignment: claims.station_assignment,
        })
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

impl AuthUser {
    pub fn require(&self, roles: &[Role]) -> ApiResult<()> {
        if self.0.is_one_of(roles) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        state.auth.verify(token.trim()).map(AuthUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chef() -> Actor {
        Actor {
            email: "chef@example.com".into(),
            role: Role::HeadChef,
            branches: vec![],
            station_assignment: None,
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let auth = AuthConfig::new("test-secret");
        let token = auth.issue("u1", &chef(), Duration::hours(1)).unwrap();
        assert_eq!(auth.verify(&token).unwrap(), chef());
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_rejected() {
        let token = AuthConfig::new("one").issue("u1", &chef(), Duration::hours(1)).unwrap();
        assert!(matches!(AuthConfig::new("two").verify(&token), Err(ApiError::Unauthorized)));

        let auth = AuthConfig::new("one");
        let expired = auth.issue("u1", &chef(), Duration::hours(-2)).unwrap();
        assert!(matches!(auth.verify(&expired), Err(ApiError::Unauthorized)));
    }
}
