use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::LongformError;

/// The caller's identity, resolved once per request. Service-to-service
/// calls are an authorization capability acting on behalf of a user, not an
/// identity of their own; every ownership check matches on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User { sub: String },
    Service { actor_user_id: String },
}

impl Principal {
    /// The user this request acts as.
    pub fn acting_user_id(&self) -> &str {
        match self {
            Principal::User { sub } => sub,
            Principal::Service { actor_user_id } => actor_user_id,
        }
    }

    pub fn owns(&self, user_id: &str) -> bool {
        self.acting_user_id() == user_id
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Principal::Service { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AuthKeys {
    pub service_secret: String,
    pub jwt_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Resolve the request principal from the bearer token and actor header.
pub fn resolve_principal(keys: &AuthKeys, headers: &HeaderMap) -> Result<Principal, LongformError> {
    let token = bearer_token(headers).ok_or(LongformError::Unauthorized)?;

    // Service path: shared secret plus a mandatory actor header
    if !keys.service_secret.is_empty() && token == keys.service_secret {
        let actor = headers
            .get("x-actor-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(LongformError::Unauthorized)?;
        return Ok(Principal::Service {
            actor_user_id: actor.to_string(),
        });
    }

    // End-user path: HS256 bearer issued by the identity service
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(keys.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| LongformError::Unauthorized)?;

    Ok(Principal::User {
        sub: decoded.claims.sub,
    })
}

/// Middleware inserting the resolved `Principal` into request extensions.
/// Unresolvable requests are rejected with 401 before reaching a handler.
pub async fn principal_middleware(
    State(keys): State<AuthKeys>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_principal(&keys, req.headers()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
