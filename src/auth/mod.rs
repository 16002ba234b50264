//! Caller identity supplied by the upstream gateway.
//!
//! Authentication happens in front of this service. The gateway forwards the resolved
//! user in trusted headers (or a middleware places an [`Actor`] in request extensions);
//! handlers only read it.

use crate::errors::ServiceError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Roles allowed to approve, reject or delete invoices and to manage coupons.
pub const MANAGER_ROLES: &[&str] = &["admin", "manager"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
}

impl Actor {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        user_role: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            user_role: user_role.into(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user_role.eq_ignore_ascii_case(role)
    }

    pub fn require_any_role(&self, roles: &[&str]) -> Result<(), ServiceError> {
        if roles.iter().any(|role| self.has_role(role)) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} may not perform this action",
                self.user_role
            )))
        }
    }

    fn from_headers(parts: &Parts) -> Option<Self> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let user_id = header(USER_ID_HEADER)?;
        Some(Self {
            user_name: header(USER_NAME_HEADER).unwrap_or_else(|| user_id.clone()),
            user_role: header(USER_ROLE_HEADER).unwrap_or_else(|| "staff".to_string()),
            user_id,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }
        Actor::from_headers(parts)
            .ok_or_else(|| ServiceError::Unauthorized("missing caller identity".to_string()))
    }
}

/// Rejects requests without a caller identity and pins the resolved [`Actor`]
/// into request extensions for the handlers behind it.
pub async fn require_actor(actor: Actor, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(actor);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Actor, ServiceError> {
        let (mut parts, _) = request.into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_gateway_headers() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "u-17")
            .header(USER_NAME_HEADER, "Ravi")
            .header(USER_ROLE_HEADER, "manager")
            .body(())
            .unwrap();

        let actor = extract(request).await.unwrap();
        assert_eq!(actor, Actor::new("u-17", "Ravi", "manager"));
        assert!(actor.require_any_role(MANAGER_ROLES).is_ok());
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        assert_matches!(extract(request).await, Err(ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn extension_wins_over_headers() {
        let mut request = Request::builder()
            .header(USER_ID_HEADER, "from-header")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(Actor::new("from-extension", "Mechanic", "staff"));

        let actor = extract(request).await.unwrap();
        assert_eq!(actor.user_id, "from-extension");
        assert_matches!(
            actor.require_any_role(MANAGER_ROLES),
            Err(ServiceError::Forbidden(_))
        );
    }
}
