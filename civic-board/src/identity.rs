//! Request principals
//!
//! Token verification is delegated to an [`IdentityProvider`]; this module only
//! turns a bearer token into `{user_id, role}` and enforces the role rules.
//!
//! Extractors:
//! - [`Principal`]: authentication required (401 otherwise)
//! - [`OptionalPrincipal`]: never rejects; unknown or missing tokens yield None
//! - [`AdminPrincipal`]: authentication and the admin role required (401/403)

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::collections::HashMap;
use tracing::debug;

use crate::config::TokenGrant;
use crate::error::Error;
use crate::users::Role;
use crate::AppState;

/// Subject asserted by the identity provider
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Role applied when a profile is first provisioned
    pub role_hint: Role,
}

/// Opaque token verification capability
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Option<VerifiedIdentity>;
}

/// Fixed token table, loaded from `[[identity.tokens]]`
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    grants: HashMap<String, VerifiedIdentity>,
}

impl StaticTokenProvider {
    pub fn new(grants: &[TokenGrant]) -> Self {
        let grants = grants
            .iter()
            .filter(|g| !g.token.is_empty() && !g.uid.is_empty())
            .map(|g| {
                (
                    g.token.clone(),
                    VerifiedIdentity {
                        uid: g.uid.clone(),
                        email: g.email.clone(),
                        name: g.name.clone(),
                        role_hint: g.role,
                    },
                )
            })
            .collect();
        Self { grants }
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn verify(&self, token: &str) -> Option<VerifiedIdentity> {
        self.grants.get(token).cloned()
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub identity: VerifiedIdentity,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Admin gate used by every responder-only operation
pub fn require_admin(principal: Option<&Principal>) -> Result<&Principal, Error> {
    let principal =
        principal.ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))?;
    if !principal.is_admin() {
        return Err(Error::Forbidden("Admin access required".to_string()));
    }
    Ok(principal)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))?;

        let identity = state
            .identity
            .verify(token)
            .await
            .ok_or_else(|| Error::Unauthorized("Invalid or expired token".to_string()))?;

        let user = state.users.get_or_provision(&identity).await;
        Ok(Principal {
            user_id: user.id,
            role: user.role,
            identity,
        })
    }
}

/// Principal when a known user presents a valid token, else None
#[derive(Debug, Clone)]
pub struct OptionalPrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalPrincipal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(OptionalPrincipal(None));
        };
        let Some(identity) = state.identity.verify(token).await else {
            debug!("Optional auth: token rejected, continuing anonymously");
            return Ok(OptionalPrincipal(None));
        };

        let principal = state.users.get_by_uid(&identity.uid).await.map(|user| Principal {
            user_id: user.id,
            role: user.role,
            identity,
        });
        Ok(OptionalPrincipal(principal))
    }
}

/// Principal holding the admin role
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        require_admin(Some(&principal))?;
        Ok(AdminPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: "user_1".into(),
            role,
            identity: VerifiedIdentity {
                uid: "uid-1".into(),
                email: None,
                name: None,
                role_hint: role,
            },
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(matches!(require_admin(None), Err(Error::Unauthorized(_))));
        assert!(matches!(
            require_admin(Some(&principal(Role::Citizen))),
            Err(Error::Forbidden(_))
        ));
        assert!(require_admin(Some(&principal(Role::Admin))).is_ok());
    }

    #[tokio::test]
    async fn test_static_tokens() {
        let provider = StaticTokenProvider::new(&[
            TokenGrant {
                token: "tok-admin".into(),
                uid: "ops".into(),
                email: Some("ops@city.gov".into()),
                name: Some("Ops Desk".into()),
                role: Role::Admin,
            },
            TokenGrant {
                token: String::new(),
                uid: "ignored".into(),
                email: None,
                name: None,
                role: Role::Citizen,
            },
        ]);

        assert_eq!(provider.len(), 1);
        let identity = provider.verify("tok-admin").await.unwrap();
        assert_eq!(identity.uid, "ops");
        assert_eq!(identity.role_hint, Role::Admin);
        assert!(provider.verify("tok-other").await.is_none());
        assert!(provider.verify("").await.is_none());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let (mut parts, _) = axum::http::Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc123")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc123"));

        parts.headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&parts), None);

        parts.headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&parts), None);
    }
}
