//! Request authentication. Each handler states the role it needs through the
//! `Caller<R>` extractor; the check runs before the handler body.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{errors::ApiError, AppState};
use crate::models::users::{Identity, Role};
use crate::services::ServiceError;

pub trait Requirement: Send + Sync + 'static {
    const LABEL: &'static str;

    fn permits(role: Role) -> bool;
}

pub struct OwnerOnly;

pub struct AgentOnly;

pub struct AnyRole;

impl Requirement for OwnerOnly {
    const LABEL: &'static str = "owner";

    fn permits(role: Role) -> bool {
        role == Role::Owner
    }
}

impl Requirement for AgentOnly {
    const LABEL: &'static str = "agent";

    fn permits(role: Role) -> bool {
        role == Role::Agent
    }
}

impl Requirement for AnyRole {
    const LABEL: &'static str = "any";

    fn permits(_role: Role) -> bool {
        true
    }
}

/// Verified caller whose role satisfies `R`.
pub struct Caller<R: Requirement> {
    pub identity: Identity,
    requirement: PhantomData<fn() -> R>,
}

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token.".to_string()))?;

    let malformed = || ServiceError::Unauthorized("Malformed authorization header.".to_string());
    let value = header.to_str().map_err(|_| malformed())?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(malformed()),
    }
}

impl<R: Requirement> FromRequestParts<AppState> for Caller<R> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = {
            let token = bearer_token(parts)?;
            state.signer.verify(token).map_err(|e| {
                log::warn!("Rejected session token: {}", e);
                ServiceError::Forbidden("Invalid or expired token.".to_string())
            })?
        };

        if !R::permits(identity.role) {
            log::warn!(
                "{} {} denied {} {}: requires {} role.",
                identity.role,
                identity.id,
                parts.method,
                parts.uri.path(),
                R::LABEL
            );
            return Err(ServiceError::Forbidden(format!(
                "This operation requires the {} role.",
                R::LABEL
            ))
            .into());
        }

        parts.extensions.insert(identity.clone());

        Ok(Caller {
            identity,
            requirement: PhantomData,
        })
    }
}
