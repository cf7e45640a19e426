//! Actor identity extractor.
//!
//! Mutating endpoints require an `X-Actor` header naming the caller. The
//! value is handed to the authorizer and recorded as `createdBy` on start.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::AppError;
use crate::state::AppState;

pub const ACTOR_HEADER: &str = "x-actor";

/// The calling actor. Extracting it does not authorize anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
    /// Authorize this actor for `paths`, mapping a denial to `Forbidden`.
    pub fn authorize(&self, state: &AppState, paths: &[String]) -> Result<(), AppError> {
        let decision = state.authorize(&self.0, paths);
        if decision.allow {
            Ok(())
        } else {
            Err(AppError::Forbidden(decision.reasons))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(ACTOR_HEADER).ok_or_else(|| {
            AppError::Unauthorized("Missing actor. Provide it via the 'X-Actor' header.".to_string())
        })?;
        let actor = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-Actor header encoding".to_string()))?
            .trim();
        if actor.is_empty() {
            return Err(AppError::Unauthorized("X-Actor header is empty".to_string()));
        }
        Ok(Actor(actor.to_string()))
    }
}
