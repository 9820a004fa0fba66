//! Admin auth guard: `AdminGuard` Axum extractor.
//!
//! Handlers opt in by adding `guard: AdminGuard` to their parameter list.
//! Two kinds of bearer are accepted:
//! - the static admin token from `CR_ADMIN_TOKEN` (SHA-256 + constant-time
//!   comparison, so the token length is not leaked);
//! - a signed credential with `admin` scope.
//!
//! A valid client-scope credential is refused with 403, anything else 401.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use cr_domain::error::Error;

use crate::api::auth::bearer;
use crate::api::error::ApiError;
use crate::state::AppState;

pub struct AdminGuard {
    /// Who is acting, for the audit trail.
    pub actor: String,
}

const STATIC_TOKEN_ACTOR: &str = "admin-token";

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = bearer(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing admin credential"))?;

        if let Some(expected_hash) = &state.admin_token_hash {
            let provided_hash = Sha256::digest(provided.as_bytes());
            if bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
                return Ok(AdminGuard {
                    actor: STATIC_TOKEN_ACTOR.into(),
                });
            }
        }

        let claims = state
            .tokens
            .verify(provided)
            .map_err(|_| ApiError::unauthorized("invalid admin credential"))?;
        if !claims.is_admin() {
            return Err(Error::Forbidden("admin scope required".into()).into());
        }
        Ok(AdminGuard { actor: claims.sub })
    }
}
