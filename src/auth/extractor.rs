// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated callers.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(identity): Auth) -> impl IntoResponse {
//!     // identity is VerifiedIdentity
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, VerifiedIdentity};
use crate::state::AppState;

/// Extractor for a verified caller.
///
/// Reuses the identity attached by [`require_bearer`](super::middleware::require_bearer)
/// when present, otherwise authenticates through the gate itself.
pub struct Auth(pub VerifiedIdentity);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<VerifiedIdentity>().cloned() {
            return Ok(Auth(identity));
        }

        let identity = state.gate.authenticate(&parts.headers).await?;
        Ok(Auth(identity))
    }
}
