// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication gate and middleware for Axum.
//!
//! The gate pulls the bearer token out of the `Authorization` header, runs it
//! through the [`TokenValidator`] and yields a [`VerifiedIdentity`]. Failures
//! are logged with their detailed kind; the caller only sees the generic
//! category produced by `AuthError`'s `IntoResponse`.
//!
//! Apply [`require_bearer`] to a router subtree:
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/whoami", get(whoami))
//!     .route_layer(axum::middleware::from_fn_with_state(
//!         state.gate.clone(),
//!         require_bearer,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use super::claims::VerifiedIdentity;
use super::error::AuthError;
use super::validator::TokenValidator;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. An absent header, a non-ASCII
/// value, another scheme or an empty token all yield `MissingToken`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let (scheme, token) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or(AuthError::MissingToken)?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

/// Boundary between HTTP requests and token validation.
#[derive(Clone)]
pub struct AuthenticationGate {
    validator: Arc<TokenValidator>,
}

impl AuthenticationGate {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }

    /// Authenticate a request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        let result = match bearer_token(headers) {
            Ok(token) => self
                .validator
                .validate(token)
                .await
                .map(|claims| VerifiedIdentity::new(claims, token)),
            Err(e) => Err(e),
        };

        match &result {
            Ok(identity) => debug!(sub = %identity.subject(), "Request authenticated"),
            Err(e) if e.is_infrastructure() => {
                warn!(kind = e.kind(), error = %e, "Authentication unavailable")
            }
            Err(AuthError::MissingToken) => debug!(kind = "missing_token", "No bearer token"),
            Err(e) => info!(kind = e.kind(), error = %e, "Token rejected"),
        }

        result
    }
}

/// Middleware that rejects unauthenticated requests and attaches the
/// [`VerifiedIdentity`] to request extensions for downstream handlers.
pub async fn require_bearer(
    State(gate): State<AuthenticationGate>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.authenticate(request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
