// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every verification stage returns one of these. The `Display` text carries
//! the diagnostic detail and is only ever logged; the HTTP response built by
//! [`IntoResponse`] exposes nothing beyond the coarse [`ErrorCategory`].

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Variants carrying a `String` hold internal detail for logs. The type is
/// `Clone` because a single shared JWKS fetch hands its result to every
/// waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// JWKS endpoint unreachable, timed out or returned a non-success status
    #[error("JWKS fetch failed: {0}")]
    NetworkError(String),
    /// JWKS body was not a well-formed, non-empty key set
    #[error("JWKS response could not be parsed: {0}")]
    ParseError(String),
    /// No key with the token's `kid`, even after one refetch
    #[error("no key matching kid '{0}' in JWKS")]
    KeyNotFound(String),
    /// JWK with a `kty` other than RSA
    #[error("unsupported JWK key type '{0}'")]
    UnsupportedKeyType(String),
    /// JWK numeric fields could not be turned into an RSA public key
    #[error("JWK conversion failed: {0}")]
    KeyConversionError(String),
    /// Token is not a well-formed compact JWS
    #[error("malformed token: {0}")]
    MalformedToken(String),
    /// Header `alg` differs from the configured algorithm
    #[error("unsupported token algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    /// Signature does not verify under the resolved key
    #[error("token signature is invalid")]
    InvalidSignature,
    /// `exp` is in the past beyond the clock-skew tolerance
    #[error("token has expired")]
    ExpiredToken,
    /// `nbf` is in the future beyond the clock-skew tolerance
    #[error("token is not yet valid")]
    TokenNotYetValid,
    /// `iss` does not match the configured issuer
    #[error("token issuer is not accepted")]
    InvalidIssuer,
    /// `aud` does not contain the configured audience
    #[error("token audience is not accepted")]
    InvalidAudience,
    /// No `Authorization: Bearer <token>` header
    #[error("bearer token is missing")]
    MissingToken,
}

/// Coarse grouping of [`AuthError`] exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is unusable (400).
    InvalidRequest,
    /// The credential was rejected (401).
    InvalidToken,
    /// The identity provider could not be reached or understood (502).
    Unavailable,
    /// The provider's keys could not be used (500).
    Internal,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    error_code: &'static str,
}

impl AuthError {
    /// Stable, machine-readable name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::NetworkError(_) => "network_error",
            AuthError::ParseError(_) => "parse_error",
            AuthError::KeyNotFound(_) => "key_not_found",
            AuthError::UnsupportedKeyType(_) => "unsupported_key_type",
            AuthError::KeyConversionError(_) => "key_conversion_error",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::ExpiredToken => "expired_token",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::MissingToken => "missing_token",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::MissingToken
            | AuthError::MalformedToken(_)
            | AuthError::UnsupportedAlgorithm(_) => ErrorCategory::InvalidRequest,
            AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::TokenNotYetValid
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::KeyNotFound(_) => ErrorCategory::InvalidToken,
            AuthError::NetworkError(_) | AuthError::ParseError(_) => ErrorCategory::Unavailable,
            AuthError::KeyConversionError(_) | AuthError::UnsupportedKeyType(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCategory::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCategory::Unavailable => StatusCode::BAD_GATEWAY,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures caused by the identity provider rather than the caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Unavailable | ErrorCategory::Internal
        )
    }
}

impl ErrorCategory {
    pub fn error_code(self) -> &'static str {
        match self {
            ErrorCategory::InvalidRequest => "invalid_request",
            ErrorCategory::InvalidToken => "invalid_token",
            ErrorCategory::Unavailable => "authentication_unavailable",
            ErrorCategory::Internal => "authentication_error",
        }
    }

    pub fn public_message(self) -> &'static str {
        match self {
            ErrorCategory::InvalidRequest => {
                "A valid 'Authorization: Bearer <token>' header is required"
            }
            ErrorCategory::InvalidToken => "The access token is invalid or expired",
            ErrorCategory::Unavailable => "Authentication service is temporarily unavailable",
            ErrorCategory::Internal => "Authentication could not be completed",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let category = self.category();
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: category.public_message(),
            error_code: category.error_code(),
        });
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }
        response
    }
}
