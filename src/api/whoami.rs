// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoint.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, VerifiedIdentity};

/// Response for GET /whoami
#[derive(Debug, Serialize, ToSchema)]
pub struct WhoAmIResponse {
    pub status: String,
    /// The token's `name` claim, if any.
    pub username: Option<String>,
}

impl From<&VerifiedIdentity> for WhoAmIResponse {
    fn from(identity: &VerifiedIdentity) -> Self {
        Self {
            status: "ok".to_string(),
            username: identity.name().map(str::to_string),
        }
    }
}

/// Verify the caller's bearer token.
///
/// Returns the display name carried by a valid token. Also served at
/// `/token_verify`.
#[utoipa::path(
    get,
    path = "/api/business_card_text_extraction/whoami",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Token is valid", body = WhoAmIResponse),
        (status = 400, description = "Missing or malformed token"),
        (status = 401, description = "Invalid, expired or foreign token"),
        (status = 502, description = "Signing keys unavailable"),
    )
)]
pub async fn whoami(Auth(identity): Auth) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse::from(&identity))
}
