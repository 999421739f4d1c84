// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public landing endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct WelcomeResponse {
    pub message: String,
}

impl WelcomeResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Server root.
#[utoipa::path(
    get,
    path = "/",
    tag = "Welcome",
    responses((status = 200, description = "Server is up", body = WelcomeResponse))
)]
pub async fn root() -> Json<WelcomeResponse> {
    WelcomeResponse::new("/api/business_card_text_extraction - Root '/'")
}

/// API root.
#[utoipa::path(
    get,
    path = "/api/business_card_text_extraction",
    tag = "Welcome",
    responses((status = 200, description = "API is up", body = WelcomeResponse))
)]
pub async fn api_root() -> Json<WelcomeResponse> {
    WelcomeResponse::new("Welcome to the Business Card Text Extraction API")
}
