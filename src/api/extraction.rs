// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Card text extraction endpoint.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::extraction::{CardDetails, ImageUpload};
use crate::state::AppState;

/// Multipart field carrying the card image.
pub const IMAGE_FIELD: &str = "image";

/// Largest accepted upload (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractTextResponse {
    pub message: String,
    pub data: CardDetails,
}

/// Multipart upload documented for Swagger UI.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageForm {
    #[schema(format = Binary)]
    image: String,
}

/// Extract contact details from a business card image with the vision model.
#[utoipa::path(
    post,
    path = "/api/business_card_text_extraction/extract_text_using_gpt",
    tag = "Extraction",
    security(("bearer" = [])),
    request_body(content = ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Text extracted", body = ExtractTextResponse),
        (status = 400, description = "Missing token, missing image or not an image"),
        (status = 401, description = "Invalid token"),
        (status = 502, description = "Extraction backend failed"),
        (status = 503, description = "Extraction not configured"),
    )
)]
pub async fn extract_text_using_gpt(
    State(state): State<AppState>,
    Auth(identity): Auth,
    multipart: Multipart,
) -> Result<Json<ExtractTextResponse>, ApiError> {
    let image = read_image(multipart).await?;
    debug!(
        sub = %identity.subject(),
        content_type = %image.content_type,
        bytes = image.bytes.len(),
        "Image received"
    );

    let data = state.pipeline.extract(&identity, image).await?;
    info!(sub = %identity.subject(), "Extracted text");

    Ok(Json(ExtractTextResponse {
        message: "Text extracted successfully.".to_string(),
        data,
    }))
}

async fn read_image(mut multipart: Multipart) -> Result<ImageUpload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request(
                "Invalid file type. Please upload an image file.",
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read image: {e}")))?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("Uploaded image is empty."));
        }

        return Ok(ImageUpload {
            content_type,
            bytes,
        });
    }

    Err(ApiError::bad_request("Missing 'image' field."))
}
