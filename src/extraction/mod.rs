// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Business card extraction.
//!
//! The HTTP layer hands a verified caller and the uploaded image to an
//! [`ExtractionPipeline`] and gets structured contact details back. The
//! pipeline never sees the bearer token's validation state; it only runs
//! after the gate accepted the request.

use async_trait::async_trait;
use axum::body::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::auth::VerifiedIdentity;

pub mod vision;

pub use vision::VisionExtractor;

/// An uploaded image.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// MIME type as declared by the client (always `image/*`).
    pub content_type: String,
    pub bytes: Bytes,
}

/// Online presence listed on a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebPresence {
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
}

/// Contact details read from a business card. Absent fields are `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub web_presence: WebPresence,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default<'de, D>(deserializer: D) -> Result<WebPresence, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<WebPresence>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction is not configured: {0}")]
    Unavailable(String),

    #[error("Extraction request failed: {0}")]
    Upstream(String),

    #[error("Extraction output was invalid: {0}")]
    InvalidOutput(String),
}

/// Turns a card image into [`CardDetails`].
#[async_trait]
pub trait ExtractionPipeline: Send + Sync {
    async fn extract(
        &self,
        identity: &VerifiedIdentity,
        image: ImageUpload,
    ) -> Result<CardDetails, ExtractionError>;
}

/// Pipeline used when no extraction backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPipeline;

#[async_trait]
impl ExtractionPipeline for DisabledPipeline {
    async fn extract(
        &self,
        _identity: &VerifiedIdentity,
        _image: ImageUpload,
    ) -> Result<CardDetails, ExtractionError> {
        Err(ExtractionError::Unavailable(
            "no vision API key configured".to_string(),
        ))
    }
}
