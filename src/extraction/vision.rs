// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vision-model extraction over an OpenAI-compatible chat-completions API.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::{CardDetails, ExtractionError, ExtractionPipeline, ImageUpload};
use crate::auth::VerifiedIdentity;
use crate::config::VisionSettings;

/// Upper bound for one completion request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_COMPLETION_TOKENS: u32 = 500;

const PROMPT: &str = r#"You are given an image of a business card or a similar document. Extract structured information from the image and provide the details in the following JSON format:
{
    "data": {
        "email": "[Extracted email if present, otherwise null]",
        "phone_numbers": ["[List of extracted phone numbers]"],
        "agent_name": "[Extracted agent name or null]",
        "company_name": "[Extracted company name or null]",
        "web_presence": {
            "website": "[Extracted website URL if present, otherwise null]",
            "facebook": "[Extracted Facebook URL or handle, otherwise null]",
            "instagram": "[Extracted Instagram URL or handle, otherwise null]",
            "twitter": "[Extracted Twitter URL or handle, otherwise null]"
        }
    }
}

Analyze the content of the image carefully and extract any information that matches these fields. If some information is not present, use null for that field. Reply with the JSON only."#;

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct VisionExtractor {
    api_url: Url,
    api_key: String,
    model: String,
    http: Client,
}

impl VisionExtractor {
    pub fn new(settings: &VisionSettings, timeout: Duration) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            http,
        })
    }

    fn request_body(&self, image: &ImageUpload) -> Value {
        let data_url = format!(
            "data:{};base64,{}",
            image.content_type,
            Base64::encode_string(&image.bytes)
        );

        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": MAX_COMPLETION_TOKENS
        })
    }
}

#[async_trait]
impl ExtractionPipeline for VisionExtractor {
    async fn extract(
        &self,
        identity: &VerifiedIdentity,
        image: ImageUpload,
    ) -> Result<CardDetails, ExtractionError> {
        debug!(
            sub = %identity.subject(),
            content_type = %image.content_type,
            bytes = image.bytes.len(),
            "Sending card image to vision model"
        );

        let response = self
            .http
            .post(self.api_url.clone())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&image))
            .send()
            .await
            .map_err(|e| ExtractionError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Vision model request failed");
            return Err(ExtractionError::Upstream(format!(
                "HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidOutput(format!("unexpected response: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::InvalidOutput("empty completion".to_string()))?;

        let details = parse_card_details(&content)?;
        info!(
            sub = %identity.subject(),
            phone_numbers = details.phone_numbers.len(),
            "Card details extracted"
        );
        Ok(details)
    }
}

/// Parse the model's reply, accepting a fenced block and an outer `data` object.
pub fn parse_card_details(content: &str) -> Result<CardDetails, ExtractionError> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::InvalidOutput(format!("reply is not JSON: {e}")))?;

    let value = match value {
        Value::Object(mut object) if object.get("data").is_some_and(Value::is_object) => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(value)
        .map_err(|e| ExtractionError::InvalidOutput(format!("reply has the wrong shape: {e}")))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
