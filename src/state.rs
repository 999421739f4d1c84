// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{
    AuthError, AuthenticationGate, HttpJwksFetcher, JwksCache, KeyResolver, TenantId,
    TokenValidator,
};
use crate::config::Settings;
use crate::extraction::{
    vision::DEFAULT_REQUEST_TIMEOUT, DisabledPipeline, ExtractionError, ExtractionPipeline,
    VisionExtractor,
};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[derive(Clone)]
pub struct AppState {
    pub gate: AuthenticationGate,
    pub jwks: JwksCache,
    pub tenant: TenantId,
    pub pipeline: Arc<dyn ExtractionPipeline>,
}

impl AppState {
    pub fn new(
        gate: AuthenticationGate,
        jwks: JwksCache,
        tenant: TenantId,
        pipeline: Arc<dyn ExtractionPipeline>,
    ) -> Self {
        Self {
            gate,
            jwks,
            tenant,
            pipeline,
        }
    }

    /// Wire the authentication stack and extraction pipeline from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, StateError> {
        let fetcher = HttpJwksFetcher::new(
            settings.authority_url.clone(),
            settings.client_id.clone(),
            settings.cache_policy.fetch_timeout,
        )?;
        let jwks = JwksCache::new(Arc::new(fetcher), settings.cache_policy);
        let resolver = Arc::new(KeyResolver::new(jwks.clone()));
        let validator = TokenValidator::new(resolver, settings.validation_settings());

        let pipeline: Arc<dyn ExtractionPipeline> = match &settings.vision {
            Some(vision) => Arc::new(VisionExtractor::new(vision, DEFAULT_REQUEST_TIMEOUT)?),
            None => Arc::new(DisabledPipeline),
        };

        Ok(Self::new(
            AuthenticationGate::new(Arc::new(validator)),
            jwks,
            settings.tenant_id.clone(),
            pipeline,
        ))
    }

    pub fn with_pipeline(mut self, pipeline: Arc<dyn ExtractionPipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }
}
