// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # JWKS Refresher
//!
//! Background task that refreshes the configured tenant's key set on a fixed
//! interval, so request handlers rarely pay for a fetch and a rotated key is
//! usually known before the first token signed with it arrives.
//!
//! A failed refresh leaves the cached set in place; the cache itself decides
//! whether it may still be served.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{JwksCache, TenantId};

pub struct JwksRefresher {
    jwks: JwksCache,
    tenant: TenantId,
    interval: Duration,
}

impl JwksRefresher {
    pub fn new(jwks: JwksCache, tenant: TenantId, interval: Duration) -> Self {
        Self {
            jwks,
            tenant,
            interval,
        }
    }

    /// Run the refresh loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tenant = %self.tenant,
            interval_secs = self.interval.as_secs(),
            "JWKS refresher starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("JWKS refresher shutting down");
                    return;
                }
            }

            self.refresh_step().await;
        }
    }

    async fn refresh_step(&self) {
        match self.jwks.refresh(&self.tenant).await {
            Ok(keys) => debug!(tenant = %self.tenant, keys = keys.len(), "JWKS refreshed"),
            Err(e) => {
                let status = self.jwks.status(&self.tenant).await;
                warn!(
                    tenant = %self.tenant,
                    error = %e,
                    status = status.as_str(),
                    "JWKS refresh failed"
                );
            }
        }
    }
}
