// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behaviour
//!
//! - One entry per tenant, replaced as a unit and only after the new key set
//!   parsed cleanly. A failed fetch never touches a good entry.
//! - An entry is fresh for `ttl`. After that the next `get` refetches.
//! - Concurrent callers that find a tenant stale share a single in-flight
//!   fetch. The fetch runs on its own task, so a caller that gives up (request
//!   cancelled) does not cancel it for the others.
//! - If a refetch fails, an entry younger than `ttl + stale_grace` is served
//!   and the tenant is flagged degraded. Past that bound we fail closed.
//! - For `retry_backoff` after a failed fetch, `get` serves that stale entry
//!   straight away instead of waiting on another fetch.
//!
//! ## Usage
//!
//! Build one `JwksCache` at startup and share clones of it; clones point at
//! the same state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::AuthError;
use super::jwk::{JwkSet, TenantId};

/// Default JWKS cache TTL (10 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default window past the TTL during which a stale set may still be served.
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(3600);

/// Default upper bound for a single JWKS request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between fetch attempts while the provider is failing.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Source of key sets for a tenant.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetch and parse the tenant's current key set.
    async fn fetch(&self, tenant: &TenantId) -> Result<JwkSet, AuthError>;
}

/// Fetches Azure AD key sets over HTTPS.
///
/// `GET {authority}/{tenant}/discovery/v2.0/keys?appid={client_id}`
#[derive(Clone)]
pub struct HttpJwksFetcher {
    authority: Url,
    client_id: String,
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    pub fn new(
        authority: Url,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            authority,
            client_id: client_id.into(),
            client,
        })
    }

    /// The discovery URL for a tenant.
    pub fn jwks_url(&self, tenant: &TenantId) -> Result<Url, AuthError> {
        let mut url = self.authority.clone();
        url.path_segments_mut()
            .map_err(|_| AuthError::NetworkError("authority URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([tenant.as_str(), "discovery", "v2.0", "keys"]);
        url.query_pairs_mut().append_pair("appid", &self.client_id);
        Ok(url)
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, tenant: &TenantId) -> Result<JwkSet, AuthError> {
        let url = self.jwks_url(tenant)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::NetworkError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        JwkSet::from_slice(&body)
    }
}

/// Timing policy of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub stale_grace: Duration,
    pub fetch_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            stale_grace: DEFAULT_STALE_GRACE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Observable state of a tenant's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Within TTL.
    Fresh,
    /// Past TTL (or invalidated) but still inside the grace window.
    Stale,
    /// The last refresh failed and a stale set is being served.
    Degraded,
    /// No usable entry.
    Empty,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Fresh => "ok",
            CacheStatus::Stale => "stale",
            CacheStatus::Degraded => "degraded",
            CacheStatus::Empty => "unavailable",
        }
    }
}

/// JWKS cache entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    key_set: Arc<JwkSet>,
    fetched_at: Instant,
    /// Set by `invalidate`; forces the next `get` to refetch.
    invalidated: bool,
}

impl CacheEntry {
    fn is_fresh(&self, policy: &CachePolicy) -> bool {
        !self.invalidated && self.fetched_at.elapsed() < policy.ttl
    }

    fn is_within_grace(&self, policy: &CachePolicy) -> bool {
        self.fetched_at.elapsed() < policy.ttl.saturating_add(policy.stale_grace)
    }
}

type FetchResult = Result<Arc<JwkSet>, AuthError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct Inner {
    fetcher: Arc<dyn JwksFetcher>,
    policy: CachePolicy,
    entries: RwLock<HashMap<TenantId, CacheEntry>>,
    /// In-flight fetches; critical sections never span an await.
    in_flight: Mutex<HashMap<TenantId, SharedFetch>>,
    /// When the last fetch for a tenant failed; cleared by a successful one.
    failures: Mutex<HashMap<TenantId, Instant>>,
}

/// Process-wide, per-tenant JWKS cache.
#[derive(Clone)]
pub struct JwksCache {
    inner: Arc<Inner>,
}

impl JwksCache {
    /// Create an empty cache backed by `fetcher`.
    pub fn new(fetcher: Arc<dyn JwksFetcher>, policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                policy,
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.inner.policy
    }

    /// Get the tenant's key set, fetching when the entry is missing or stale.
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn get(&self, tenant: &TenantId) -> Result<Arc<JwkSet>, AuthError> {
        {
            let entries = self.inner.entries.read().await;
            if let Some(entry) = entries.get(tenant) {
                if entry.is_fresh(&self.inner.policy) {
                    return Ok(Arc::clone(&entry.key_set));
                }
                if entry.is_within_grace(&self.inner.policy) && self.in_backoff(tenant) {
                    debug!(tenant = %tenant, "JWKS provider failing recently, serving stale key set");
                    return Ok(Arc::clone(&entry.key_set));
                }
            }
        }

        match self.shared_fetch(tenant, true).await {
            Ok(key_set) => Ok(key_set),
            Err(err) => self.serve_stale(tenant, err).await,
        }
    }

    /// Fetch the tenant's key set now, joining a fetch already in flight.
    ///
    /// Unlike [`get`](Self::get) this never falls back to a stale entry.
    pub async fn refresh(&self, tenant: &TenantId) -> Result<Arc<JwkSet>, AuthError> {
        self.shared_fetch(tenant, false).await
    }

    /// Force the next `get` for this tenant to refetch.
    ///
    /// The entry is kept so it can still be served under the stale policy if
    /// the refetch fails.
    pub async fn invalidate(&self, tenant: &TenantId) {
        let mut entries = self.inner.entries.write().await;
        if let Some(entry) = entries.get_mut(tenant) {
            debug!(tenant = %tenant, "JWKS cache entry invalidated");
            entry.invalidated = true;
        }
    }

    /// Current state of the tenant's entry.
    pub async fn status(&self, tenant: &TenantId) -> CacheStatus {
        let entries = self.inner.entries.read().await;
        let Some(entry) = entries.get(tenant) else {
            return CacheStatus::Empty;
        };
        let policy = &self.inner.policy;

        if entry.is_fresh(policy) {
            CacheStatus::Fresh
        } else if !entry.is_within_grace(policy) {
            CacheStatus::Empty
        } else if self.is_degraded(tenant) {
            CacheStatus::Degraded
        } else {
            CacheStatus::Stale
        }
    }

    /// Whether the last fetch for this tenant failed.
    pub fn is_degraded(&self, tenant: &TenantId) -> bool {
        self.last_failure(tenant).is_some()
    }

    fn last_failure(&self, tenant: &TenantId) -> Option<Instant> {
        self.inner
            .failures
            .lock()
            .ok()
            .and_then(|failures| failures.get(tenant).copied())
    }

    fn in_backoff(&self, tenant: &TenantId) -> bool {
        self.last_failure(tenant)
            .is_some_and(|at| at.elapsed() < self.inner.policy.retry_backoff)
    }

    /// Join the tenant's in-flight fetch, or start one.
    ///
    /// With `reuse_fresh`, an entry stored by a fetch that finished after the
    /// caller's own freshness check is returned instead of fetching again.
    fn shared_fetch(&self, tenant: &TenantId, reuse_fresh: bool) -> SharedFetch {
        let mut in_flight = match self.inner.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = in_flight.get(tenant) {
            debug!(tenant = %tenant, "Joining in-flight JWKS fetch");
            return existing.clone();
        }

        if reuse_fresh {
            if let Ok(entries) = self.inner.entries.try_read() {
                if let Some(entry) = entries
                    .get(tenant)
                    .filter(|entry| entry.is_fresh(&self.inner.policy))
                {
                    let key_set = Arc::clone(&entry.key_set);
                    return future::ready(Ok(key_set)).boxed().shared();
                }
            }
        }

        let inner = Arc::clone(&self.inner);
        let task_tenant = tenant.clone();
        let handle = tokio::spawn(async move { inner.fetch_and_store(task_tenant).await });

        let fetch = async move {
            handle.await.unwrap_or_else(|e| {
                Err(AuthError::NetworkError(format!("JWKS fetch task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        in_flight.insert(tenant.clone(), fetch.clone());
        fetch
    }

    async fn serve_stale(
        &self,
        tenant: &TenantId,
        err: AuthError,
    ) -> Result<Arc<JwkSet>, AuthError> {
        let entries = self.inner.entries.read().await;
        match entries.get(tenant) {
            Some(entry) if entry.is_within_grace(&self.inner.policy) => {
                warn!(
                    tenant = %tenant,
                    age_secs = entry.fetched_at.elapsed().as_secs(),
                    error = %err,
                    "JWKS refresh failed, serving stale key set"
                );
                Ok(Arc::clone(&entry.key_set))
            }
            _ => {
                warn!(tenant = %tenant, error = %err, "JWKS unavailable and no usable cached key set");
                Err(err)
            }
        }
    }
}

impl Inner {
    /// Body of the spawned fetch task.
    async fn fetch_and_store(&self, tenant: TenantId) -> FetchResult {
        let result = match tokio::time::timeout(
            self.policy.fetch_timeout,
            self.fetcher.fetch(&tenant),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::NetworkError(format!(
                "JWKS fetch timed out after {}ms",
                self.policy.fetch_timeout.as_millis()
            ))),
        };

        let result = match result {
            Ok(key_set) => {
                let key_set = Arc::new(key_set);
                self.entries.write().await.insert(
                    tenant.clone(),
                    CacheEntry {
                        key_set: Arc::clone(&key_set),
                        fetched_at: Instant::now(),
                        invalidated: false,
                    },
                );
                if let Ok(mut failures) = self.failures.lock() {
                    failures.remove(&tenant);
                }
                info!(tenant = %tenant, key_count = key_set.len(), "JWKS cache refreshed");
                Ok(key_set)
            }
            Err(err) => {
                warn!(tenant = %tenant, error = %err, "JWKS fetch failed");
                if let Ok(mut failures) = self.failures.lock() {
                    failures.insert(tenant.clone(), Instant::now());
                }
                Err(err)
            }
        };

        // Stored before removal, so a caller arriving in between sees the new entry.
        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.remove(&tenant);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&tenant);
            }
        }

        result
    }
}
