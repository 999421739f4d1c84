// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolves a token's `kid` to RSA public-key material.
//!
//! A `kid` missing from the cached key set may mean the provider rotated its
//! keys, so the tenant's entry is invalidated and the lookup retried exactly
//! once. Converted material is kept in a small LRU, tagged with the key set it
//! came from: once the cache publishes a new set, material from the old one is
//! never handed out again.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::jwk::{convert, JwkSet, PublicKeyMaterial, TenantId};
use super::jwks::JwksCache;

/// Default number of converted keys kept in memory.
pub const DEFAULT_MATERIAL_CAPACITY: usize = 64;

/// Converted key plus the key set that produced it.
struct MaterialEntry {
    key_set: Arc<JwkSet>,
    material: Arc<PublicKeyMaterial>,
}

pub struct KeyResolver {
    jwks: JwksCache,
    materials: Mutex<LruCache<(TenantId, String), MaterialEntry>>,
}

impl KeyResolver {
    pub fn new(jwks: JwksCache) -> Self {
        Self::with_capacity(jwks, DEFAULT_MATERIAL_CAPACITY)
    }

    pub fn with_capacity(jwks: JwksCache, capacity: usize) -> Self {
        Self {
            jwks,
            materials: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Resolve `kid` for `tenant` to verification material.
    pub async fn resolve(
        &self,
        tenant: &TenantId,
        kid: &str,
    ) -> Result<Arc<PublicKeyMaterial>, AuthError> {
        let key_set = self.jwks.get(tenant).await?;
        if let Some(material) = self.cached_material(tenant, kid, &key_set) {
            return Ok(material);
        }

        let (key_set, jwk) = match key_set.find(kid) {
            Some(jwk) => (Arc::clone(&key_set), jwk.clone()),
            None => {
                info!(tenant = %tenant, kid = %kid, "Key not in cached JWKS, refetching once");
                self.jwks.invalidate(tenant).await;

                let key_set = self.jwks.get(tenant).await?;
                match key_set.find(kid) {
                    Some(jwk) => {
                        let jwk = jwk.clone();
                        (key_set, jwk)
                    }
                    None => {
                        warn!(tenant = %tenant, kid = %kid, "Key not found in JWKS after refetch");
                        return Err(AuthError::KeyNotFound(kid.to_string()));
                    }
                }
            }
        };

        let material = Arc::new(convert(&jwk)?);
        self.store_material(tenant, kid, key_set, Arc::clone(&material));
        Ok(material)
    }

    fn cached_material(
        &self,
        tenant: &TenantId,
        kid: &str,
        current: &Arc<JwkSet>,
    ) -> Option<Arc<PublicKeyMaterial>> {
        let key = (tenant.clone(), kid.to_string());
        let mut materials = self.materials.lock().ok()?;
        if let Some(entry) = materials.get(&key) {
            if Arc::ptr_eq(&entry.key_set, current) {
                debug!(tenant = %tenant, kid = %kid, "Key material cache hit");
                return Some(Arc::clone(&entry.material));
            }
            // Superseded key set
            materials.pop(&key);
        }
        None
    }

    fn store_material(
        &self,
        tenant: &TenantId,
        kid: &str,
        key_set: Arc<JwkSet>,
        material: Arc<PublicKeyMaterial>,
    ) {
        if let Ok(mut materials) = self.materials.lock() {
            materials.put(
                (tenant.clone(), kid.to_string()),
                MaterialEntry { key_set, material },
            );
        }
    }
}
