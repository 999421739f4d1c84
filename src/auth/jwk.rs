// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON Web Keys and their conversion into RSA verification material.
//!
//! A [`JwkSet`] is parsed and validated once, when it arrives from the
//! identity provider. Keys with a broken shape reject the whole set so a bad
//! response never reaches the cache. Numeric validation of `n`/`e` happens in
//! [`convert`], which is pure and only ever produces public material: a
//! `jsonwebtoken::DecodingKey` built from the raw big-endian components.

use std::fmt;

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;

use super::error::AuthError;

/// Smallest accepted RSA modulus, in bits.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// Largest accepted RSA modulus, in bits.
pub const MAX_RSA_MODULUS_BITS: usize = 8192;

/// Largest public exponent accepted by the verifier (2^33 - 1).
const MAX_RSA_EXPONENT: u64 = (1 << 33) - 1;

/// Azure AD directory (tenant) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        TenantId(value.to_string())
    }
}

/// Wire shape of a JWK; every field optional so we can report what is missing.
#[derive(Deserialize)]
struct RawJwk {
    kty: Option<String>,
    kid: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// One validated entry of a key set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawJwk")]
pub struct Jwk {
    kty: String,
    kid: String,
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl TryFrom<RawJwk> for Jwk {
    type Error = String;

    fn try_from(raw: RawJwk) -> Result<Self, Self::Error> {
        let kty = raw
            .kty
            .filter(|k| !k.is_empty())
            .ok_or_else(|| "JWK is missing 'kty'".to_string())?;
        let kid = raw
            .kid
            .filter(|k| !k.is_empty())
            .ok_or_else(|| "JWK is missing 'kid'".to_string())?;

        Ok(Jwk {
            kty,
            kid,
            key_use: raw.key_use,
            n: raw.n,
            e: raw.e,
        })
    }
}

impl Jwk {
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

#[derive(Deserialize)]
struct RawJwkSet {
    keys: Vec<Jwk>,
}

/// A tenant's published key set, fetched and replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwkSet {
    keys: Vec<Jwk>,
}

impl JwkSet {
    /// Parse a JWKS response body.
    ///
    /// Fails with [`AuthError::ParseError`] if the body is not JSON, lacks a
    /// `keys` array, holds a malformed entry or holds no keys at all.
    pub fn from_slice(body: &[u8]) -> Result<Self, AuthError> {
        let raw: RawJwkSet =
            serde_json::from_slice(body).map_err(|e| AuthError::ParseError(e.to_string()))?;

        if raw.keys.is_empty() {
            return Err(AuthError::ParseError(
                "JWKS response contains no keys".to_string(),
            ));
        }

        Ok(Self { keys: raw.keys })
    }

    /// Find the key with the given key ID.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// RSA public key derived from a JWK. Immutable once built.
#[derive(Clone)]
pub struct PublicKeyMaterial {
    kid: String,
    /// Big-endian modulus with leading zero bytes stripped.
    modulus: Vec<u8>,
    /// Big-endian exponent with leading zero bytes stripped.
    exponent: Vec<u8>,
    decoding_key: DecodingKey,
}

impl PartialEq for PublicKeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.kid == other.kid && self.modulus == other.modulus && self.exponent == other.exponent
    }
}

impl Eq for PublicKeyMaterial {}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKeyMaterial")
            .field("kid", &self.kid)
            .field("modulus_bits", &self.modulus_bits())
            .finish()
    }
}

impl PublicKeyMaterial {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn modulus_bits(&self) -> usize {
        bit_length(&self.modulus)
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Convert a JWK into RSA public-key material.
///
/// `n` and `e` are base64url (padding tolerated) unsigned big-endian integers.
pub fn convert(jwk: &Jwk) -> Result<PublicKeyMaterial, AuthError> {
    if jwk.kty != "RSA" {
        return Err(AuthError::UnsupportedKeyType(jwk.kty.clone()));
    }

    if let Some(key_use) = jwk.key_use.as_deref() {
        if key_use != "sig" {
            return Err(AuthError::KeyConversionError(format!(
                "key '{}' has use '{key_use}', expected 'sig'",
                jwk.kid
            )));
        }
    }

    let n = jwk.n.as_deref().ok_or_else(|| {
        AuthError::KeyConversionError(format!("key '{}' is missing 'n'", jwk.kid))
    })?;
    let e = jwk.e.as_deref().ok_or_else(|| {
        AuthError::KeyConversionError(format!("key '{}' is missing 'e'", jwk.kid))
    })?;

    let modulus = decode_unsigned(n).map_err(|msg| {
        AuthError::KeyConversionError(format!("key '{}' modulus: {msg}", jwk.kid))
    })?;
    let exponent = decode_unsigned(e).map_err(|msg| {
        AuthError::KeyConversionError(format!("key '{}' exponent: {msg}", jwk.kid))
    })?;

    let bits = bit_length(&modulus);
    if !(MIN_RSA_MODULUS_BITS..=MAX_RSA_MODULUS_BITS).contains(&bits) {
        return Err(AuthError::KeyConversionError(format!(
            "key '{}' modulus is {bits} bits, expected {MIN_RSA_MODULUS_BITS}..={MAX_RSA_MODULUS_BITS}",
            jwk.kid
        )));
    }

    let e_value = exponent
        .iter()
        .try_fold(0u64, |acc, b| acc.checked_mul(256).map(|v| v | u64::from(*b)))
        .filter(|v| *v <= MAX_RSA_EXPONENT);
    match e_value {
        Some(v) if v >= 3 && v % 2 == 1 => {}
        _ => {
            return Err(AuthError::KeyConversionError(format!(
                "key '{}' has an unusable public exponent",
                jwk.kid
            )))
        }
    }

    let decoding_key = DecodingKey::from_rsa_raw_components(&modulus, &exponent);

    Ok(PublicKeyMaterial {
        kid: jwk.kid.clone(),
        modulus,
        exponent,
        decoding_key,
    })
}

/// Decode a base64url unsigned big-endian integer and strip leading zeros.
///
/// Zero (or an empty encoding) is rejected: the value must be positive.
fn decode_unsigned(value: &str) -> Result<Vec<u8>, String> {
    let bytes = Base64UrlUnpadded::decode_vec(value.trim_end_matches('='))
        .map_err(|e| format!("invalid base64url: {e}"))?;

    let first_nonzero = bytes
        .iter()
        .position(|b| *b != 0)
        .ok_or_else(|| "value is not a positive integer".to_string())?;

    Ok(bytes.get(first_nonzero..).unwrap_or_default().to_vec())
}

fn bit_length(be_bytes: &[u8]) -> usize {
    match be_bytes.first() {
        Some(first) => be_bytes.len() * 8 - first.leading_zeros() as usize,
        None => 0,
    }
}
