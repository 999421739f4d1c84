// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact JWS validation.
//!
//! Stages run strictly in order and the first failure aborts the rest:
//!
//! 1. split the token into three segments
//! 2. inspect the header (`alg` must be the configured algorithm)
//! 3. resolve the signing key by `kid`
//! 4. verify the signature over `header.payload`
//! 5. decode the payload and check `exp`, `nbf`, `iss`, `aud`
//!
//! Steps 4 and 5 are a single `jsonwebtoken::decode` call, which verifies the
//! signature before it deserializes any claim.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::claims::Claims;
use super::error::AuthError;
use super::jwk::TenantId;
use super::resolver::KeyResolver;

/// Largest compact token accepted before any decoding.
pub const MAX_TOKEN_BYTES: usize = 8192;

/// Default clock skew tolerance (60 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// The JWS algorithms this service knows how to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    RS256,
    RS384,
    RS512,
}

impl SigningAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
        }
    }
}

impl From<SigningAlgorithm> for Algorithm {
    fn from(value: SigningAlgorithm) -> Self {
        match value {
            SigningAlgorithm::RS256 => Algorithm::RS256,
            SigningAlgorithm::RS384 => Algorithm::RS384,
            SigningAlgorithm::RS512 => Algorithm::RS512,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(SigningAlgorithm::RS256),
            "RS384" => Ok(SigningAlgorithm::RS384),
            "RS512" => Ok(SigningAlgorithm::RS512),
            other => Err(format!(
                "unsupported algorithm '{other}' (expected RS256, RS384 or RS512)"
            )),
        }
    }
}

/// What a token must satisfy to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSettings {
    pub tenant: TenantId,
    pub algorithm: SigningAlgorithm,
    pub issuer: String,
    pub audience: String,
    pub clock_skew: Duration,
}

impl ValidationSettings {
    /// `jsonwebtoken` rules equivalent to these settings.
    fn jwt_validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm.into());
        validation.leeway = self.clock_skew.as_secs();
        // `exp` must lie strictly after `now - skew`.
        validation.reject_tokens_expiring_in_less_than = 1;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }
}

/// Validates bearer tokens against one tenant's keys.
pub struct TokenValidator {
    resolver: Arc<KeyResolver>,
    tenant: TenantId,
    algorithm: SigningAlgorithm,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(resolver: Arc<KeyResolver>, settings: ValidationSettings) -> Self {
        Self {
            resolver,
            validation: settings.jwt_validation(),
            tenant: settings.tenant,
            algorithm: settings.algorithm,
        }
    }

    /// Validate a compact token against the current time.
    #[instrument(skip_all, fields(tenant = %self.tenant))]
    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let header_b64 = split_compact(token)?;

        let header = inspect_header(token, header_b64, self.algorithm)?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("header has no 'kid'".to_string()))?;

        let material = self.resolver.resolve(&self.tenant, &kid).await?;

        let claims = decode::<Claims>(token, material.decoding_key(), &self.validation)
            .map_err(map_jwt_error)?
            .claims;

        debug!(kid = %kid, sub = %claims.sub, "Token validated successfully");
        Ok(claims)
    }
}

/// Check the size and the three non-empty segments; returns the header segment.
fn split_compact(token: &str) -> Result<&str, AuthError> {
    if token.len() > MAX_TOKEN_BYTES {
        return Err(AuthError::MalformedToken(format!(
            "token is {} bytes, limit is {MAX_TOKEN_BYTES}",
            token.len()
        )));
    }

    let mut segments = token.split('.');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok(header)
        }
        _ => Err(AuthError::MalformedToken(
            "expected three non-empty segments".to_string(),
        )),
    }
}

/// Loosest reading of a header, used to name an `alg` `jsonwebtoken` does not know.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

fn inspect_header(
    token: &str,
    header_b64: &str,
    expected: SigningAlgorithm,
) -> Result<Header, AuthError> {
    match decode_header(token) {
        Ok(header) if header.alg == Algorithm::from(expected) => Ok(header),
        Ok(header) => Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg))),
        Err(e) => Err(Base64UrlUnpadded::decode_vec(header_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<RawHeader>(&bytes).ok())
            .map(|raw| AuthError::UnsupportedAlgorithm(raw.alg))
            .unwrap_or_else(|| AuthError::MalformedToken(format!("invalid header: {e}")))),
    }
}

fn map_jwt_error(e: JwtError) -> AuthError {
    match e.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm(e.to_string()),
        _ => AuthError::MalformedToken(e.to_string()),
    }
}
