// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Azure AD bearer-token verification for the card extraction API.
//!
//! ## Auth Flow
//!
//! 1. The client obtains an access token for `api://{client_id}` from Azure AD
//! 2. The client sends `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - Reads the unverified header (`alg`, `kid`)
//!    - Resolves `kid` against the tenant's JWKS (cached, single-flight,
//!      refetched once on an unknown `kid`)
//!    - Verifies the RSA signature, then `exp`, `nbf`, `iss`, `aud`
//!    - Attaches a [`VerifiedIdentity`] to the request
//!
//! ## Security
//!
//! - Only the configured algorithm is accepted (`none` and HMAC never are)
//! - Claims are never read before the signature is verified
//! - Stale keys are served for a bounded grace period only
//! - Clock skew tolerance defaults to 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwk;
pub mod jwks;
pub mod middleware;
pub mod resolver;
pub mod validator;

pub use claims::{Audience, Claims, VerifiedIdentity};
pub use error::{AuthError, ErrorCategory};
pub use extractor::Auth;
pub use jwk::{Jwk, JwkSet, PublicKeyMaterial, TenantId};
pub use jwks::{CachePolicy, CacheStatus, HttpJwksFetcher, JwksCache, JwksFetcher};
pub use middleware::{bearer_token, require_bearer, AuthenticationGate};
pub use resolver::KeyResolver;
pub use validator::{SigningAlgorithm, TokenValidator, ValidationSettings};
