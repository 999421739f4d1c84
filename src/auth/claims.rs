// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified token claims and the identity handed to downstream handlers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// True if `expected` equals the audience or is one of its members.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims of an Azure AD access token.
///
/// Only ever constructed from a payload whose signature has been verified.
/// Claims this service does not interpret are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer (`https://sts.windows.net/{tenant}/`)
    pub iss: String,

    /// Audience (`api://{client_id}`)
    pub aud: Audience,

    /// Expiration timestamp
    pub exp: i64,

    /// Not before timestamp (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Subject
    pub sub: String,

    /// Display name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Remaining claims (`iat`, `tid`, `oid`, `scp`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identity attached to a request after successful verification.
///
/// The raw token is kept for downstream calls that need to forward it, and
/// is redacted from `Debug` output.
#[derive(Clone)]
pub struct VerifiedIdentity {
    claims: Arc<Claims>,
    token: Arc<str>,
}

impl VerifiedIdentity {
    pub fn new(claims: Claims, token: &str) -> Self {
        Self {
            claims: Arc::new(claims),
            token: Arc::from(token),
        }
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn raw_token(&self) -> &str {
        &self.token
    }

    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    pub fn name(&self) -> Option<&str> {
        self.claims.name.as_deref()
    }
}

impl fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("sub", &self.claims.sub)
            .field("iss", &self.claims.iss)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
