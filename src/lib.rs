// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Business Card Text Extraction Service
//!
//! An HTTP service that extracts contact details from business card images
//! for callers holding an Azure AD access token.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer token verification against the tenant's JWKS
//! - `extraction` - Card image to structured contact details
//! - `jwks_refresher` - Background key set refresh

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod extraction;
pub mod jwks_refresher;
pub mod state;

#[cfg(test)]
mod testutil;
