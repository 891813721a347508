// SPDX-License-Identifier: AGPL-3.0-or-later

//! authgate — dual trust-domain authentication and session service.
//!
//! Authenticates HTTP and WebSocket clients against two identity sources:
//! locally-issued access/refresh token pairs (password login) and tokens
//! from an external identity provider verified via its JWKS. Session state
//! is a volatile access-token cache plus a durable refresh record; both
//! transports share one decision core.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, JWKS resolution, decision core, HTTP guard
//! - `realtime` - WebSocket gate and live connection registry
//! - `storage` - Session cache (lru), auth records and users (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod state;
pub mod storage;
