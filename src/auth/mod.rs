// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Authentication Module
//!
//! Two trust domains behind one authorization boundary:
//!
//! - **Local**: access/refresh token pairs issued by this service (HS256,
//!   independent secrets), delivered as `HttpOnly` cookies, tracked by a
//!   volatile session cache and a durable refresh record.
//! - **Remote**: bearer tokens issued by an external identity provider,
//!   verified against its published JWKS (asymmetric algorithms only).
//!
//! [`core::AuthCore`] holds the single decision state machine; the HTTP
//! guard and the realtime gate are thin adapters over it.

pub mod core;
pub mod error;
pub mod guard;
pub mod jwks;
pub mod token;

pub use self::core::{AuthCore, AuthSession, Credentials, TokenPair, TrustDomain};
pub use error::AuthError;
pub use guard::AuthContext;
pub use jwks::{HttpJwksFetch, JwksResolver};
pub use token::TokenCodec;
