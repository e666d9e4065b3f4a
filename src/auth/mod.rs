// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer tokens for the points-gateway API.
//!
//! ## Auth Flow
//!
//! 1. The site resolves from the `Host` header ([`SiteScope`])
//! 2. The client sends `Authorization: Bearer <token>`
//! 3. The server:
//!    - Verifies the HS256 signature and expiry
//!    - Checks the token tenant (`tid`) matches the site
//!    - Finds or creates the account of (`sub`, `prv`)
//!
//! Local accounts obtain tokens from `/v1/auth/register` and
//! `/v1/auth/login`; passwords are stored as Argon2id hashes ([`password`]).
//! Site management uses a separate operator key ([`OperatorKey`]).
//!
//! ## Security
//!
//! - Clock skew tolerance is 60 seconds
//! - Unsigned tokens are accepted only by `dev` builds in development mode
//!   without `JWT_SECRET`

pub mod claims;
pub mod error;
pub mod extractor;
pub mod password;

pub use claims::{issue_token, verify_token, TokenClaims, DEFAULT_TOKEN_TTL};
pub use error::AuthError;
pub use extractor::{AdminOnly, Caller, OperatorKey, SiteScope};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
