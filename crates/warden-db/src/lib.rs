// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for Warden.
//!
//! Repositories over a shared [`sqlx::SqlitePool`]:
//!
//! - [`secret::SecretRepository`] - versioned ciphertext rows with central
//!   soft-delete filtering
//! - [`role::RoleRepository`] - role grants per user
//! - [`share::ShareRepository`] - sharing grants with reactivating upsert
//! - [`user::UserRepository`] - principals
//!
//! Conventions: UUIDs as TEXT, timestamps as RFC 3339 TEXT, JSON as TEXT,
//! ciphertext as BLOB. Every query over secrets excludes soft-deleted rows
//! here, in the repository, so no call site can forget the filter.

pub mod error;
pub mod pool;
pub mod role;
pub mod secret;
pub mod share;
pub mod testing;
pub mod user;

pub use error::{DbError, Result};
pub use pool::create_pool;
pub use role::RoleRepository;
pub use secret::{SecretRecord, SecretRepository};
pub use share::{ShareRecord, ShareRepository};
pub use user::UserRepository;
