// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity, role and path-pattern authorization primitives for Warden.
//!
//! This crate holds everything the access-decision layer needs without
//! touching persistence:
//!
//! - **ID newtypes**: [`UserId`], [`RoleId`], [`ShareId`], [`SecretId`]
//! - **Closed enums**: [`Permission`], [`SecretType`], [`PermissionLevel`]
//! - **Path patterns**: [`PathPattern`] compiled once at role creation
//! - **Pure decision engine**: [`is_allowed`] over subject/resource attributes
//! - **User model**: validation, reserved usernames, Argon2id hashing

mod argon2_config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod role;
pub mod types;
pub mod user;

pub use engine::{is_allowed, ResourceAttrs, RoleAttr, ShareAttr, SubjectAttrs};
pub use error::{AuthError, AuthResult};
pub use pattern::PathPattern;
pub use role::{Role, RoleSpec};
pub use types::{Permission, PermissionLevel, RoleId, SecretId, SecretType, ShareId, UserId};
pub use user::{
	hash_password, validate_email, validate_username, verify_password, User, RESERVED_USERNAMES,
};
