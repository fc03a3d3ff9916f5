// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
	#[error("invalid permission: {0}")]
	InvalidPermission(String),

	#[error("invalid secret type: {0}")]
	InvalidSecretType(String),

	#[error("invalid path pattern: {0}")]
	InvalidPattern(String),

	#[error("invalid role name: {0}")]
	InvalidRoleName(String),

	#[error("role has no permissions")]
	EmptyPermissions,

	#[error("invalid username: {0}")]
	InvalidUsername(String),

	#[error("invalid email: {0}")]
	InvalidEmail(String),

	#[error("password hashing failed: {0}")]
	Hash(String),
}
