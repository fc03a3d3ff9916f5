// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error taxonomy for the secrets service layer.
//!
//! `NotFound` covers keys that do not exist or are deleted; `Unauthorized`
//! covers keys that exist but the principal may not touch. Decryption
//! failures surface distinctly so an operator can tell a wrong key from a
//! missing secret.

use thiserror::Error;

use warden_audit::AuditError;
use warden_auth::AuthError;
use warden_crypto::CryptoError;
use warden_db::DbError;

pub type Result<T> = std::result::Result<T, SecretsError>;

#[derive(Debug, Error)]
pub enum SecretsError {
	#[error("invalid secret key: {0}")]
	InvalidKey(String),

	#[error("secret value of {actual} bytes exceeds the {max} byte limit")]
	ValueTooLarge { actual: usize, max: usize },

	#[error("metadata of {actual} bytes exceeds the {max} byte limit")]
	MetadataTooLarge { actual: usize, max: usize },

	#[error("not authorized")]
	Unauthorized,

	#[error("secret not found")]
	NotFound,

	#[error("user not found: {0}")]
	UserNotFound(String),

	#[error("username or email already registered")]
	AlreadyRegistered,

	#[error("invalid credentials")]
	InvalidCredentials,

	#[error("password must be 8-128 characters")]
	InvalidPassword,

	#[error("cannot share a secret with yourself")]
	CannotShareWithSelf,

	#[error("no active share for that secret and user")]
	ShareNotFound,

	#[error("secret is not shared with this user")]
	NotShared,

	#[error("sharing grant has expired")]
	ShareExpired,

	#[error("role not found")]
	RoleNotFound,

	#[error("decryption failed")]
	DecryptionFailed(#[source] CryptoError),

	#[error(transparent)]
	Validation(#[from] AuthError),

	#[error(transparent)]
	Crypto(#[from] CryptoError),

	#[error("metadata serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error(transparent)]
	Database(#[from] DbError),

	#[error(transparent)]
	Audit(#[from] AuditError),
}

impl SecretsError {
	/// Stable snake_case tag for audit metadata on failed operations.
	pub fn kind(&self) -> &'static str {
		match self {
			SecretsError::InvalidKey(_) => "invalid_key",
			SecretsError::ValueTooLarge { .. } => "value_too_large",
			SecretsError::MetadataTooLarge { .. } => "metadata_too_large",
			SecretsError::Unauthorized => "unauthorized",
			SecretsError::NotFound => "not_found",
			SecretsError::UserNotFound(_) => "user_not_found",
			SecretsError::AlreadyRegistered => "already_registered",
			SecretsError::InvalidCredentials => "invalid_credentials",
			SecretsError::InvalidPassword => "invalid_password",
			SecretsError::CannotShareWithSelf => "cannot_share_with_self",
			SecretsError::ShareNotFound => "share_not_found",
			SecretsError::NotShared => "not_shared",
			SecretsError::ShareExpired => "share_expired",
			SecretsError::RoleNotFound => "role_not_found",
			SecretsError::DecryptionFailed(_) => "decryption_failed",
			SecretsError::Validation(_) => "validation",
			SecretsError::Crypto(_) => "crypto",
			SecretsError::Serialization(_) => "serialization",
			SecretsError::Database(_) => "database",
			SecretsError::Audit(_) => "audit",
		}
	}
}
