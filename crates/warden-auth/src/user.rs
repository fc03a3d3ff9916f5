// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User model, credential hashing and identity validation.
//!
//! This module provides:
//! - [`User`] - authentication principal with an active flag
//! - [`hash_password`] / [`verify_password`] - Argon2id credential handling
//! - [`validate_username`] / [`validate_email`] - security-filtered identity
//!   checks, including the reserved-username list

use argon2::password_hash::{
	rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::argon2_config::argon2_instance;
use crate::error::AuthError;
use crate::types::UserId;

/// Reserved usernames that cannot be registered.
/// These are reserved for system use or could cause confusion.
pub const RESERVED_USERNAMES: &[&str] = &[
	"root",
	"admin",
	"administrator",
	"sudo",
	"system",
	"sysadmin",
	"security",
	"support",
	"help",
	"info",
	"noreply",
	"no-reply",
	"warden",
	"vault",
	"secrets",
	"api",
	"auth",
	"login",
	"logout",
	"signup",
	"register",
	"settings",
	"account",
	"audit",
	"anonymous",
	"nobody",
];

/// An authentication principal.
///
/// The password is never held in plaintext; `password_hash` is a PHC-format
/// Argon2id string. Inactive users fail authentication and are excluded from
/// sharing-target listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub username: String,
	pub email: String,
	#[serde(skip_serializing)]
	pub password_hash: String,
	pub active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(password.as_bytes(), &salt)
		.map(|h| h.to_string())
		.map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against a stored PHC-format hash.
///
/// A malformed stored hash verifies as `false` rather than erroring, so a
/// corrupted row cannot be used to probe hashing internals.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
	match PasswordHash::new(stored_hash) {
		Ok(parsed) => argon2_instance()
			.verify_password(password.as_bytes(), &parsed)
			.is_ok(),
		Err(_) => false,
	}
}

/// Validate a username: 3-50 chars of `[a-z0-9_-]` after lowercasing,
/// not on the reserved list.
pub fn validate_username(username: &str) -> Result<String, AuthError> {
	let normalized = username.trim().to_lowercase();
	if normalized.len() < 3 || normalized.len() > 50 {
		return Err(AuthError::InvalidUsername(
			"must be 3-50 characters".to_string(),
		));
	}
	if !normalized
		.chars()
		.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
	{
		return Err(AuthError::InvalidUsername(
			"only lowercase letters, digits, '_' and '-' are allowed".to_string(),
		));
	}
	if RESERVED_USERNAMES.contains(&normalized.as_str()) {
		return Err(AuthError::InvalidUsername(format!(
			"'{normalized}' is reserved"
		)));
	}
	Ok(normalized)
}

/// Pragmatic email shape check: one `@`, non-empty local part, domain with a
/// dot, no whitespace or control characters. Deliverability is not our
/// problem here.
pub fn validate_email(email: &str) -> Result<String, AuthError> {
	let normalized = email.trim().to_lowercase();
	if normalized.len() > 254 || normalized.chars().any(|c| c.is_whitespace() || c.is_control()) {
		return Err(AuthError::InvalidEmail("malformed address".to_string()));
	}
	let mut parts = normalized.splitn(2, '@');
	let local = parts.next().unwrap_or_default();
	let domain = parts.next().unwrap_or_default();
	if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains("..") {
		return Err(AuthError::InvalidEmail("malformed address".to_string()));
	}
	Ok(normalized)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn password_roundtrip() {
		let hash = hash_password("correct horse battery staple").unwrap();
		assert!(verify_password("correct horse battery staple", &hash));
		assert!(!verify_password("wrong", &hash));
	}

	#[test]
	fn hash_is_salted() {
		let h1 = hash_password("pw").unwrap();
		let h2 = hash_password("pw").unwrap();
		assert_ne!(h1, h2);
	}

	#[test]
	fn malformed_stored_hash_fails_closed() {
		assert!(!verify_password("pw", "not-a-phc-string"));
		assert!(!verify_password("pw", ""));
	}

	#[test]
	fn usernames_are_normalized_and_filtered() {
		assert_eq!(validate_username("Alice").unwrap(), "alice");
		assert_eq!(validate_username("  bob_2  ").unwrap(), "bob_2");
		assert!(validate_username("ab").is_err());
		assert!(validate_username("has space").is_err());
		assert!(validate_username("semi;colon").is_err());
		assert!(validate_username("root").is_err());
		assert!(validate_username("Admin").is_err());
	}

	#[test]
	fn email_validation() {
		assert_eq!(validate_email("A@example.com").unwrap(), "a@example.com");
		assert!(validate_email("missing-at.example.com").is_err());
		assert!(validate_email("@example.com").is_err());
		assert!(validate_email("a@nodot").is_err());
		assert!(validate_email("a@dou..ble.com").is_err());
		assert!(validate_email("a b@example.com").is_err());
	}
}
