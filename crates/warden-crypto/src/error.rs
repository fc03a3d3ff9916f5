// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Error, Debug)]
pub enum CryptoError {
	/// No key material was supplied. Surfaced at startup validation and,
	/// should a call race a reconfiguration, per call.
	#[error("encryption key is not configured")]
	KeyNotConfigured,

	/// Blob too short to contain the nonce and tag prefix.
	#[error("ciphertext blob is malformed: {0}")]
	InvalidFormat(String),

	/// Tag verification failed: corruption, tampering or wrong key.
	/// Deliberately carries no detail beyond the fact of failure.
	#[error("authentication failed during decryption")]
	AuthenticationFailed,

	#[error("encryption failed: {0}")]
	Encryption(String),
}
