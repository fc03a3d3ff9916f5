// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authenticated encryption of secret payloads.
//!
//! [`CryptoBox`] seals opaque byte payloads under a single AES-256-GCM key
//! derived from operator-supplied key material. The persisted blob layout is
//! `nonce(12) ∥ tag(16) ∥ ciphertext` and is a de facto on-disk format: it
//! must stay bit-exact for existing ciphertext to remain decryptable.
//!
//! The box is constructed once at startup and injected by reference into the
//! secret store; it holds no mutable state beyond randomness consumption.

pub mod error;

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub use error::{CryptoError, CryptoResult};

/// Size of the derived AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Authenticated symmetric encryption under one derived key.
pub struct CryptoBox {
	cipher: Aes256Gcm,
	fingerprint: String,
}

impl std::fmt::Debug for CryptoBox {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		// Never expose key bytes through Debug.
		f.debug_struct("CryptoBox")
			.field("fingerprint", &self.fingerprint)
			.finish()
	}
}

impl CryptoBox {
	/// Build a box from operator-supplied key material of any length.
	///
	/// The AES-256 key is SHA-256 of the UTF-8 material, so operators may
	/// supply keys of arbitrary length and format.
	///
	/// # Errors
	/// `CryptoError::KeyNotConfigured` when the material is empty or
	/// whitespace-only.
	pub fn new(key_material: &str) -> CryptoResult<Self> {
		if key_material.trim().is_empty() {
			return Err(CryptoError::KeyNotConfigured);
		}

		let mut key_bytes = Zeroizing::new([0u8; KEY_SIZE]);
		key_bytes.copy_from_slice(&Sha256::digest(key_material.as_bytes()));
		let key = Key::<Aes256Gcm>::from_slice(&key_bytes[..]);
		let cipher = Aes256Gcm::new(key);

		// Hash the derived key again before truncating; the fingerprint
		// reaches logs and must carry no bits of the live key.
		let fingerprint = hex::encode(&Sha256::digest(&key_bytes[..])[..4]);

		Ok(Self {
			cipher,
			fingerprint,
		})
	}

	/// Build a box from an environment variable.
	///
	/// Called once during startup validation; an unset or empty variable is
	/// the same `KeyNotConfigured` error a runtime caller would see.
	pub fn from_env(var: &str) -> CryptoResult<Self> {
		let material = std::env::var(var).map_err(|_| CryptoError::KeyNotConfigured)?;
		let boxed = Self::new(&material)?;
		tracing::debug!(key_fingerprint = %boxed.fingerprint, "encryption key loaded");
		Ok(boxed)
	}

	/// Short key digest suitable for logging without exposing material.
	pub fn key_fingerprint(&self) -> &str {
		&self.fingerprint
	}

	/// Seal a plaintext payload.
	///
	/// Generates a fresh 96-bit nonce per call and binds no associated data.
	/// The returned blob is `nonce ∥ tag ∥ ciphertext`.
	pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
		let mut nonce_bytes = [0u8; NONCE_SIZE];
		OsRng.fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);

		// aes-gcm appends the tag to the ciphertext; rearrange into the
		// persisted nonce/tag/ciphertext layout.
		let sealed = self
			.cipher
			.encrypt(nonce, plaintext)
			.map_err(|e| CryptoError::Encryption(e.to_string()))?;
		let split = sealed.len() - TAG_SIZE;

		let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
		blob.extend_from_slice(&nonce_bytes);
		blob.extend_from_slice(&sealed[split..]);
		blob.extend_from_slice(&sealed[..split]);
		Ok(blob)
	}

	/// Open a sealed blob, verifying the authentication tag.
	///
	/// # Errors
	/// - `InvalidFormat` when the blob is too short to hold nonce and tag
	/// - `AuthenticationFailed` on any tag mismatch; no partial output
	pub fn decrypt(&self, blob: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
		if blob.len() < NONCE_SIZE + TAG_SIZE {
			return Err(CryptoError::InvalidFormat(format!(
				"blob of {} bytes cannot hold nonce and tag",
				blob.len()
			)));
		}

		let nonce = Nonce::from_slice(&blob[..NONCE_SIZE]);
		let tag = &blob[NONCE_SIZE..NONCE_SIZE + TAG_SIZE];
		let ciphertext = &blob[NONCE_SIZE + TAG_SIZE..];

		let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
		sealed.extend_from_slice(ciphertext);
		sealed.extend_from_slice(tag);

		let plaintext = self
			.cipher
			.decrypt(nonce, sealed.as_slice())
			.map_err(|_| CryptoError::AuthenticationFailed)?;
		Ok(Zeroizing::new(plaintext))
	}
}
