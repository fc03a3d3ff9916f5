// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Input validation for secret keys, values and metadata.
//!
//! Keys double as path segments for pattern-scoped roles, so the charset is
//! deliberately narrow and traversal-looking sequences are rejected outright.
//! Metadata values are sanitized rather than rejected; stripping control
//! characters and angle brackets keeps stored metadata inert wherever it is
//! later rendered.

use serde_json::{Map, Value};

use crate::error::{Result, SecretsError};

pub const MAX_KEY_LEN: usize = 255;
pub const MAX_VALUE_BYTES: usize = 1024 * 1024;
pub const MAX_METADATA_BYTES: usize = 10 * 1024;

/// Validate a secret key: 1-255 chars of `[A-Za-z0-9/_.-]`, no `..` or `//`.
pub fn validate_key(key: &str) -> Result<()> {
	if key.is_empty() || key.len() > MAX_KEY_LEN {
		return Err(SecretsError::InvalidKey(format!(
			"must be 1-{MAX_KEY_LEN} characters"
		)));
	}
	if !key
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-'))
	{
		return Err(SecretsError::InvalidKey(
			"only letters, digits, '/', '_', '.' and '-' are allowed".to_string(),
		));
	}
	if key.contains("..") || key.contains("//") {
		return Err(SecretsError::InvalidKey(
			"'..' and '//' are not allowed".to_string(),
		));
	}
	Ok(())
}

pub fn validate_value(value: &[u8]) -> Result<()> {
	if value.len() > MAX_VALUE_BYTES {
		return Err(SecretsError::ValueTooLarge {
			actual: value.len(),
			max: MAX_VALUE_BYTES,
		});
	}
	Ok(())
}

/// Sanitize and serialize a metadata map.
///
/// String values lose control characters and angle brackets, recursively
/// through nested arrays and objects. The size limit applies to the
/// serialized form, after sanitization.
pub fn sanitize_metadata(metadata: &Map<String, Value>) -> Result<String> {
	let cleaned: Map<String, Value> = metadata
		.iter()
		.map(|(k, v)| (sanitize_text(k), sanitize_value(v)))
		.collect();

	let serialized = serde_json::to_string(&Value::Object(cleaned))?;
	if serialized.len() > MAX_METADATA_BYTES {
		return Err(SecretsError::MetadataTooLarge {
			actual: serialized.len(),
			max: MAX_METADATA_BYTES,
		});
	}
	Ok(serialized)
}

fn sanitize_value(value: &Value) -> Value {
	match value {
		Value::String(s) => Value::String(sanitize_text(s)),
		Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
		Value::Object(map) => Value::Object(
			map.iter()
				.map(|(k, v)| (sanitize_text(k), sanitize_value(v)))
				.collect(),
		),
		other => other.clone(),
	}
}

fn sanitize_text(s: &str) -> String {
	s.chars()
		.filter(|c| !c.is_control() && *c != '<' && *c != '>')
		.collect()
}
