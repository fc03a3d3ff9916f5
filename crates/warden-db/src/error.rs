// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Whether a sqlx error is a UNIQUE constraint violation.
///
/// Used by the version-insert retry loop and the share upsert.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::Database(db_err) => db_err.message().to_lowercase().contains("unique"),
		_ => false,
	}
}
