// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core event types for audit logging.
//!
//! This module provides the foundational types for the audit system:
//!
//! - [`AuditAction`]: closed enumeration of auditable actions
//! - [`AuditLogEntry`]: one immutable audit record
//! - [`AuditFilter`]: conjunctive optional query filters
//! - [`AuditStats`]: aggregate view over a time range

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_auth::UserId;

use crate::error::AuditError;

/// Actions that can be recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
	// Secret lifecycle
	Create,
	Read,
	Update,
	Delete,
	List,

	// Role management
	AssignRole,
	UpdateRole,
	RevokeRole,

	// Authentication
	Authenticate,
	FailedAuthentication,

	// Sharing grants
	SecretShare,
	SecretRevoke,

	// System-attributed actions
	System,
	PurgeLogs,
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditAction::Create => "create",
			AuditAction::Read => "read",
			AuditAction::Update => "update",
			AuditAction::Delete => "delete",
			AuditAction::List => "list",
			AuditAction::AssignRole => "assign_role",
			AuditAction::UpdateRole => "update_role",
			AuditAction::RevokeRole => "revoke_role",
			AuditAction::Authenticate => "authenticate",
			AuditAction::FailedAuthentication => "failed_authentication",
			AuditAction::SecretShare => "secret_share",
			AuditAction::SecretRevoke => "secret_revoke",
			AuditAction::System => "system",
			AuditAction::PurgeLogs => "purge_logs",
		};
		write!(f, "{s}")
	}
}

impl FromStr for AuditAction {
	type Err = AuditError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"create" => Ok(AuditAction::Create),
			"read" => Ok(AuditAction::Read),
			"update" => Ok(AuditAction::Update),
			"delete" => Ok(AuditAction::Delete),
			"list" => Ok(AuditAction::List),
			"assign_role" => Ok(AuditAction::AssignRole),
			"update_role" => Ok(AuditAction::UpdateRole),
			"revoke_role" => Ok(AuditAction::RevokeRole),
			"authenticate" => Ok(AuditAction::Authenticate),
			"failed_authentication" => Ok(AuditAction::FailedAuthentication),
			"secret_share" => Ok(AuditAction::SecretShare),
			"secret_revoke" => Ok(AuditAction::SecretRevoke),
			"system" => Ok(AuditAction::System),
			"purge_logs" => Ok(AuditAction::PurgeLogs),
			other => Err(AuditError::UnknownAction(other.to_string())),
		}
	}
}

/// One immutable audit record.
///
/// `user_id = None` denotes a system-initiated action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub user_id: Option<UserId>,
	pub action: AuditAction,
	pub secret_key: String,
	pub timestamp: DateTime<Utc>,
	pub metadata: serde_json::Value,
}

/// Conjunctive optional filters for audit queries.
///
/// Every populated field must match; empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
	pub action: Option<AuditAction>,
	pub user_id: Option<UserId>,
	/// Exact key match.
	pub secret_key: Option<String>,
	/// Case-sensitive substring match.
	pub secret_key_contains: Option<String>,
	/// Inclusive lower bound.
	pub start_date: Option<DateTime<Utc>>,
	/// Inclusive upper bound.
	pub end_date: Option<DateTime<Utc>>,
}

/// Aggregate statistics over an optional time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
	pub total_logs: i64,
	pub actions: HashMap<AuditAction, i64>,
	/// `(secret_key, count)` ordered by count descending, top 10.
	pub top_secrets: Vec<(String, i64)>,
	/// Distinct non-null user IDs.
	pub active_users: i64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_roundtrip_through_display() {
		let all = [
			AuditAction::Create,
			AuditAction::Read,
			AuditAction::Update,
			AuditAction::Delete,
			AuditAction::List,
			AuditAction::AssignRole,
			AuditAction::UpdateRole,
			AuditAction::RevokeRole,
			AuditAction::Authenticate,
			AuditAction::FailedAuthentication,
			AuditAction::SecretShare,
			AuditAction::SecretRevoke,
			AuditAction::System,
			AuditAction::PurgeLogs,
		];
		for action in all {
			let parsed: AuditAction = action.to_string().parse().unwrap();
			assert_eq!(action, parsed);
		}
	}

	#[test]
	fn unknown_action_is_rejected() {
		assert!("reboot".parse::<AuditAction>().is_err());
	}

	#[test]
	fn serde_uses_snake_case() {
		let json = serde_json::to_string(&AuditAction::FailedAuthentication).unwrap();
		assert_eq!(json, "\"failed_authentication\"");
	}
}
