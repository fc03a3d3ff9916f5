// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Warden's service layer: encrypted versioned secrets, role- and
//! sharing-based authorization, account handling, and a complete audit
//! record of every operation.
//!
//! Composition is by construction: build the repositories from one
//! `SqlitePool`, a [`CryptoBox`](warden_crypto::CryptoBox) from operator key
//! material, a [`SqliteAuditTrail`](warden_audit::SqliteAuditTrail), then
//! wire [`AuthorizationEngine`], [`SecretStore`], [`SharingManager`] and
//! [`AccountManager`] on top. All of them are cheap to construct and safe to
//! share behind `Arc`.

pub mod accounts;
pub mod authz;
pub mod error;
pub mod sharing;
pub mod store;
pub mod validate;

pub use accounts::AccountManager;
pub use authz::AuthorizationEngine;
pub use error::{Result, SecretsError};
pub use sharing::{ShareView, SharingManager};
pub use store::{
	SecretAccess, SecretHandle, SecretStore, SecretSummary, SecretView, ShareInfo, VersionSummary,
};

use warden_audit::{AuditAction, AuditTrail};
use warden_auth::UserId;

/// Best-effort audit append. The trail is evidence, not a gatekeeper: a
/// failed append is logged and the business result stands.
pub(crate) async fn record_audit(
	trail: &dyn AuditTrail,
	user_id: Option<UserId>,
	action: AuditAction,
	secret_key: &str,
	metadata: serde_json::Value,
) {
	if let Err(e) = trail.log(user_id, action, secret_key, metadata).await {
		tracing::warn!(error = %e, %action, secret_key, "audit append failed");
	}
}
