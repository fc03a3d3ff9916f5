// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Append-only audit trail for secret operations.
//!
//! Every mutating or reading operation in the vault produces exactly one
//! [`AuditLogEntry`]. Entries are immutable facts: no update or delete is
//! exposed except the bulk age-based [`AuditTrail::purge_older_than`].
//!
//! Access control over queries is deliberately NOT enforced here; the caller
//! owning the API boundary decides which filters a principal may use.

pub mod error;
pub mod event;
pub mod trail;

pub use error::{AuditError, AuditResult};
pub use event::{AuditAction, AuditFilter, AuditLogEntry, AuditStats};
pub use trail::{AuditTrail, SqliteAuditTrail};

/// Default retention period for audit logs in days.
pub const DEFAULT_AUDIT_RETENTION_DAYS: u32 = 90;
