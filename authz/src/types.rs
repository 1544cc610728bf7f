//! Core authorization types

use serde::{Deserialize, Serialize};

/// Outcome of a capability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

impl From<bool> for AccessDecision {
    fn from(allowed: bool) -> Self {
        if allowed {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny
        }
    }
}

/// The fixed set of guard points the API dispatches on.
///
/// Each variant maps to a stored capability name; the underlying graph
/// traversal stays data-driven, so granting or revoking a capability is
/// a row change, never a code change. New guard points are new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Read access to events and schedules
    ViewEvents,
    /// Complete, postpone, follow up and reject events
    ManageEvents,
    /// Administer principals and role assignments
    ManageUsers,
    /// Read the security audit log
    ViewAuditLog,
}

impl Policy {
    /// Every policy the system dispatches on, fixed at startup
    pub const ALL: [Policy; 4] = [
        Policy::ViewEvents,
        Policy::ManageEvents,
        Policy::ManageUsers,
        Policy::ViewAuditLog,
    ];

    /// The stored capability name this policy resolves against
    pub fn capability(&self) -> &'static str {
        match self {
            Policy::ViewEvents => "CanViewEvents",
            Policy::ManageEvents => "CanManageEvents",
            Policy::ManageUsers => "CanManageUsers",
            Policy::ViewAuditLog => "CanViewAuditLog",
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.capability())
    }
}
