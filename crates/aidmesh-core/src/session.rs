//! Session collaborator: actor identity and role for status-transition
//! authorization.
//!
//! Authentication itself is out of scope; callers hand the engine an
//! already-authenticated [`Session`].

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::types::report::ReportStatus;
use crate::types::UserId;

/// What an actor is allowed to do to a report's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary user: may report incidents and acknowledge them
    Reporter,
    /// Field responder: may additionally mark responding/resolved
    Responder,
    /// Dispatch coordinator: may set any status
    Coordinator,
}

impl Role {
    /// Whether this role may set the given status on a report.
    pub fn may_set(self, status: ReportStatus) -> bool {
        match self {
            Role::Coordinator => true,
            Role::Responder => true,
            Role::Reporter => matches!(
                status,
                ReportStatus::Reported | ReportStatus::Acknowledged
            ),
        }
    }
}

/// An authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Who is acting
    pub user: UserId,
    /// What they may do
    pub role: Role,
}

impl Session {
    /// Build a session for an authenticated user
    pub fn new(user: UserId, role: Role) -> Self {
        Self { user, role }
    }

    /// Check that this session may set the given status.
    pub fn authorize_status(&self, status: ReportStatus) -> ReportResult<()> {
        if self.role.may_set(status) {
            Ok(())
        } else {
            Err(ReportError::Unauthorized(format!(
                "role {:?} may not set status {}",
                self.role, status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_may_acknowledge_but_not_resolve() {
        let session = Session::new(UserId::new("u1"), Role::Reporter);
        assert!(session.authorize_status(ReportStatus::Acknowledged).is_ok());
        assert!(matches!(
            session.authorize_status(ReportStatus::Resolved),
            Err(ReportError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_responder_may_resolve() {
        let session = Session::new(UserId::new("r1"), Role::Responder);
        assert!(session.authorize_status(ReportStatus::Responding).is_ok());
        assert!(session.authorize_status(ReportStatus::Resolved).is_ok());
    }

    #[test]
    fn test_coordinator_may_set_anything() {
        for status in [
            ReportStatus::Reported,
            ReportStatus::Acknowledged,
            ReportStatus::Responding,
            ReportStatus::Resolved,
        ] {
            assert!(Role::Coordinator.may_set(status));
        }
    }
}
