//! Hosted cache record types

use serde::{Deserialize, Serialize};

use crate::types::report::Report;
use crate::types::GroupId;

/// A report a host device is relaying for its peer group.
///
/// The wrapped [`Report`] is the same shape the backend serves; the extra
/// flags track how the record got here and whether the backend has seen it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedReportRecord {
    /// The relayed report (canonical id if the backend assigned one,
    /// otherwise still carrying its origin id only)
    pub report: Report,
    /// Group this record is scoped to
    pub group: GroupId,
    /// Stamped on records accepted while the host was offline
    pub hosted_in_group: bool,
    /// True when the record originated on the host device itself
    pub from_host: bool,
    /// Whether the backend has acknowledged this record
    pub synced_to_backend: bool,
}

impl HostedReportRecord {
    /// Record a report accepted from a peer while the host had no internet.
    pub fn offline(report: Report, group: GroupId) -> Self {
        Self {
            report,
            group,
            hosted_in_group: true,
            from_host: false,
            synced_to_backend: false,
        }
    }

    /// Mirror a report that already passed through to the backend.
    pub fn passthrough(report: Report, group: GroupId) -> Self {
        Self {
            report,
            group,
            hosted_in_group: true,
            from_host: false,
            synced_to_backend: true,
        }
    }

    /// Storage key: canonical id when synced, origin id otherwise.
    pub fn key(&self) -> String {
        if self.synced_to_backend || self.report.synced_to_backend {
            self.report.id.to_string_repr()
        } else {
            self.report
                .origin_id
                .map(|l| l.to_string_repr())
                .unwrap_or_else(|| self.report.id.to_string_repr())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::report::{Location, NewReport, ReportType};
    use crate::types::UserId;

    fn report() -> Report {
        Report::from_submission(&NewReport::new(
            UserId::new("u1"),
            ReportType::Medical,
            Location::new(1.0, 2.0, "clinic"),
            "help",
        ))
    }

    #[test]
    fn test_offline_record_flags() {
        let mut r = report();
        r.synced_to_backend = false;
        let rec = HostedReportRecord::offline(r, GroupId::new());
        assert!(rec.hosted_in_group);
        assert!(!rec.synced_to_backend);
        assert!(!rec.from_host);
    }

    #[test]
    fn test_passthrough_record_flags() {
        let rec = HostedReportRecord::passthrough(report(), GroupId::new());
        assert!(rec.hosted_in_group);
        assert!(rec.synced_to_backend);
    }

    #[test]
    fn test_key_prefers_origin_id_when_unsynced() {
        let mut r = report();
        r.synced_to_backend = false;
        let origin = r.origin_id.unwrap();
        let rec = HostedReportRecord::offline(r, GroupId::new());
        assert_eq!(rec.key(), origin.to_string_repr());
    }
}
