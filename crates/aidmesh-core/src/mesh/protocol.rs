//! Mesh relay protocol between group peers and their host.
//!
//! Messages are serialized with postcard and exchanged over one
//! bidirectional QUIC stream per request.
//!
//! ## Protocol Overview
//!
//! The host mirrors the subset of backend report operations peers need:
//!
//! 1. **SubmitReport**: peer submits a new report through the host
//! 2. **ListReports**: peer fetches the host's view of the group's reports
//! 3. **UpdateStatus**: peer relays a status transition
//!
//! ## Message Flow
//!
//! ```text
//! Peer                              Host
//!   |                                |
//!   |--- SubmitReport {payload} ---->|
//!   |<-- Report {report} ------------|   (canonical if host online,
//!   |                                |    temp-id copy otherwise)
//!   |                                |
//!   |--- UpdateStatus {target,ev} -->|
//!   |<-- Report {report} ------------|
//!   |                                |
//!   |--- ListReports --------------->|
//!   |<-- Reports {reports} ----------|
//! ```
//!
//! Responses carry the same serialized report shape the backend serves, so
//! client-side merge logic does not care which source answered.

use serde::{Deserialize, Serialize};

use crate::types::report::{NewReport, Report, StatusEvent};
use crate::types::ReportRef;

/// ALPN protocol identifier for the report relay protocol
pub const REPORT_ALPN: &[u8] = b"/aidmesh/report/1";

/// Requests a peer sends to its group host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeshRequest {
    /// Submit a new report through the host
    SubmitReport {
        /// The submission payload, including its temporary id
        payload: NewReport,
    },

    /// Fetch the host's current view of the group's reports
    ListReports,

    /// Relay a status transition
    UpdateStatus {
        /// Canonical or temporary id of the target report
        target: ReportRef,
        /// The transition event (status, actor, timestamp)
        event: StatusEvent,
    },
}

impl MeshRequest {
    /// Encode request to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode request from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            MeshRequest::SubmitReport { .. } => "submit",
            MeshRequest::ListReports => "list",
            MeshRequest::UpdateStatus { .. } => "updateStatus",
        }
    }
}

/// Responses a host sends back to a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeshResponse {
    /// A single report (submit and update responses)
    Report {
        /// The resulting report as the host knows it
        report: Report,
    },

    /// The group's reports (list response)
    Reports {
        /// All reports visible to the group
        reports: Vec<Report>,
    },

    /// The request failed; the proxy keeps serving
    Error {
        /// Human-readable failure description
        message: String,
    },
}

impl MeshResponse {
    /// Encode response to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode response from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        matches!(self, MeshResponse::Error { .. })
    }
}

/// Versioned wrapper for mesh requests (future-proofing)
///
/// Allows protocol evolution while maintaining backward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeshWireRequest {
    /// Protocol version 1
    V1(MeshRequest),
}

impl MeshWireRequest {
    /// Wrap a request in the current protocol version
    pub fn new(req: MeshRequest) -> Self {
        MeshWireRequest::V1(req)
    }

    /// Encode wire request to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode wire request from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Unwrap the inner request
    pub fn into_inner(self) -> MeshRequest {
        match self {
            MeshWireRequest::V1(req) => req,
        }
    }

    /// Get the protocol version
    pub fn version(&self) -> u8 {
        match self {
            MeshWireRequest::V1(_) => 1,
        }
    }
}

/// Versioned wrapper for mesh responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeshWireResponse {
    /// Protocol version 1
    V1(MeshResponse),
}

impl MeshWireResponse {
    /// Wrap a response in the current protocol version
    pub fn new(resp: MeshResponse) -> Self {
        MeshWireResponse::V1(resp)
    }

    /// Encode wire response to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode wire response from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Unwrap the inner response
    pub fn into_inner(self) -> MeshResponse {
        match self {
            MeshWireResponse::V1(resp) => resp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::report::{Location, ReportStatus, ReportType};
    use crate::types::{LocalId, UserId};

    fn payload() -> NewReport {
        NewReport::new(
            UserId::new("peer1"),
            ReportType::Medical,
            Location::new(12.0, 34.0, "camp entrance"),
            "injured hiker",
        )
    }

    #[test]
    fn test_submit_request_roundtrip() {
        let req = MeshRequest::SubmitReport { payload: payload() };
        let encoded = req.encode().unwrap();
        let decoded = MeshRequest::decode(&encoded).unwrap();
        match decoded {
            MeshRequest::SubmitReport { payload: p } => {
                assert_eq!(p.user, UserId::new("peer1"));
                assert_eq!(p.kind, ReportType::Medical);
            }
            _ => panic!("wrong request type"),
        }
    }

    #[test]
    fn test_update_status_roundtrip() {
        let target = ReportRef::Local(LocalId::new());
        let req = MeshRequest::UpdateStatus {
            target,
            event: StatusEvent::new(ReportStatus::Acknowledged, UserId::new("peer2"), 99),
        };
        let decoded = MeshRequest::decode(&req.encode().unwrap()).unwrap();
        match decoded {
            MeshRequest::UpdateStatus { target: t, event } => {
                assert_eq!(t, target);
                assert_eq!(event.status, ReportStatus::Acknowledged);
            }
            _ => panic!("wrong request type"),
        }
    }

    #[test]
    fn test_wire_request_versioning() {
        let wire = MeshWireRequest::new(MeshRequest::ListReports);
        assert_eq!(wire.version(), 1);

        let decoded = MeshWireRequest::decode(&wire.encode().unwrap()).unwrap();
        assert_eq!(decoded.version(), 1);
        match decoded.into_inner() {
            MeshRequest::ListReports => {}
            _ => panic!("wrong request type"),
        }
    }

    #[test]
    fn test_error_response_roundtrip() {
        let resp = MeshResponse::Error {
            message: "malformed request".to_string(),
        };
        assert!(resp.is_error());

        let wire = MeshWireResponse::new(resp);
        let decoded = MeshWireResponse::decode(&wire.encode().unwrap()).unwrap();
        match decoded.into_inner() {
            MeshResponse::Error { message } => assert_eq!(message, "malformed request"),
            _ => panic!("wrong response type"),
        }
    }

    #[test]
    fn test_reports_response_roundtrip() {
        use crate::types::report::Report;
        let reports = vec![
            Report::from_submission(&payload()),
            Report::from_submission(&payload()),
        ];
        let resp = MeshResponse::Reports {
            reports: reports.clone(),
        };
        let decoded = MeshResponse::decode(&resp.encode().unwrap()).unwrap();
        match decoded {
            MeshResponse::Reports { reports: r } => assert_eq!(r.len(), 2),
            _ => panic!("wrong response type"),
        }
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(MeshWireRequest::decode(&[0xff, 0xfe, 0xfd]).is_err());
    }

    #[test]
    fn test_report_alpn_constant() {
        assert_eq!(REPORT_ALPN, b"/aidmesh/report/1");
        assert!(!REPORT_ALPN.is_empty());
    }
}
