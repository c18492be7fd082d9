//! Report domain types
//!
//! A [`Report`] is the unit of synchronization: one incident, one canonical
//! record, one merged status timeline. The serialized shape is shared by the
//! backend resource and the mesh proxy endpoints, so client-side merge logic
//! is source-agnostic: `{id, type, location, message, status,
//! statusHistory[], createdAt, user}`.

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::types::{LocalId, ReportId, UserId};

/// Category of an incident report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Medical emergency
    Medical,
    /// Fire
    Fire,
    /// Earthquake
    Earthquake,
    /// Security incident
    Security,
    /// Traffic or industrial accident
    Accident,
    /// Anything else
    Other,
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportType::Medical => "medical",
            ReportType::Fire => "fire",
            ReportType::Earthquake => "earthquake",
            ReportType::Security => "security",
            ReportType::Accident => "accident",
            ReportType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle status of a report.
///
/// The derived ordering IS the status priority: `Reported < Acknowledged <
/// Responding < Resolved`. Merges only ever move status upward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    /// Initial state on submission
    Reported,
    /// A responder has seen the report
    Acknowledged,
    /// Help is on the way
    Responding,
    /// Incident closed
    Resolved,
}

impl ReportStatus {
    /// Numeric priority used to compute the canonical current status from a
    /// merged history. Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            ReportStatus::Reported => 0,
            ReportStatus::Acknowledged => 1,
            ReportStatus::Responding => 2,
            ReportStatus::Resolved => 3,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportStatus::Reported => "REPORTED",
            ReportStatus::Acknowledged => "ACKNOWLEDGED",
            ReportStatus::Responding => "RESPONDING",
            ReportStatus::Resolved => "RESOLVED",
        };
        write!(f, "{}", s)
    }
}

/// Where the incident is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Free-text description ("corner of 5th and Main")
    pub description: String,
}

impl Location {
    /// Create a location from coordinates and a description
    pub fn new(latitude: f64, longitude: f64, description: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            description: description.into(),
        }
    }

    /// Round the coordinates onto a grid cell for dedup matching.
    ///
    /// `precision` is the number of retained decimal places; 3 places is a
    /// cell of roughly 110 m at the equator.
    pub fn grid_cell(&self, precision: u32) -> (i64, i64) {
        let scale = 10f64.powi(precision as i32);
        (
            (self.latitude * scale).round() as i64,
            (self.longitude * scale).round() as i64,
        )
    }

    fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One entry in a report's status timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// The status this event sets
    pub status: ReportStatus,
    /// Who made the transition
    pub actor: UserId,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl StatusEvent {
    /// Create a status event
    pub fn new(status: ReportStatus, actor: UserId, timestamp: i64) -> Self {
        Self {
            status,
            actor,
            timestamp,
        }
    }

    /// The (status, actor) pair used for history deduplication
    pub fn dedup_pair(&self) -> (ReportStatus, &UserId) {
        (self.status, &self.actor)
    }
}

/// A canonical incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Canonical backend-assigned id
    pub id: ReportId,
    /// Author of the original submission
    pub user: UserId,
    /// Incident category
    #[serde(rename = "type")]
    pub kind: ReportType,
    /// Where it happened
    pub location: Location,
    /// Free-text report message
    pub message: String,
    /// Current status; always the highest-priority entry in `status_history`
    pub status: ReportStatus,
    /// Merged status timeline, sorted ascending by timestamp
    pub status_history: Vec<StatusEvent>,
    /// Unix timestamp (milliseconds) of original creation on the device
    pub created_at: i64,
    /// Whether the backend has acknowledged this record
    pub synced_to_backend: bool,
    /// The temporary id this report was first created under, if any
    pub origin_id: Option<LocalId>,
}

impl Report {
    /// Build a canonical report from an accepted submission, seeding the
    /// status history from the payload.
    ///
    /// If the seed history carries no REPORTED entry (the usual case for a
    /// fresh submission), an implicit one is added for the author at
    /// creation time, so a later merge always finds the full timeline.
    pub fn from_submission(payload: &NewReport) -> Self {
        // Seed histories arrive from untrusted replays; drop any entry
        // whose (status, actor) pair is already present.
        let mut history: Vec<StatusEvent> = Vec::new();
        for event in &payload.seed_history {
            if !history.iter().any(|e| e.dedup_pair() == event.dedup_pair()) {
                history.push(event.clone());
            }
        }
        if !history
            .iter()
            .any(|e| e.status == ReportStatus::Reported)
        {
            history.push(StatusEvent::new(
                ReportStatus::Reported,
                payload.user.clone(),
                payload.created_at,
            ));
        }
        history.sort_by_key(|e| e.timestamp);
        let status = history
            .iter()
            .map(|e| e.status)
            .max()
            .unwrap_or(ReportStatus::Reported);

        Self {
            id: ReportId::new(),
            user: payload.user.clone(),
            kind: payload.kind,
            location: payload.location.clone(),
            message: payload.message.clone(),
            status,
            status_history: history,
            created_at: payload.created_at,
            synced_to_backend: true,
            origin_id: Some(payload.local_id),
        }
    }
}

/// Submission payload for a new report.
///
/// Carries the client-generated [`LocalId`] and any status transitions the
/// report accumulated while offline, so a replay after multiple offline
/// transitions seeds the canonical record correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    /// Client-generated temporary id
    pub local_id: LocalId,
    /// Author
    pub user: UserId,
    /// Incident category
    #[serde(rename = "type")]
    pub kind: ReportType,
    /// Where it happened
    pub location: Location,
    /// Free-text report message
    pub message: String,
    /// Unix timestamp (milliseconds) of creation on the device
    pub created_at: i64,
    /// Status transitions accumulated before first contact (may be empty)
    #[serde(default)]
    pub seed_history: Vec<StatusEvent>,
}

impl NewReport {
    /// Create a payload with a fresh local id, stamped now.
    pub fn new(
        user: UserId,
        kind: ReportType,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            user,
            kind,
            location,
            message: message.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            seed_history: Vec::new(),
        }
    }

    /// Reject malformed payloads before any matching attempt.
    pub fn validate(&self) -> ReportResult<()> {
        if self.user.is_empty() {
            return Err(ReportError::Validation(
                "report author must not be empty".to_string(),
            ));
        }
        if !self.location.is_valid() {
            return Err(ReportError::Validation(format!(
                "location out of range: ({}, {})",
                self.location.latitude, self.location.longitude
            )));
        }
        if self.created_at <= 0 {
            return Err(ReportError::Validation(
                "createdAt must be a positive unix timestamp".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> NewReport {
        NewReport::new(
            UserId::new("u1"),
            ReportType::Fire,
            Location::new(37.7749, -122.4194, "Mission district"),
            "Smoke from the second floor",
        )
    }

    #[test]
    fn test_status_ordering_matches_priority() {
        assert!(ReportStatus::Reported < ReportStatus::Acknowledged);
        assert!(ReportStatus::Acknowledged < ReportStatus::Responding);
        assert!(ReportStatus::Responding < ReportStatus::Resolved);
        assert!(ReportStatus::Resolved.priority() > ReportStatus::Reported.priority());
    }

    #[test]
    fn test_location_grid_cell_rounding() {
        let a = Location::new(37.77491, -122.41942, "a");
        let b = Location::new(37.77493, -122.41939, "b");
        // Same cell at 3 decimal places (~110m)
        assert_eq!(a.grid_cell(3), b.grid_cell(3));
        // Different cells at 5 decimal places
        assert_ne!(a.grid_cell(5), b.grid_cell(5));
    }

    #[test]
    fn test_from_submission_seeds_implicit_reported() {
        let p = payload();
        let report = Report::from_submission(&p);
        assert_eq!(report.status, ReportStatus::Reported);
        assert_eq!(report.status_history.len(), 1);
        assert_eq!(report.status_history[0].status, ReportStatus::Reported);
        assert_eq!(report.status_history[0].actor, p.user);
        assert_eq!(report.origin_id, Some(p.local_id));
    }

    #[test]
    fn test_from_submission_with_offline_transitions() {
        let mut p = payload();
        p.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u2"),
            p.created_at + 5_000,
        ));
        let report = Report::from_submission(&p);
        // Implicit REPORTED plus the explicit ACKNOWLEDGED
        assert_eq!(report.status_history.len(), 2);
        assert_eq!(report.status, ReportStatus::Acknowledged);
        assert!(report.status_history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_from_submission_dedups_seed_history() {
        let mut p = payload();
        p.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u2"),
            p.created_at + 1_000,
        ));
        p.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u2"),
            p.created_at + 9_000,
        ));
        let report = Report::from_submission(&p);
        // Duplicate (status, actor) pair collapsed; implicit REPORTED added
        assert_eq!(report.status_history.len(), 2);
    }

    #[test]
    fn test_validate_rejects_missing_author() {
        let mut p = payload();
        p.user = UserId::new("");
        assert!(matches!(p.validate(), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_coordinates() {
        let mut p = payload();
        p.location.latitude = 123.0;
        assert!(matches!(p.validate(), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_wire_shape_field_names() {
        let report = Report::from_submission(&payload());
        let value = serde_json::to_value(&report).unwrap();
        let obj = value.as_object().unwrap();
        for field in [
            "id",
            "type",
            "location",
            "message",
            "status",
            "statusHistory",
            "createdAt",
            "user",
        ] {
            assert!(obj.contains_key(field), "missing wire field {}", field);
        }
        assert_eq!(obj["status"], "REPORTED");
    }
}
