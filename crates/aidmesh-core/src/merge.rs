//! Dedup & merge engine
//!
//! Pure decision logic over report identity and status-history merging.
//! No I/O happens here: backend ingestion, the mesh proxy, and any reader
//! that combines multiple copies of the same report all call into these
//! functions so every path resolves duplicates the same way.
//!
//! ## Identity
//!
//! Two submissions describe the same incident when they share author, type
//! and rounded location, and their creation times fall within the dedup
//! window. The window is configurable ([`crate::config::SyncConfig`]);
//! 30 seconds by default.
//!
//! ## Merging
//!
//! A merge unions status histories, deduplicating on the (status, actor)
//! pair, re-sorts by timestamp, and recomputes the current status as the
//! highest-priority entry of the merged history. Status only ever moves
//! upward; re-applying an already-merged event is a no-op.

use tracing::debug;

use crate::config::SyncConfig;
use crate::types::report::{NewReport, Report, ReportStatus, ReportType, StatusEvent};

/// Identity key for duplicate detection: author + type + location cell.
///
/// Time is deliberately not part of the key: window matching is a range
/// check against each candidate, not a bucket lookup, so two reports a few
/// seconds apart never land on opposite sides of a bucket boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    user: String,
    kind: ReportType,
    cell: (i64, i64),
}

impl DedupKey {
    /// Key for an incoming submission
    pub fn of_submission(payload: &NewReport, config: &SyncConfig) -> Self {
        Self {
            user: payload.user.0.clone(),
            kind: payload.kind,
            cell: payload.location.grid_cell(config.location_precision),
        }
    }

    /// Key for an existing canonical report
    pub fn of_report(report: &Report, config: &SyncConfig) -> Self {
        Self {
            user: report.user.0.clone(),
            kind: report.kind,
            cell: report.location.grid_cell(config.location_precision),
        }
    }
}

/// Whether `candidate` is a duplicate of the existing `report`.
///
/// Symmetric in time: either copy may have been created first.
pub fn is_duplicate(report: &Report, candidate: &NewReport, config: &SyncConfig) -> bool {
    if DedupKey::of_report(report, config) != DedupKey::of_submission(candidate, config) {
        return false;
    }
    let delta_ms = (report.created_at - candidate.created_at).unsigned_abs();
    delta_ms <= config.dedup_window.as_millis() as u64
}

/// Union `incoming` into `history`, skipping events whose (status, actor)
/// pair is already present, then re-sort ascending by timestamp.
///
/// Returns `true` if the history changed.
pub fn merge_history(history: &mut Vec<StatusEvent>, incoming: &[StatusEvent]) -> bool {
    let mut changed = false;
    for event in incoming {
        let already = history
            .iter()
            .any(|e| e.dedup_pair() == event.dedup_pair());
        if !already {
            history.push(event.clone());
            changed = true;
        }
    }
    if changed {
        history.sort_by_key(|e| e.timestamp);
    }
    changed
}

/// The canonical current status: the highest-priority entry of the history.
///
/// An empty history resolves to REPORTED, the floor of the lifecycle.
pub fn resolve_status(history: &[StatusEvent]) -> ReportStatus {
    history
        .iter()
        .map(|e| e.status)
        .max()
        .unwrap_or(ReportStatus::Reported)
}

/// What ingesting a submission did.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// No duplicate existed; a new canonical report was inserted
    Inserted(Report),
    /// A duplicate existed and the merge changed its state
    Merged(Report),
    /// A duplicate existed and the merge changed nothing (suppressed
    /// duplicate: not an error, and nothing is re-broadcast)
    Unchanged(Report),
}

impl MergeOutcome {
    /// The resulting canonical report, whatever happened
    pub fn report(&self) -> &Report {
        match self {
            MergeOutcome::Inserted(r) | MergeOutcome::Merged(r) | MergeOutcome::Unchanged(r) => r,
        }
    }

    /// Whether canonical state changed (and should be persisted/broadcast)
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged(_))
    }
}

/// Merge a duplicate submission into an existing canonical report.
///
/// The incoming payload's seed history is unioned in, along with the
/// implicit REPORTED event every submission carries, so a replay that went
/// through several offline transitions lands fully. The existing report is
/// not mutated; the (possibly unchanged) merged copy is returned.
pub fn merge_submission(existing: &Report, payload: &NewReport) -> MergeOutcome {
    let mut merged = existing.clone();

    // The incoming copy's own timeline: its seed history plus the implicit
    // REPORTED event for its author.
    let mut incoming = payload.seed_history.clone();
    if !incoming.iter().any(|e| e.status == ReportStatus::Reported) {
        incoming.push(StatusEvent::new(
            ReportStatus::Reported,
            payload.user.clone(),
            payload.created_at,
        ));
    }

    let changed = merge_history(&mut merged.status_history, &incoming);
    if !changed {
        debug!(id = %existing.id, "Duplicate suppressed (merge changed nothing)");
        return MergeOutcome::Unchanged(merged);
    }

    merged.status = resolve_status(&merged.status_history);
    MergeOutcome::Merged(merged)
}

/// Apply a single status event to a report, if it brings anything new.
///
/// Used by backend status updates and by the hosted cache when relaying
/// peer updates. Returns `None` when the event was already present.
pub fn apply_status_event(report: &Report, event: StatusEvent) -> Option<Report> {
    let mut updated = report.clone();
    if !merge_history(&mut updated.status_history, std::slice::from_ref(&event)) {
        return None;
    }
    updated.status = resolve_status(&updated.status_history);
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::report::Location;
    use crate::types::UserId;

    fn config() -> SyncConfig {
        SyncConfig::default()
    }

    fn payload_at(ts: i64) -> NewReport {
        let mut p = NewReport::new(
            UserId::new("u1"),
            ReportType::Fire,
            Location::new(37.7749, -122.4194, "pier 7"),
            "smoke",
        );
        p.created_at = ts;
        p
    }

    #[test]
    fn test_duplicate_within_window() {
        let first = Report::from_submission(&payload_at(1_000_000));
        let second = payload_at(1_010_000); // 10s later
        assert!(is_duplicate(&first, &second, &config()));
    }

    #[test]
    fn test_duplicate_symmetric_in_time() {
        // The "existing" copy may have the later timestamp (out-of-order
        // replay); the match must still hold.
        let later = Report::from_submission(&payload_at(1_010_000));
        let earlier = payload_at(1_000_000);
        assert!(is_duplicate(&later, &earlier, &config()));
    }

    #[test]
    fn test_not_duplicate_outside_window() {
        let first = Report::from_submission(&payload_at(1_000_000));
        let much_later = payload_at(1_000_000 + 31_000);
        assert!(!is_duplicate(&first, &much_later, &config()));
    }

    #[test]
    fn test_not_duplicate_different_author() {
        let first = Report::from_submission(&payload_at(1_000_000));
        let mut other = payload_at(1_005_000);
        other.user = UserId::new("u2");
        assert!(!is_duplicate(&first, &other, &config()));
    }

    #[test]
    fn test_not_duplicate_different_kind() {
        let first = Report::from_submission(&payload_at(1_000_000));
        let mut other = payload_at(1_005_000);
        other.kind = ReportType::Medical;
        assert!(!is_duplicate(&first, &other, &config()));
    }

    #[test]
    fn test_not_duplicate_far_location() {
        let first = Report::from_submission(&payload_at(1_000_000));
        let mut other = payload_at(1_005_000);
        other.location = Location::new(37.8049, -122.4194, "far away");
        assert!(!is_duplicate(&first, &other, &config()));
    }

    #[test]
    fn test_merge_history_dedups_on_status_actor_pair() {
        let mut history = vec![StatusEvent::new(
            ReportStatus::Reported,
            UserId::new("u1"),
            100,
        )];
        // Same pair, different timestamp: skipped
        let incoming = vec![StatusEvent::new(
            ReportStatus::Reported,
            UserId::new("u1"),
            200,
        )];
        assert!(!merge_history(&mut history, &incoming));
        assert_eq!(history.len(), 1);

        // Same status, different actor: merged
        let incoming = vec![StatusEvent::new(
            ReportStatus::Reported,
            UserId::new("u2"),
            50,
        )];
        assert!(merge_history(&mut history, &incoming));
        assert_eq!(history.len(), 2);
        // Re-sorted ascending
        assert_eq!(history[0].timestamp, 50);
    }

    #[test]
    fn test_resolve_status_picks_highest_priority() {
        let history = vec![
            StatusEvent::new(ReportStatus::Responding, UserId::new("r1"), 300),
            StatusEvent::new(ReportStatus::Reported, UserId::new("u1"), 100),
            StatusEvent::new(ReportStatus::Acknowledged, UserId::new("u2"), 200),
        ];
        assert_eq!(resolve_status(&history), ReportStatus::Responding);
        assert_eq!(resolve_status(&[]), ReportStatus::Reported);
    }

    #[test]
    fn test_merge_submission_is_idempotent() {
        let existing = Report::from_submission(&payload_at(1_000_000));
        let replay = payload_at(1_000_000); // exact same submission

        match merge_submission(&existing, &replay) {
            MergeOutcome::Unchanged(r) => {
                assert_eq!(r.status_history.len(), existing.status_history.len());
                assert_eq!(r.status, existing.status);
            }
            other => panic!("expected Unchanged, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_submission_upgrades_status() {
        // Report A submitted directly; A' replayed with an offline
        // ACKNOWLEDGED transition by a second user.
        let existing = Report::from_submission(&payload_at(1_000_000));
        let mut replay = payload_at(1_010_000);
        replay.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u2"),
            1_005_000,
        ));

        match merge_submission(&existing, &replay) {
            MergeOutcome::Merged(r) => {
                assert_eq!(r.status, ReportStatus::Acknowledged);
                // Implicit REPORTED by u1 plus explicit ACKNOWLEDGED by u2
                assert_eq!(r.status_history.len(), 2);
                assert_eq!(r.id, existing.id);
            }
            other => panic!("expected Merged, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_never_downgrades() {
        let mut existing = Report::from_submission(&payload_at(1_000_000));
        existing = apply_status_event(
            &existing,
            StatusEvent::new(ReportStatus::Resolved, UserId::new("r1"), 1_020_000),
        )
        .unwrap();
        assert_eq!(existing.status, ReportStatus::Resolved);

        // A replayed copy carrying only lower-priority events
        let mut replay = payload_at(1_010_000);
        replay.user = UserId::new("u1");
        replay.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u3"),
            1_012_000,
        ));

        let outcome = merge_submission(&existing, &replay);
        assert_eq!(outcome.report().status, ReportStatus::Resolved);
    }

    #[test]
    fn test_apply_status_event_noop_when_present() {
        let report = Report::from_submission(&payload_at(1_000_000));
        let dup = StatusEvent::new(ReportStatus::Reported, UserId::new("u1"), 2_000_000);
        assert!(apply_status_event(&report, dup).is_none());
    }
}
