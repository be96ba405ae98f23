//! Append-only incident timeline
//!
//! Entries stay in ascending time order. Appends use an ordered insert after
//! every entry with an equal or earlier timestamp, which keeps ties in append
//! order and avoids re-sorting the whole sequence on each write.

use chrono::{DateTime, Utc};

use super::model::{Actor, Incident, TimelineEntry};

pub const ACTION_REPORTED: &str = "incident_reported";
pub const ACTION_DUPLICATE_GROUPED: &str = "potential_duplicate_grouped";
pub const ACTION_CONFIRMATION: &str = "confirmation_received";
pub const ACTION_AUTO_ESCALATED: &str = "status_auto_escalated";
pub const ACTION_STATUS_UPDATED: &str = "status_updated";
pub const ACTION_NOTES_UPDATED: &str = "internal_notes_updated";

/// Append an entry stamped `at`
pub fn append_at(
    incident: &mut Incident,
    at: DateTime<Utc>,
    actor: Actor,
    action: &str,
    detail: impl Into<String>,
) {
    let entry = TimelineEntry {
        timestamp: at,
        actor,
        action: action.to_string(),
        detail: detail.into(),
    };
    let idx = incident
        .timeline
        .partition_point(|existing| existing.timestamp <= entry.timestamp);
    incident.timeline.insert(idx, entry);
}

/// Append an entry stamped with the current time
pub fn append(incident: &mut Incident, actor: Actor, action: &str, detail: impl Into<String>) {
    append_at(incident, Utc::now(), actor, action, detail);
}

/// Restore ascending order on a timeline loaded from storage
pub fn normalize(incident: &mut Incident) {
    incident.timeline.sort_by_key(|entry| entry.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidents::model::{IncidentStatus, Severity};
    use chrono::Duration;

    fn blank() -> Incident {
        let now = Utc::now();
        Incident {
            id: "inc_t".into(),
            incident_type: "general".into(),
            description: String::new(),
            severity: Severity::Attention,
            latitude: 0.0,
            longitude: 0.0,
            display_location: String::new(),
            timestamp: now,
            updated_at: now,
            status: IncidentStatus::Unverified,
            confirmation_count: 0,
            internal_notes: String::new(),
            timeline: Vec::new(),
            duplicate_of: None,
            group_id: "inc_t".into(),
        }
    }

    fn actions(incident: &Incident) -> Vec<&str> {
        incident.timeline.iter().map(|e| e.action.as_str()).collect()
    }

    #[test]
    fn test_appends_in_order() {
        let mut inc = blank();
        append(&mut inc, Actor::System, ACTION_REPORTED, "Reported as general (attention)");
        append(&mut inc, Actor::Crowd, ACTION_CONFIRMATION, "Confirmations: 1");
        assert_eq!(actions(&inc), vec![ACTION_REPORTED, ACTION_CONFIRMATION]);
    }

    #[test]
    fn test_out_of_order_append_is_placed_chronologically() {
        let mut inc = blank();
        let t0 = Utc::now();
        append_at(&mut inc, t0, Actor::System, "a", "");
        append_at(&mut inc, t0 + Duration::seconds(10), Actor::System, "c", "");
        append_at(&mut inc, t0 + Duration::seconds(5), Actor::System, "b", "");
        assert_eq!(actions(&inc), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_timestamps_keep_append_order() {
        let mut inc = blank();
        let t0 = Utc::now();
        append_at(&mut inc, t0, Actor::System, "first", "");
        append_at(&mut inc, t0, Actor::System, "second", "");
        append_at(&mut inc, t0, Actor::System, "third", "");
        assert_eq!(actions(&inc), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_normalize_sorts_loaded_timeline() {
        let mut inc = blank();
        let t0 = Utc::now();
        inc.timeline = vec![
            TimelineEntry { timestamp: t0 + Duration::seconds(2), actor: Actor::Responder, action: "late".into(), detail: String::new() },
            TimelineEntry { timestamp: t0, actor: Actor::System, action: "early".into(), detail: String::new() },
        ];
        normalize(&mut inc);
        assert_eq!(actions(&inc), vec!["early", "late"]);
    }
}
