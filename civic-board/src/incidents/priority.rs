//! Operational Priority Index
//!
//! An additive, explainable score: severity + crowd confirmations + time open,
//! with a large penalty that keeps resolved incidents at the bottom of the
//! board without hiding them. Every component is returned alongside the total
//! so responders can see why an incident ranks where it does.

use chrono::{DateTime, Utc};
use civic_common::time::minutes_between;
use serde::{Deserialize, Serialize};

use super::model::{Incident, IncidentStatus, Severity};

pub const CONFIRMATION_POINTS_EACH: i64 = 8;
pub const CONFIRMATION_POINTS_CAP: i64 = 40;
pub const AGE_POINTS_CAP: i64 = 45;
pub const RESOLVED_PENALTY: i64 = -200;

/// Points contributed by the reporter's severity
pub fn severity_points(severity: Severity) -> i64 {
    match severity {
        Severity::Info => 10,
        Severity::Attention => 30,
        Severity::Critical => 60,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityFactor {
    pub label: Severity,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationFactor {
    pub count: u32,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOpenFactor {
    pub minutes: u64,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFactor {
    pub label: IncidentStatus,
    pub points: i64,
}

/// Labeled breakdown of a priority score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityFactors {
    pub severity: SeverityFactor,
    pub confirmations: ConfirmationFactor,
    pub time_open: TimeOpenFactor,
    pub status: StatusFactor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    pub score: i64,
    pub factors: PriorityFactors,
}

/// Score an incident as of `now`.
///
/// Pure in (severity, confirmation_count, status, timestamp, now).
pub fn score_at(incident: &Incident, now: DateTime<Utc>) -> Priority {
    let severity = severity_points(incident.severity);

    let confirmations = (i64::from(incident.confirmation_count) * CONFIRMATION_POINTS_EACH)
        .min(CONFIRMATION_POINTS_CAP);

    let minutes_open = minutes_between(incident.timestamp, now);
    let age = (minutes_open.min(AGE_POINTS_CAP as u64)) as i64;

    let status_modifier = if incident.status == IncidentStatus::Resolved {
        RESOLVED_PENALTY
    } else {
        0
    };

    Priority {
        score: severity + confirmations + age + status_modifier,
        factors: PriorityFactors {
            severity: SeverityFactor {
                label: incident.severity,
                points: severity,
            },
            confirmations: ConfirmationFactor {
                count: incident.confirmation_count,
                points: confirmations,
            },
            time_open: TimeOpenFactor {
                minutes: minutes_open,
                points: age,
            },
            status: StatusFactor {
                label: incident.status,
                points: status_modifier,
            },
        },
    }
}

/// Score an incident against the wall clock
pub fn score(incident: &Incident) -> Priority {
    score_at(incident, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn incident(severity: Severity, confirmations: u32, status: IncidentStatus, at: DateTime<Utc>) -> Incident {
        Incident {
            id: "inc_test".to_string(),
            incident_type: "fire".to_string(),
            description: String::new(),
            severity,
            latitude: 28.6139,
            longitude: 77.209,
            display_location: "Connaught Place".to_string(),
            timestamp: at,
            updated_at: at,
            status,
            confirmation_count: confirmations,
            internal_notes: String::new(),
            timeline: Vec::new(),
            duplicate_of: None,
            group_id: "inc_test".to_string(),
        }
    }

    #[test]
    fn test_fresh_critical_scores_sixty() {
        let now = Utc::now();
        let p = score_at(&incident(Severity::Critical, 0, IncidentStatus::Unverified, now), now);
        assert_eq!(p.score, 60);
        assert_eq!(p.factors.severity.points, 60);
        assert_eq!(p.factors.confirmations.points, 0);
        assert_eq!(p.factors.time_open.points, 0);
        assert_eq!(p.factors.status.points, 0);
    }

    #[test]
    fn test_severity_weights() {
        let now = Utc::now();
        for (severity, expected) in [
            (Severity::Info, 10),
            (Severity::Attention, 30),
            (Severity::Critical, 60),
        ] {
            let p = score_at(&incident(severity, 0, IncidentStatus::Unverified, now), now);
            assert_eq!(p.score, expected, "{severity}");
        }
    }

    #[test]
    fn test_confirmations_capped_at_forty() {
        let now = Utc::now();
        let p = score_at(&incident(Severity::Info, 3, IncidentStatus::Verified, now), now);
        assert_eq!(p.factors.confirmations.points, 24);

        let p = score_at(&incident(Severity::Info, 12, IncidentStatus::Verified, now), now);
        assert_eq!(p.factors.confirmations.count, 12);
        assert_eq!(p.factors.confirmations.points, 40);
    }

    #[test]
    fn test_age_one_point_per_minute_capped() {
        let now = Utc::now();
        let p = score_at(
            &incident(Severity::Attention, 0, IncidentStatus::Unverified, now - Duration::seconds(10 * 60 + 59)),
            now,
        );
        assert_eq!(p.factors.time_open.minutes, 10);
        assert_eq!(p.score, 40);

        let p = score_at(
            &incident(Severity::Attention, 0, IncidentStatus::Unverified, now - Duration::hours(3)),
            now,
        );
        assert_eq!(p.factors.time_open.minutes, 180);
        assert_eq!(p.factors.time_open.points, 45);
    }

    #[test]
    fn test_future_timestamp_has_no_age() {
        let now = Utc::now();
        let p = score_at(
            &incident(Severity::Info, 0, IncidentStatus::Unverified, now + Duration::minutes(30)),
            now,
        );
        assert_eq!(p.factors.time_open.minutes, 0);
        assert_eq!(p.score, 10);
    }

    #[test]
    fn test_resolved_sinks() {
        let now = Utc::now();
        let p = score_at(
            &incident(Severity::Critical, 5, IncidentStatus::Resolved, now - Duration::hours(1)),
            now,
        );
        assert_eq!(p.score, 60 + 40 + 45 - 200);
        assert_eq!(p.factors.status.label, IncidentStatus::Resolved);
    }

    #[test]
    fn test_score_is_deterministic() {
        let now = Utc::now();
        let inc = incident(Severity::Attention, 2, IncidentStatus::Responding, now - Duration::minutes(7));
        assert_eq!(score_at(&inc, now), score_at(&inc, now));
    }
}
