//! Spatio-temporal duplicate detection
//!
//! A new report is a duplicate candidate of an existing one when both share a
//! type, were reported within ten minutes of each other and lie within 200 m.
//! Resolved incidents never attract duplicates.

use chrono::{DateTime, Duration, Utc};
use civic_common::geo::distance_meters;

use super::model::{Incident, IncidentStatus};

pub const DUPLICATE_RADIUS_METERS: f64 = 200.0;
pub const DUPLICATE_WINDOW_MINUTES: i64 = 10;

/// The fields of a not-yet-stored report that matter for matching
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub incident_type: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a Incident> for Candidate<'a> {
    fn from(incident: &'a Incident) -> Self {
        Self {
            incident_type: &incident.incident_type,
            latitude: incident.latitude,
            longitude: incident.longitude,
            timestamp: incident.timestamp,
        }
    }
}

/// How a new incident joins the cluster structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub duplicate_of: Option<String>,
    pub group_id: String,
}

impl Grouping {
    pub fn root(id: &str) -> Self {
        Self {
            duplicate_of: None,
            group_id: id.to_string(),
        }
    }

    /// Link to `matched`, inheriting its root so chains collapse to one group
    pub fn linked_to(matched: &Incident) -> Self {
        Self {
            duplicate_of: Some(matched.id.clone()),
            group_id: matched.group_root().to_string(),
        }
    }
}

/// True when `existing` is a plausible duplicate of `candidate`
pub fn is_duplicate(candidate: &Candidate<'_>, existing: &Incident) -> bool {
    if existing.status == IncidentStatus::Resolved {
        return false;
    }
    if existing.incident_type != candidate.incident_type {
        return false;
    }

    let gap = (existing.timestamp - candidate.timestamp).abs();
    if gap > Duration::minutes(DUPLICATE_WINDOW_MINUTES) {
        return false;
    }

    distance_meters(
        candidate.latitude,
        candidate.longitude,
        existing.latitude,
        existing.longitude,
    ) <= DUPLICATE_RADIUS_METERS
}

/// First match in iteration order, or None.
///
/// Callers that need a stable answer must pass incidents in a stable order;
/// the store iterates oldest report first.
pub fn find_duplicate<'a, I>(candidate: &Candidate<'_>, existing: I) -> Option<&'a Incident>
where
    I: IntoIterator<Item = &'a Incident>,
{
    existing
        .into_iter()
        .find(|incident| is_duplicate(candidate, incident))
}
