//! Incident lifecycle engine
//!
//! Owns the incident collection. Every read-modify-write sequence (duplicate
//! check + insert, counter increment + escalation, status change + timeline
//! append) runs under one write lock, so readers never see a half-applied
//! mutation. Geocoding happens before the lock is taken.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use civic_common::geo::is_valid_coordinate;
use civic_common::time::{self, minutes_between};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use super::dedup::{find_duplicate, Candidate, Grouping};
use super::model::{
    coordinate_label, new_incident_id, normalize_description, normalize_notes, normalize_type, Actor, Incident,
    IncidentStatus, Severity,
};
use super::priority::{score_at, PriorityFactors};
use super::timeline::{
    self, ACTION_AUTO_ESCALATED, ACTION_CONFIRMATION, ACTION_DUPLICATE_GROUPED, ACTION_NOTES_UPDATED,
    ACTION_REPORTED, ACTION_STATUS_UPDATED,
};
use crate::error::{Error, Result};
use crate::geocode::Geocoder;
use crate::persistence::{encode_records, load_records, save_json, BlobStore, DirtyFlag, Flush, INCIDENTS_KEY};
use crate::polls::{PollResults, PollStatus, CROWD_CONFIRM_THRESHOLD};

/// Body of `POST /api/incidents`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIncidentInput {
    #[serde(default, rename = "type")]
    pub incident_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    pub longitude: Option<f64>,
    /// Used only when coordinates are not supplied
    #[serde(default)]
    pub location_name: Option<String>,
}

/// Coordinate given as a JSON number or a numeric string; blank means absent
fn coordinate<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid coordinate \"{}\"", text))),
    }
}

/// Read-time projection of an incident
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentView {
    #[serde(flatten)]
    pub incident: Incident,
    pub age_minutes: u64,
    pub priority_score: i64,
    pub priority_factors: PriorityFactors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_status: Option<PollStatus>,
}

impl IncidentView {
    pub fn with_poll_status(mut self, status: PollStatus) -> Self {
        self.poll_status = Some(status);
        self
    }

    /// Blank responder-only fields for non-admin callers
    pub fn redact_internal(mut self) -> Self {
        self.incident.internal_notes.clear();
        self
    }
}

/// Decorate an incident with its priority as of `now`
pub fn present_at(incident: &Incident, now: DateTime<Utc>) -> IncidentView {
    let priority = score_at(incident, now);
    IncidentView {
        incident: incident.clone(),
        age_minutes: minutes_between(incident.timestamp, now),
        priority_score: priority.score,
        priority_factors: priority.factors,
        poll_status: None,
    }
}

pub fn present(incident: &Incident) -> IncidentView {
    present_at(incident, time::now())
}

/// Board order: highest score first, newest report first on ties
fn sort_for_board(incidents: &mut [Incident], now: DateTime<Utc>) {
    incidents.sort_by_cached_key(|incident| {
        (
            std::cmp::Reverse(score_at(incident, now).score),
            std::cmp::Reverse(incident.timestamp),
        )
    });
}

/// Keeps an incident from being deleted while it is held
pub struct IncidentHold<'a> {
    _guard: RwLockReadGuard<'a, HashMap<String, Incident>>,
}

struct ResolvedLocation {
    latitude: f64,
    longitude: f64,
    display_location: Option<String>,
}

pub struct IncidentStore {
    incidents: RwLock<HashMap<String, Incident>>,
    geocoder: Arc<dyn Geocoder>,
    blob: Arc<dyn BlobStore>,
    dirty: DirtyFlag,
    /// Persisted records that failed to decode; written back untouched
    unreadable: Vec<serde_json::Value>,
}

impl IncidentStore {
    /// Load persisted incidents (empty on first boot)
    pub async fn load(blob: Arc<dyn BlobStore>, geocoder: Arc<dyn Geocoder>) -> Result<Self> {
        let decoded = load_records::<Incident>(blob.as_ref(), INCIDENTS_KEY).await?;
        info!(
            records = decoded.records.len(),
            unreadable = decoded.skipped.len(),
            "Loaded incidents"
        );
        let mut store = Self::from_records(decoded.records, blob, geocoder);
        store.unreadable = decoded.skipped;
        Ok(store)
    }

    pub fn from_records(records: Vec<Incident>, blob: Arc<dyn BlobStore>, geocoder: Arc<dyn Geocoder>) -> Self {
        let incidents = records
            .into_iter()
            .filter(|incident| !incident.id.is_empty())
            .map(|mut incident| {
                timeline::normalize(&mut incident);
                if incident.group_id.is_empty() {
                    incident.group_id = incident.id.clone();
                }
                (incident.id.clone(), incident)
            })
            .collect();

        Self {
            incidents: RwLock::new(incidents),
            geocoder,
            blob,
            dirty: DirtyFlag::new(),
            unreadable: Vec::new(),
        }
    }

    pub fn dirty_flag(&self) -> DirtyFlag {
        self.dirty.clone()
    }

    async fn resolve_location(&self, input: &CreateIncidentInput) -> Result<ResolvedLocation> {
        if let (Some(latitude), Some(longitude)) = (input.latitude, input.longitude) {
            if !is_valid_coordinate(latitude, longitude) {
                return Err(Error::InvalidLocation(format!(
                    "Coordinates out of range: {}, {}",
                    latitude, longitude
                )));
            }
            return Ok(ResolvedLocation {
                latitude,
                longitude,
                display_location: None,
            });
        }

        let place_name = input
            .location_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::InvalidLocation(
                    "Location required: enter a location name, use GPS, or provide coordinates".to_string(),
                )
            })?;

        let place = self.geocoder.forward(place_name).await.ok_or_else(|| {
            Error::InvalidLocation(format!(
                "Unable to locate \"{}\". Try a different location name or enter coordinates",
                place_name
            ))
        })?;

        if !is_valid_coordinate(place.latitude, place.longitude) {
            return Err(Error::InvalidLocation(format!("Unable to locate \"{}\"", place_name)));
        }

        Ok(ResolvedLocation {
            latitude: place.latitude,
            longitude: place.longitude,
            display_location: Some(place.display_name).filter(|name| !name.trim().is_empty()),
        })
    }

    /// Report a new incident
    pub async fn create(&self, input: CreateIncidentInput) -> Result<Incident> {
        let location = self.resolve_location(&input).await?;

        let display_location = match location.display_location {
            Some(name) => name,
            None => match self.geocoder.reverse(location.latitude, location.longitude).await {
                Some(name) => name,
                None => {
                    debug!("Reverse lookup unavailable, using coordinate label");
                    coordinate_label(location.latitude, location.longitude)
                }
            },
        };

        let severity = match input.severity.as_deref() {
            Some(raw) => Severity::parse(raw).unwrap_or_else(|| {
                debug!(severity = raw, "Unrecognized severity, using default");
                Severity::default()
            }),
            None => Severity::default(),
        };

        let now = time::now();
        let mut incident = Incident {
            id: new_incident_id(),
            incident_type: normalize_type(input.incident_type.as_deref()),
            description: normalize_description(input.description.as_deref()),
            severity,
            latitude: location.latitude,
            longitude: location.longitude,
            display_location,
            timestamp: now,
            updated_at: now,
            status: IncidentStatus::Unverified,
            confirmation_count: 0,
            internal_notes: String::new(),
            timeline: Vec::new(),
            duplicate_of: None,
            group_id: String::new(),
        };

        let mut incidents = self.incidents.write().await;

        let mut existing: Vec<&Incident> = incidents.values().collect();
        existing.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        let grouping = match find_duplicate(&Candidate::from(&incident), existing) {
            Some(matched) => Grouping::linked_to(matched),
            None => Grouping::root(&incident.id),
        };
        incident.duplicate_of = grouping.duplicate_of;
        incident.group_id = grouping.group_id;

        let reported = format!("Reported as {} ({})", incident.incident_type, incident.severity);
        timeline::append_at(&mut incident, now, Actor::System, ACTION_REPORTED, reported);
        if let Some(original) = incident.duplicate_of.clone() {
            timeline::append_at(
                &mut incident,
                now,
                Actor::System,
                ACTION_DUPLICATE_GROUPED,
                format!("Grouped with {}", original),
            );
        }

        incidents.insert(incident.id.clone(), incident.clone());
        drop(incidents);

        info!(
            incident_id = %incident.id,
            group_id = %incident.group_id,
            incident_type = %incident.incident_type,
            severity = %incident.severity,
            duplicate = incident.duplicate_of.is_some(),
            "Incident reported"
        );
        self.dirty.mark();
        Ok(incident)
    }

    /// Apply `f` to one incident under the write lock, then mark dirty
    async fn mutate<F>(&self, id: &str, f: F) -> Result<Incident>
    where
        F: FnOnce(&mut Incident, DateTime<Utc>),
    {
        let mut incidents = self.incidents.write().await;
        let incident = incidents.get_mut(id).ok_or_else(|| Error::incident_not_found(id))?;
        let now = time::now();
        f(incident, now);
        incident.touch(now);
        let updated = incident.clone();
        drop(incidents);

        self.dirty.mark();
        Ok(updated)
    }

    /// Legacy crowd confirmation counter
    pub async fn confirm(&self, id: &str) -> Result<Incident> {
        let updated = self
            .mutate(id, |incident, now| {
                incident.confirmation_count = incident.confirmation_count.saturating_add(1);
                timeline::append_at(
                    incident,
                    now,
                    Actor::Crowd,
                    ACTION_CONFIRMATION,
                    format!("Confirmations: {}", incident.confirmation_count),
                );

                if incident.status == IncidentStatus::Unverified
                    && incident.confirmation_count >= CROWD_CONFIRM_THRESHOLD
                {
                    incident.status = IncidentStatus::CrowdConfirmed;
                    timeline::append_at(
                        incident,
                        now,
                        Actor::System,
                        ACTION_AUTO_ESCALATED,
                        format!(
                            "Reached {} confirmations → {}",
                            CROWD_CONFIRM_THRESHOLD,
                            IncidentStatus::CrowdConfirmed
                        ),
                    );
                }
            })
            .await?;

        info!(
            incident_id = %updated.id,
            confirmations = updated.confirmation_count,
            status = %updated.status,
            "Confirmation received"
        );
        Ok(updated)
    }

    /// Responder status change; unrecognized values fall back to `unverified`
    pub async fn update_status(&self, id: &str, status: &str) -> Result<Incident> {
        let next = IncidentStatus::normalize(Some(status));
        if IncidentStatus::parse(status).is_none() {
            debug!(incident_id = id, status, "Unrecognized status, using {}", next);
        }

        let updated = self
            .mutate(id, |incident, now| {
                let prev = incident.status;
                incident.status = next;
                timeline::append_at(
                    incident,
                    now,
                    Actor::Responder,
                    ACTION_STATUS_UPDATED,
                    format!("{} → {}", prev, next),
                );
            })
            .await?;

        info!(incident_id = %updated.id, status = %updated.status, "Status updated");
        Ok(updated)
    }

    pub async fn update_notes(&self, id: &str, notes: &str) -> Result<Incident> {
        let notes = normalize_notes(notes);
        let updated = self
            .mutate(id, |incident, now| {
                incident.internal_notes = notes;
                timeline::append_at(
                    incident,
                    now,
                    Actor::Responder,
                    ACTION_NOTES_UPDATED,
                    "Internal notes updated",
                );
            })
            .await?;

        info!(incident_id = %updated.id, "Internal notes updated");
        Ok(updated)
    }

    /// Poll-driven escalation.
    ///
    /// Moves an unverified incident to `crowd_confirmed` once the ledger holds
    /// enough confirm votes. Returns None when the incident no longer exists.
    ///
    /// The transition is recorded as `status_auto_escalated` by `system`.
    /// Timelines written by earlier releases carry the same transition as
    /// `status_updated` by `responder` with detail `unverified → crowd_confirmed`;
    /// clients should accept both shapes.
    pub async fn apply_poll_results(&self, id: &str, results: &PollResults) -> Option<Incident> {
        let mut incidents = self.incidents.write().await;
        let incident = incidents.get_mut(id)?;

        if !results.reaches_crowd_threshold() || incident.status != IncidentStatus::Unverified {
            return Some(incident.clone());
        }

        let now = time::now();
        incident.status = IncidentStatus::CrowdConfirmed;
        timeline::append_at(
            incident,
            now,
            Actor::System,
            ACTION_AUTO_ESCALATED,
            format!(
                "Poll reached {} confirmations → {}",
                results.confirm,
                IncidentStatus::CrowdConfirmed
            ),
        );
        incident.touch(now);
        let updated = incident.clone();
        drop(incidents);

        info!(incident_id = %updated.id, confirm_votes = results.confirm, "Escalated by poll");
        self.dirty.mark();
        Some(updated)
    }

    /// Hard delete; irreversible
    pub async fn delete(&self, id: &str) -> Result<Incident> {
        let removed = self
            .incidents
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::incident_not_found(id))?;

        if removed.is_group_root() {
            let orphans = self.group_members(&removed.id).await.len();
            if orphans > 0 {
                warn!(incident_id = %removed.id, orphans, "Deleted the root of a duplicate group");
            }
        }

        info!(incident_id = %removed.id, "Incident deleted");
        self.dirty.mark();
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> Option<Incident> {
        self.incidents.read().await.get(id).cloned()
    }

    /// Hold `id` in place until the returned guard is dropped.
    ///
    /// Mutations of the collection wait for the hold, so work recorded
    /// against the incident elsewhere cannot race its deletion.
    pub async fn hold(&self, id: &str) -> Result<IncidentHold<'_>> {
        let guard = self.incidents.read().await;
        if !guard.contains_key(id) {
            return Err(Error::incident_not_found(id));
        }
        Ok(IncidentHold { _guard: guard })
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.incidents.read().await.contains_key(id)
    }

    /// Incidents changed after `since` (all when None), in board order as of `now`
    pub async fn list_all_at(&self, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<Incident> {
        let mut items: Vec<Incident> = self
            .incidents
            .read()
            .await
            .values()
            .filter(|incident| since.map_or(true, |since| incident.updated_at > since))
            .cloned()
            .collect();
        sort_for_board(&mut items, now);
        items
    }

    pub async fn list_all(&self, since: Option<DateTime<Utc>>) -> Vec<Incident> {
        self.list_all_at(since, time::now()).await
    }

    /// Every incident whose group root is `group_id`, oldest first
    pub async fn group_members(&self, group_id: &str) -> Vec<Incident> {
        let mut members: Vec<Incident> = self
            .incidents
            .read()
            .await
            .values()
            .filter(|incident| incident.group_root() == group_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        members
    }

    pub async fn len(&self) -> usize {
        self.incidents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.incidents.read().await.is_empty()
    }
}

#[async_trait]
impl Flush for IncidentStore {
    fn collection(&self) -> &'static str {
        INCIDENTS_KEY
    }

    async fn flush(&self) -> civic_common::Result<()> {
        let snapshot = self.list_all(None).await;
        let values = encode_records(&snapshot, &self.unreadable)?;
        save_json(self.blob.as_ref(), INCIDENTS_KEY, &values).await
    }
}
