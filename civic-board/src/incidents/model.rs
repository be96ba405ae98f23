//! Incident records and input normalization

use chrono::{DateTime, Utc};
use civic_common::text::{clamp_opt, clamp_text};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MAX_TYPE_CHARS: usize = 40;
pub const MAX_DESCRIPTION_CHARS: usize = 220;
pub const MAX_NOTES_CHARS: usize = 900;
pub const DEFAULT_INCIDENT_TYPE: &str = "general";

/// Reporter-assessed severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Critical,
    #[default]
    #[serde(other)]
    Attention,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Attention => "attention",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "attention" => Some(Severity::Attention),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Lenient parse: anything unrecognized becomes `attention`
    pub fn normalize(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    CrowdConfirmed,
    Verified,
    Responding,
    Resolved,
    #[default]
    #[serde(other)]
    Unverified,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Unverified => "unverified",
            IncidentStatus::CrowdConfirmed => "crowd_confirmed",
            IncidentStatus::Verified => "verified",
            IncidentStatus::Responding => "responding",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "unverified" => Some(IncidentStatus::Unverified),
            "crowd_confirmed" => Some(IncidentStatus::CrowdConfirmed),
            "verified" => Some(IncidentStatus::Verified),
            "responding" => Some(IncidentStatus::Responding),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }

    /// Lenient parse: anything unrecognized becomes `unverified`
    pub fn normalize(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who caused a timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Crowd,
    Responder,
}

/// One audit record; never edited after it is appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(alias = "ts")]
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action: String,
    #[serde(default)]
    pub detail: String,
}

/// A reported incident as stored and persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    pub latitude: f64,
    pub longitude: f64,
    pub display_location: String,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub confirmation_count: u32,
    #[serde(default)]
    pub internal_notes: String,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default)]
    pub group_id: String,
}

impl Incident {
    /// Root of this incident's duplicate cluster
    pub fn group_root(&self) -> &str {
        if self.group_id.is_empty() {
            &self.id
        } else {
            &self.group_id
        }
    }

    pub fn is_group_root(&self) -> bool {
        self.group_root() == self.id
    }

    /// Advance `updated_at`, never moving it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Generate a fresh incident id
pub fn new_incident_id() -> String {
    format!("inc_{}", Uuid::new_v4().simple())
}

/// Lowercased, clamped category; empty input becomes `general`
pub fn normalize_type(value: Option<&str>) -> String {
    let t = clamp_opt(value, MAX_TYPE_CHARS);
    if t.is_empty() {
        DEFAULT_INCIDENT_TYPE.to_string()
    } else {
        t.to_lowercase()
    }
}

pub fn normalize_description(value: Option<&str>) -> String {
    clamp_opt(value, MAX_DESCRIPTION_CHARS)
}

pub fn normalize_notes(value: &str) -> String {
    clamp_text(value, MAX_NOTES_CHARS)
}

/// Display string used when reverse lookup yields nothing
pub fn coordinate_label(latitude: f64, longitude: f64) -> String {
    format!("Lat: {:.4}, Lng: {:.4}", latitude, longitude)
}
