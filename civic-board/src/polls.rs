//! Poll/verification ledger
//!
//! One response per `(incident_id, user_id)`. The uniqueness check and the
//! append happen under the same write lock, so concurrent submissions from
//! one user cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::persistence::{decode_records, encode_records, load_json, save_json, BlobStore, DirtyFlag, Flush, POLL_RESPONSES_KEY};

/// Votes needed before the crowd can escalate an unverified incident
pub const CROWD_CONFIRM_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Confirm,
    Deny,
    Unsure,
}

impl VoteChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::Confirm => "confirm",
            VoteChoice::Deny => "deny",
            VoteChoice::Unsure => "unsure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "confirm" => Some(VoteChoice::Confirm),
            "deny" => Some(VoteChoice::Deny),
            "unsure" => Some(VoteChoice::Unsure),
            _ => None,
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub id: String,
    pub incident_id: String,
    pub user_id: String,
    pub choice: VoteChoice,
    pub timestamp: DateTime<Utc>,
}

/// Tally for one incident
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    pub total: u32,
    pub confirm: u32,
    pub deny: u32,
    pub unsure: u32,
    /// Percentage of responses that confirm, rounded half away from zero
    pub confidence_score: u32,
}

impl PollResults {
    pub fn tally<'a, I>(responses: I) -> Self
    where
        I: IntoIterator<Item = &'a PollResponse>,
    {
        let mut results = PollResults::default();
        for response in responses {
            results.total += 1;
            match response.choice {
                VoteChoice::Confirm => results.confirm += 1,
                VoteChoice::Deny => results.deny += 1,
                VoteChoice::Unsure => results.unsure += 1,
            }
        }
        if results.total > 0 {
            results.confidence_score =
                (f64::from(results.confirm) / f64::from(results.total) * 100.0).round() as u32;
        }
        results
    }

    pub fn reaches_crowd_threshold(&self) -> bool {
        self.confirm >= CROWD_CONFIRM_THRESHOLD
    }
}

/// Caller-specific poll projection attached to a presented incident
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStatus {
    pub has_voted: bool,
    pub user_choice: Option<VoteChoice>,
    /// Only populated for admins
    pub results: Option<PollResults>,
}

pub struct PollLedger {
    responses: RwLock<HashMap<String, Vec<PollResponse>>>,
    blob: Arc<dyn BlobStore>,
    dirty: DirtyFlag,
    /// Per-incident records that failed to decode; written back untouched
    unreadable: HashMap<String, Vec<serde_json::Value>>,
}

impl PollLedger {
    /// Load persisted responses; malformed records are set aside
    pub async fn load(blob: Arc<dyn BlobStore>) -> Result<Self> {
        let raw: HashMap<String, Vec<serde_json::Value>> =
            load_json(blob.as_ref(), POLL_RESPONSES_KEY).await?.unwrap_or_default();

        let mut responses = HashMap::new();
        let mut unreadable = HashMap::new();
        let mut total = 0;
        for (incident_id, values) in raw {
            let decoded = decode_records::<PollResponse>(POLL_RESPONSES_KEY, values);
            total += decoded.records.len();
            if !decoded.skipped.is_empty() {
                unreadable.insert(incident_id.clone(), decoded.skipped);
            }
            if !decoded.records.is_empty() {
                responses.insert(incident_id, decoded.records);
            }
        }
        info!(records = total, incidents = responses.len(), "Loaded poll responses");

        Ok(Self {
            responses: RwLock::new(responses),
            blob,
            dirty: DirtyFlag::new(),
            unreadable,
        })
    }

    pub fn dirty_flag(&self) -> DirtyFlag {
        self.dirty.clone()
    }

    /// Record a vote.
    ///
    /// Errors: [`Error::AlreadyVoted`] when the user already responded,
    /// then [`Error::InvalidChoice`] for an unknown choice.
    pub async fn submit_vote(&self, incident_id: &str, user_id: &str, choice: &str) -> Result<PollResponse> {
        let mut responses = self.responses.write().await;
        let already = responses
            .get(incident_id)
            .is_some_and(|list| list.iter().any(|r| r.user_id == user_id));
        if already {
            return Err(Error::AlreadyVoted {
                incident_id: incident_id.to_string(),
            });
        }

        let choice = VoteChoice::parse(choice).ok_or_else(|| {
            Error::InvalidChoice("Invalid choice. Must be confirm, deny, or unsure".to_string())
        })?;

        let response = PollResponse {
            id: format!("poll_{}", Uuid::new_v4().simple()),
            incident_id: incident_id.to_string(),
            user_id: user_id.to_string(),
            choice,
            timestamp: Utc::now(),
        };
        responses
            .entry(incident_id.to_string())
            .or_default()
            .push(response.clone());
        drop(responses);

        info!(incident_id, user_id, %choice, "Poll response recorded");
        self.dirty.mark();
        Ok(response)
    }

    pub async fn get_results(&self, incident_id: &str) -> PollResults {
        let responses = self.responses.read().await;
        match responses.get(incident_id) {
            Some(list) => PollResults::tally(list),
            None => PollResults::default(),
        }
    }

    pub async fn has_voted(&self, incident_id: &str, user_id: &str) -> bool {
        self.get_vote(incident_id, user_id).await.is_some()
    }

    pub async fn get_vote(&self, incident_id: &str, user_id: &str) -> Option<PollResponse> {
        let responses = self.responses.read().await;
        responses
            .get(incident_id)?
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned()
    }

    pub async fn status_for(&self, incident_id: &str, user_id: &str, include_results: bool) -> PollStatus {
        let vote = self.get_vote(incident_id, user_id).await;
        let results = if include_results {
            Some(self.get_results(incident_id).await)
        } else {
            None
        };
        PollStatus {
            has_voted: vote.is_some(),
            user_choice: vote.map(|v| v.choice),
            results,
        }
    }
}

#[async_trait]
impl Flush for PollLedger {
    fn collection(&self) -> &'static str {
        POLL_RESPONSES_KEY
    }

    async fn flush(&self) -> civic_common::Result<()> {
        let responses = self.responses.read().await;
        let mut snapshot: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
        for id in responses.keys().chain(self.unreadable.keys()) {
            if snapshot.contains_key(id) {
                continue;
            }
            let live = responses.get(id).map(Vec::as_slice).unwrap_or_default();
            let kept = self.unreadable.get(id).map(Vec::as_slice).unwrap_or_default();
            if live.is_empty() && kept.is_empty() {
                continue;
            }
            snapshot.insert(id.clone(), encode_records(live, kept)?);
        }
        drop(responses);
        save_json(self.blob.as_ref(), POLL_RESPONSES_KEY, &snapshot).await
    }
}
