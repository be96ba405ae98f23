//! Incident ranking, deduplication and lifecycle

pub mod dedup;
pub mod model;
pub mod priority;
pub mod store;
pub mod timeline;

pub use model::{Actor, Incident, IncidentStatus, Severity, TimelineEntry};
pub use priority::{score, score_at, Priority, PriorityFactors};
pub use store::{present, present_at, CreateIncidentInput, IncidentStore, IncidentView};
