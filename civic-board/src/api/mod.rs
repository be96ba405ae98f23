//! HTTP API handlers for civic-board

pub mod health;
pub mod incidents;
pub mod polls;
pub mod users;

pub use health::health_routes;
pub use incidents::incident_routes;
pub use polls::poll_routes;
pub use users::user_routes;
