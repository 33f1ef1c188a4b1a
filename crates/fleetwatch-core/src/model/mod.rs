// ── Domain model ──
//
// View-model types consumers render. Wire DTOs live in fleetwatch-api and
// are mapped into these by `crate::convert`.

pub mod agent;
pub mod container;
pub mod entity_id;
pub mod user;

pub use agent::{AgentRecord, AgentStatus, AgentUpdate};
pub use container::{ContainerDetail, ContainerRecord, ContainerState, ContainerUpdate, HealthStatus};
pub use entity_id::EntityId;
pub use user::CurrentUser;
