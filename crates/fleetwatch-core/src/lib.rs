// fleetwatch-core: real-time sync layer between fleetwatch-api and consumers (CLI/UI).

mod callback;

pub mod auth;
pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod fallback;
pub mod model;
pub mod store;
pub mod stream;
pub mod subscription;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::decode_current_user;
pub use config::{SyncConfig, TlsVerification};
pub use connection::{
    ConnectionManager, ConnectionState, ConnectionStatus, DEFAULT_MAX_RETRY, ErrorKind,
    ErrorRecord, ListenerId,
};
pub use error::{CoreError, SubscriptionError};
pub use fallback::{SnapshotSummary, should_use_fallback};
pub use store::{AgentStore, ContainerStore, DataStore, SelectedContainer};
pub use stream::{AgentFilter, ContainerFilter, EntityStream, Snapshot};
pub use subscription::{InboundMessage, SubscriptionHook, SubscriptionId, SubscriptionRegistry};
pub use sync::LiveSync;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AgentRecord, AgentStatus, AgentUpdate, ContainerDetail, ContainerRecord, ContainerState,
    ContainerUpdate, CurrentUser, EntityId, HealthStatus,
};
