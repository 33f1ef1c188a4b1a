// fleetwatch-api: wire layer for the monitoring backend (STOMP over WebSocket + REST)

pub mod error;
pub mod rest;
pub mod stomp;
pub mod transport;
pub mod types;
pub mod websocket;

pub use error::Error;
pub use rest::RestClient;
pub use stomp::{Frame, FrameCommand};
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    AgentDto, ContainerDetailDto, ContainerDto, FeedRequest, OneOrMany, PortDto, WireId,
    WireTimestamp,
};
pub use websocket::{InboundFrame, ReconnectConfig, StompConfig, StompHandle, TransportEvent};
