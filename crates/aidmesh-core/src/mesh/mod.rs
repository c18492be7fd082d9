//! Mesh host relay: protocol, host-side proxy and endpoint, peer-side
//! client.
//!
//! When a device is the group host it exposes a local endpoint mirroring
//! the subset of backend report operations peers need. The proxy logic is
//! transport-agnostic (bytes in, bytes out); the endpoint and client wire
//! it over iroh QUIC streams.

pub mod client;
pub mod endpoint;
pub mod protocol;
pub mod proxy;

pub use client::{HostGateway, LoopbackHostGateway, MeshHostClient};
pub use endpoint::{HostEndpoint, ReportProtocolHandler};
pub use protocol::{
    MeshRequest, MeshResponse, MeshWireRequest, MeshWireResponse, REPORT_ALPN,
};
pub use proxy::HostProxy;
