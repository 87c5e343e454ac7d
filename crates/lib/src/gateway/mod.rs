//! Gateway: HTTP + WebSocket front door for the operation registry.
//!
//! Single port serves HTTP and WebSocket. Protocol: first request must be `connect`;
//! then requests (req/res) in both directions and events.

mod protocol;
mod server;

pub use protocol::{
    ClientCapabilities, ConnectAuth, ConnectClient, ConnectParams, HelloOk, RootsCapability,
    RootsListResult, ToolCallParams, WsRequest, WsResponse,
};
pub use server::{process_factory, run_gateway, run_gateway_with, BackendFactory, GatewayState};
