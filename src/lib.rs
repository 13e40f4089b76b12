//! # Agentlink SDK
//!
//! Client SDK for connecting a game/application process to a local Agent
//! daemon over a framed request/reply messaging transport. The SDK registers
//! named callable functions with the Agent, serves incoming invocation
//! requests by dispatching them to user-supplied handlers, and lets the
//! process issue its own invocations through the Agent to reach functions
//! hosted elsewhere.

pub mod client;
pub mod config;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod messages;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use client::{AgentClient, ConnectionState};
pub use config::{Args, ClientConfig};
pub use error::{HandlerError, Result, SdkError};
pub use invoker::Invoker;
pub use registry::{FunctionDescriptor, Handler, HandlerRegistry};
pub use transport::{ReplyServer, RequestTransport};

/// The current version of the Agentlink SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default address of the Agent's request socket
    pub const AGENT_ADDR: &str = "tcp://127.0.0.1:19090";

    /// Default reply-server listen address (port 0 = kernel-assigned)
    pub const LOCAL_LISTEN: &str = "tcp://127.0.0.1:0";

    /// Default request-transport send/receive timeout
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default reply-server receive timeout (kept small so the serve loop
    /// polls its shutdown flag responsively)
    pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    /// Default interval between heartbeats to the Agent
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

    /// Consecutive missed heartbeats before the session is considered lost
    pub const HEARTBEAT_MISS_THRESHOLD: u32 = 3;

    /// Default delay between reconnect attempts
    pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

    /// Default reconnect attempt cap (0 = unlimited)
    pub const RECONNECT_MAX_ATTEMPTS: u32 = 0;

    /// Default time allowed for the serve loop to drain on shutdown
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
}
