//! Configuration for the SDK client and the command-line driver.
//!
//! The core consumes an immutable [`ClientConfig`] struct and never reads
//! the environment itself. The driver glue in this module bridges the two
//! conventional sources: well-known environment variables
//! ([`ClientConfig::from_env`]) and `clap`-parsed CLI flags
//! ([`ClientConfig::from_args`]), with CLI values taking precedence.

use crate::defaults;
use crate::error::{Result, SdkError};
use clap::builder::styling::{AnsiColor, Styles};
use clap::Parser;
use std::time::Duration;
use tracing::warn;

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Agentlink service driver - registers functions with a local Agent daemon
///
/// The driver loads its configuration from the conventional environment
/// variables (GAME_ID, ENV, SERVICE_ID, AGENT_ADDR, ...) and lets any of
/// them be overridden on the command line.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Identity of the game title this service belongs to
    #[arg(long, help_heading = "Identity")]
    pub game_id: Option<String>,

    /// Deployment environment (e.g. dev, staging, prod)
    #[arg(long, help_heading = "Identity")]
    pub env: Option<String>,

    /// Service identity sent in the registration handshake
    #[arg(long, help_heading = "Identity")]
    pub service_id: Option<String>,

    /// Address of the Agent's request socket (tcp://host:port or ipc://path)
    #[arg(long, help_heading = "Transport")]
    pub agent_addr: Option<String>,

    /// Address the reply server binds to; port 0 requests a kernel-assigned port
    #[arg(long, help_heading = "Transport")]
    pub listen: Option<String>,

    /// Skip TLS channel setup
    #[arg(long, help_heading = "Transport")]
    pub insecure: bool,

    /// Reconnect automatically after a lost session
    #[arg(long, help_heading = "Lifecycle")]
    pub auto_reconnect: bool,

    /// Seconds between reconnect attempts
    #[arg(long, help_heading = "Lifecycle")]
    pub reconnect_interval_seconds: Option<u64>,

    /// Reconnect attempt cap (0 = unlimited)
    #[arg(long, help_heading = "Lifecycle")]
    pub reconnect_max_attempts: Option<u32>,

    /// Silence all user-facing informational output on stdout
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity.
    ///
    /// Can be used multiple times to increase detail:
    ///  -v: debug
    ///  -vv and more: trace
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Detailed log destination: a file path, or "stderr"
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<String>,
}

/// Immutable configuration consumed by [`crate::AgentClient`] at
/// construction time.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity sent in the registration handshake body
    pub game_id: String,
    pub env: String,
    pub service_id: String,

    /// Address of the Agent's reply socket used by the request transport
    pub agent_addr: String,
    /// Address the reply server binds to; empty means the implementation
    /// default, port 0 means kernel-assigned
    pub local_listen: String,

    /// If true, skip TLS channel setup
    pub insecure: bool,
    /// TLS material, used iff `insecure` is false
    pub cert_file: String,
    pub key_file: String,
    pub ca_file: String,
    pub server_name: String,

    /// Attempt reconnection after disconnect
    pub auto_reconnect: bool,
    /// Base delay between reconnect attempts
    pub reconnect_interval: Duration,
    /// 0 = unlimited; otherwise a cap
    pub reconnect_max_attempts: u32,
    /// If true, `connect()` returns only after the handshake has succeeded
    /// or exhausted retries; if false it returns immediately and the
    /// handshake runs in the background
    pub blocking_connect: bool,

    /// Interval between heartbeats to the Agent
    pub heartbeat_interval: Duration,
    /// Time allowed for the serve loop to drain on shutdown
    pub shutdown_timeout: Duration,
    /// Send/receive deadline of the request transport
    pub call_timeout: Duration,
    /// Receive poll interval of the reply server
    pub recv_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            game_id: String::new(),
            env: String::new(),
            service_id: String::new(),
            agent_addr: defaults::AGENT_ADDR.to_string(),
            local_listen: defaults::LOCAL_LISTEN.to_string(),
            insecure: false,
            cert_file: String::new(),
            key_file: String::new(),
            ca_file: String::new(),
            server_name: String::new(),
            auto_reconnect: true,
            reconnect_interval: defaults::RECONNECT_INTERVAL,
            reconnect_max_attempts: defaults::RECONNECT_MAX_ATTEMPTS,
            blocking_connect: true,
            heartbeat_interval: defaults::HEARTBEAT_INTERVAL,
            shutdown_timeout: defaults::SHUTDOWN_TIMEOUT,
            call_timeout: defaults::CALL_TIMEOUT,
            recv_timeout: defaults::RECV_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from the conventional environment variables.
    ///
    /// Unset variables keep their defaults; unparseable values are reported
    /// and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup (testable core of
    /// [`from_env`](Self::from_env))
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("GAME_ID") {
            config.game_id = value;
        }
        if let Some(value) = lookup("ENV") {
            config.env = value;
        }
        if let Some(value) = lookup("SERVICE_ID") {
            config.service_id = value;
        }
        if let Some(value) = lookup("AGENT_ADDR") {
            config.agent_addr = value;
        }
        if let Some(value) = lookup("CERT_FILE") {
            config.cert_file = value;
        }
        if let Some(value) = lookup("KEY_FILE") {
            config.key_file = value;
        }
        if let Some(value) = lookup("CA_FILE") {
            config.ca_file = value;
        }
        if let Some(value) = lookup("SERVER_NAME") {
            config.server_name = value;
        }
        if let Some(value) = lookup("INSECURE") {
            if let Some(flag) = parse_bool("INSECURE", &value) {
                config.insecure = flag;
            }
        }
        if let Some(value) = lookup("AUTO_RECONNECT") {
            if let Some(flag) = parse_bool("AUTO_RECONNECT", &value) {
                config.auto_reconnect = flag;
            }
        }
        if let Some(value) = lookup("RECONNECT_INTERVAL_SECONDS") {
            match value.parse::<u64>() {
                Ok(seconds) => config.reconnect_interval = Duration::from_secs(seconds),
                Err(_) => warn!("ignoring unparseable RECONNECT_INTERVAL_SECONDS={value:?}"),
            }
        }
        if let Some(value) = lookup("RECONNECT_MAX_ATTEMPTS") {
            match value.parse::<u32>() {
                Ok(attempts) => config.reconnect_max_attempts = attempts,
                Err(_) => warn!("ignoring unparseable RECONNECT_MAX_ATTEMPTS={value:?}"),
            }
        }

        config
    }

    /// Environment configuration with CLI flags layered on top
    pub fn from_args(args: &Args) -> Self {
        let mut config = Self::from_env();

        if let Some(ref value) = args.game_id {
            config.game_id = value.clone();
        }
        if let Some(ref value) = args.env {
            config.env = value.clone();
        }
        if let Some(ref value) = args.service_id {
            config.service_id = value.clone();
        }
        if let Some(ref value) = args.agent_addr {
            config.agent_addr = value.clone();
        }
        if let Some(ref value) = args.listen {
            config.local_listen = value.clone();
        }
        if args.insecure {
            config.insecure = true;
        }
        if args.auto_reconnect {
            config.auto_reconnect = true;
        }
        if let Some(seconds) = args.reconnect_interval_seconds {
            config.reconnect_interval = Duration::from_secs(seconds);
        }
        if let Some(attempts) = args.reconnect_max_attempts {
            config.reconnect_max_attempts = attempts;
        }

        config
    }

    /// Listen address with the empty-string default applied
    pub fn local_listen_or_default(&self) -> &str {
        if self.local_listen.is_empty() {
            defaults::LOCAL_LISTEN
        } else {
            &self.local_listen
        }
    }

    /// Check the invariants a client needs before connecting
    pub fn validate(&self) -> Result<()> {
        if self.service_id.is_empty() {
            return Err(SdkError::InvalidArgument(
                "service_id must be set".to_string(),
            ));
        }
        if self.agent_addr.is_empty() {
            return Err(SdkError::InvalidArgument(
                "agent_addr must be set".to_string(),
            ));
        }
        if !self.insecure
            && (self.cert_file.is_empty() || self.key_file.is_empty() || self.ca_file.is_empty())
        {
            return Err(SdkError::InvalidArgument(
                "cert_file, key_file and ca_file are required unless insecure is set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("ignoring unparseable boolean {key}={value:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_sane() {
        let config = ClientConfig::default();
        assert_eq!(config.agent_addr, defaults::AGENT_ADDR);
        assert_eq!(config.local_listen, defaults::LOCAL_LISTEN);
        assert!(!config.insecure);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_max_attempts, 0);
        assert_eq!(config.heartbeat_interval, defaults::HEARTBEAT_INTERVAL);
    }

    #[test]
    fn lookup_overrides_identity_and_transport() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GAME_ID", "skirmish"),
            ("ENV", "staging"),
            ("SERVICE_ID", "lobby"),
            ("AGENT_ADDR", "ipc:///run/agent.sock"),
            ("INSECURE", "true"),
            ("AUTO_RECONNECT", "0"),
            ("RECONNECT_INTERVAL_SECONDS", "2"),
            ("RECONNECT_MAX_ATTEMPTS", "7"),
        ]));

        assert_eq!(config.game_id, "skirmish");
        assert_eq!(config.env, "staging");
        assert_eq!(config.service_id, "lobby");
        assert_eq!(config.agent_addr, "ipc:///run/agent.sock");
        assert!(config.insecure);
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_secs(2));
        assert_eq!(config.reconnect_max_attempts, 7);
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("INSECURE", "maybe"),
            ("RECONNECT_INTERVAL_SECONDS", "soon"),
        ]));

        assert!(!config.insecure);
        assert_eq!(config.reconnect_interval, defaults::RECONNECT_INTERVAL);
    }

    #[test]
    fn empty_listen_address_falls_back_to_default() {
        let mut config = ClientConfig::default();
        config.local_listen = String::new();
        assert_eq!(config.local_listen_or_default(), defaults::LOCAL_LISTEN);

        config.local_listen = "tcp://0.0.0.0:4100".to_string();
        assert_eq!(config.local_listen_or_default(), "tcp://0.0.0.0:4100");
    }

    #[test]
    fn validate_requires_identity_and_tls_material() {
        let mut config = ClientConfig::default();
        assert!(matches!(
            config.validate(),
            Err(SdkError::InvalidArgument(_))
        ));

        config.service_id = "lobby".to_string();
        // secure mode without certificates is refused
        assert!(matches!(
            config.validate(),
            Err(SdkError::InvalidArgument(_))
        ));

        config.insecure = true;
        assert!(config.validate().is_ok());

        config.insecure = false;
        config.cert_file = "client.crt".to_string();
        config.key_file = "client.key".to_string();
        config.ca_file = "ca.crt".to_string();
        assert!(config.validate().is_ok());
    }
}
