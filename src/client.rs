//! Client lifecycle manager: registration handshake, heartbeat, reconnect,
//! and graceful shutdown.
//!
//! An [`AgentClient`] owns one outbound [`RequestTransport`] to the Agent
//! and one inbound [`ReplyServer`] the Agent invokes into. The handler
//! registry lives behind an `Arc` captured by the server's dispatch closure,
//! so the server never holds a reference back to the client.

use crate::config::ClientConfig;
use crate::defaults;
use crate::error::{HandlerError, Result, SdkError};
use crate::invoker::Invoker;
use crate::logging;
use crate::messages::{
    self, HeartbeatLocalRequest, HeartbeatLocalResponse, InvokeRequest, RegisterLocalRequest,
    RegisterLocalResponse, StartJobRequest,
};
use crate::protocol;
use crate::registry::{FunctionDescriptor, HandlerRegistry};
use crate::transport::{ReplyServer, RequestTransport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connection state of an [`AgentClient`].
///
/// Transitions are monotonic through the graph except for the
/// `Connecting ↔ Registered` cycle driven by session loss and reconnect.
/// `Closed` is terminal; a closed client is not reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Registered = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Registered,
            3 => ConnectionState::ShuttingDown,
            _ => ConnectionState::Closed,
        }
    }
}

/// Atomic state cell; heartbeat and reconnect read it without a lock and
/// transitions use compare-and-swap to avoid racing each other.
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

struct ClientInner {
    config: ClientConfig,
    /// Per-process identity carried in the registration body
    instance_id: String,
    state: StateCell,
    transport: RequestTransport,
    server: ReplyServer,
    registry: Arc<HandlerRegistry>,
    session: Mutex<Option<String>>,
    missed_heartbeats: AtomicU32,
    heartbeat_started: AtomicBool,
    reconnecting: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Lifecycle manager tying the transports, registry, heartbeat and
/// reconnect behavior together. Cheap to clone; clones share one client.
#[derive(Clone)]
pub struct AgentClient {
    inner: Arc<ClientInner>,
}

impl AgentClient {
    pub fn new(config: ClientConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::new());

        let dispatch_registry = registry.clone();
        let server = ReplyServer::new(
            config.local_listen_or_default().to_string(),
            config.recv_timeout,
            move |msg_type, req_id, body| dispatch(&dispatch_registry, msg_type, req_id, body),
        );
        let transport = RequestTransport::new(config.agent_addr.clone(), config.call_timeout);

        Self {
            inner: Arc::new(ClientInner {
                config,
                instance_id: Uuid::new_v4().to_string(),
                state: StateCell::new(),
                transport,
                server,
                registry,
                session: Mutex::new(None),
                missed_heartbeats: AtomicU32::new(0),
                heartbeat_started: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a function with the local registry.
    ///
    /// Returns `false` for an empty id or a duplicate registration. The
    /// function is advertised to the Agent at the next handshake; the
    /// registry survives reconnects, so re-registration is never needed.
    pub fn register<F>(&self, descriptor: FunctionDescriptor, handler: F) -> bool
    where
        F: Fn(&[u8], &[u8]) -> std::result::Result<Vec<u8>, HandlerError> + Send + Sync + 'static,
    {
        self.inner.registry.register(descriptor, Arc::new(handler))
    }

    /// Snapshot of the registered function descriptors
    pub fn functions(&self) -> Vec<FunctionDescriptor> {
        self.inner.registry.list()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    /// True iff the registration handshake has completed and the session
    /// is alive
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Registered
    }

    /// Session id assigned by the Agent, if registered
    pub fn session_id(&self) -> Option<String> {
        self.inner.session.lock().clone()
    }

    /// Resolved reply-server address, once the handshake has started it
    pub fn local_address(&self) -> Option<String> {
        self.inner.server.local_address()
    }

    /// Facade for issuing invocations through the Agent
    pub fn invoker(&self) -> Invoker {
        Invoker::new(self.clone())
    }

    pub(crate) fn transport(&self) -> &RequestTransport {
        &self.inner.transport
    }

    /// Connect to the Agent and perform the registration handshake.
    ///
    /// With `blocking_connect` the call returns once the handshake has
    /// succeeded or exhausted its retries; otherwise it returns immediately
    /// and the handshake proceeds in the background. Calling on an already
    /// connecting or registered client is a no-op; a closed client fails
    /// with `NotConnected`.
    pub async fn connect(&self) -> Result<()> {
        match self.inner.state.load() {
            ConnectionState::ShuttingDown | ConnectionState::Closed => {
                return Err(SdkError::NotConnected)
            }
            ConnectionState::Connecting | ConnectionState::Registered => return Ok(()),
            ConnectionState::Disconnected => {}
        }
        self.inner.config.validate()?;

        if !self
            .inner
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            // someone else won the race; treat like the no-op cases above
            return Ok(());
        }

        if self.inner.config.blocking_connect {
            self.connect_with_retries().await
        } else {
            let client = self.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = client.connect_with_retries().await {
                    warn!("background registration gave up: {e}");
                }
            });
            self.inner.tasks.lock().push(task);
            Ok(())
        }
    }

    /// Graceful stop: drain the serve loop, stop the background tasks,
    /// close the transport. The client ends up `Closed` and is not
    /// reusable. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        loop {
            let current = self.inner.state.load();
            if current == ConnectionState::Closed {
                return Ok(());
            }
            if self
                .inner
                .state
                .transition(current, ConnectionState::ShuttingDown)
            {
                break;
            }
        }

        info!("stopping agent client");

        // stop accepting new work and give in-flight replies time to drain
        let drained = tokio::time::timeout(
            self.inner.config.shutdown_timeout,
            self.inner.server.stop(),
        )
        .await;
        if drained.is_err() {
            warn!(
                "reply server did not drain within {:?}",
                self.inner.config.shutdown_timeout
            );
        }

        // heartbeat and reconnect observe ShuttingDown; abort cuts any
        // timer sleep short
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        self.inner.transport.close().await;
        *self.inner.session.lock() = None;
        self.inner.state.store(ConnectionState::Closed);
        info!("agent client closed");
        Ok(())
    }

    async fn connect_with_retries(&self) -> Result<()> {
        let cap = self.inner.config.reconnect_max_attempts;
        let mut attempts: u32 = 0;

        loop {
            if self.inner.state.load() != ConnectionState::Connecting {
                return Err(SdkError::NotConnected);
            }

            attempts += 1;
            match self.handshake().await {
                Ok(()) => {
                    self.ensure_heartbeat();
                    return Ok(());
                }
                Err(e) => {
                    warn!("registration attempt {attempts} failed: {e}");
                    self.inner.transport.close().await;

                    if !self.inner.config.auto_reconnect || (cap != 0 && attempts >= cap) {
                        self.inner
                            .state
                            .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                        return Err(e);
                    }
                    tokio::time::sleep(self.inner.config.reconnect_interval).await;
                }
            }
        }
    }

    /// Registration handshake: connect outbound, start the reply server,
    /// advertise the registered functions, record the session.
    async fn handshake(&self) -> Result<()> {
        self.inner.transport.connect().await?;
        self.inner.server.start().await?;

        let local_addr = self
            .inner
            .server
            .local_address()
            .ok_or_else(|| SdkError::InvalidArgument("reply server has no local address".into()))?;

        let body = messages::encode_body(&RegisterLocalRequest {
            service_id: self.inner.config.service_id.clone(),
            env: self.inner.config.env.clone(),
            game_id: self.inner.config.game_id.clone(),
            instance_id: self.inner.instance_id.clone(),
            local_addr,
            functions: self.inner.registry.list(),
        })?;

        let (_, reply) = self
            .inner
            .transport
            .call(protocol::MSG_REGISTER_LOCAL_REQUEST, &body)
            .await?;
        let ack: RegisterLocalResponse = messages::decode_body(&reply)?;

        if !self
            .inner
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Registered)
        {
            // shutdown raced the handshake; drop the half-open session
            return Err(SdkError::NotConnected);
        }

        info!(
            "registered with agent as session {} ({} function(s))",
            logging::mask(&ack.session_id),
            self.inner.registry.len()
        );
        *self.inner.session.lock() = Some(ack.session_id);
        self.inner.missed_heartbeats.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Start the heartbeat ticker once per client lifetime
    fn ensure_heartbeat(&self) {
        if self.inner.heartbeat_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = self.clone();
        let task = tokio::spawn(async move { client.heartbeat_loop().await });
        self.inner.tasks.lock().push(task);
    }

    async fn heartbeat_loop(&self) {
        let mut ticker = tokio::time::interval(self.inner.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval fires immediately; skip it so
        // the cadence starts one interval after registration
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.inner.state.load() {
                ConnectionState::ShuttingDown | ConnectionState::Closed => break,
                ConnectionState::Registered => {}
                _ => continue,
            }

            let Some(session_id) = self.session_id() else {
                continue;
            };
            let body = match messages::encode_body(&HeartbeatLocalRequest { session_id }) {
                Ok(body) => body,
                Err(e) => {
                    warn!("failed to encode heartbeat: {e}");
                    continue;
                }
            };

            match self
                .inner
                .transport
                .call(protocol::MSG_HEARTBEAT_LOCAL_REQUEST, &body)
                .await
            {
                Ok((_, reply)) => {
                    self.inner.missed_heartbeats.store(0, Ordering::SeqCst);
                    if let Ok(ack) = messages::decode_body::<HeartbeatLocalResponse>(&reply) {
                        debug!("heartbeat acknowledged for {}", logging::mask(&ack.session_id));
                    }
                }
                Err(SdkError::Timeout(_)) => {
                    let missed = self.inner.missed_heartbeats.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(
                        "heartbeat missed ({missed}/{})",
                        defaults::HEARTBEAT_MISS_THRESHOLD
                    );
                    if missed >= defaults::HEARTBEAT_MISS_THRESHOLD {
                        self.connection_lost().await;
                    }
                }
                Err(e) => {
                    warn!("heartbeat failed: {e}");
                    self.connection_lost().await;
                }
            }
        }
        debug!("heartbeat loop exited");
    }

    /// Session loss: tear down the outbound stream and either park in
    /// `Disconnected` or hand over to the reconnect supervisor.
    async fn connection_lost(&self) {
        self.inner.missed_heartbeats.store(0, Ordering::SeqCst);
        self.inner.transport.close().await;
        *self.inner.session.lock() = None;

        if !self
            .inner
            .state
            .transition(ConnectionState::Registered, ConnectionState::Connecting)
        {
            return;
        }

        if !self.inner.config.auto_reconnect {
            warn!("session with agent lost; auto reconnect is disabled");
            self.inner
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
            return;
        }

        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "session with agent lost; retrying every {:?}",
            self.inner.config.reconnect_interval
        );
        let client = self.clone();
        let task = tokio::spawn(async move {
            client.reconnect_loop().await;
            client.inner.reconnecting.store(false, Ordering::SeqCst);
        });
        self.inner.tasks.lock().push(task);
    }

    async fn reconnect_loop(&self) {
        let cap = self.inner.config.reconnect_max_attempts;
        let mut attempts: u32 = 0;

        loop {
            tokio::time::sleep(self.inner.config.reconnect_interval).await;
            if self.inner.state.load() != ConnectionState::Connecting {
                return;
            }

            attempts += 1;
            match self.handshake().await {
                Ok(()) => {
                    info!("re-registered with agent after {attempts} attempt(s)");
                    return;
                }
                Err(e) => {
                    warn!("reconnect attempt {attempts} failed: {e}");
                    self.inner.transport.close().await;
                    if cap != 0 && attempts >= cap {
                        warn!("giving up after {attempts} reconnect attempt(s)");
                        self.inner
                            .state
                            .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                        return;
                    }
                }
            }
        }
    }
}

/// Demultiplex one inbound frame to the registry.
///
/// Captured by the reply server as a plain closure over the registry `Arc`,
/// deliberately not over the client, so ownership stays acyclic.
fn dispatch(
    registry: &HandlerRegistry,
    msg_type: u32,
    req_id: u32,
    body: &[u8],
) -> Result<Vec<u8>> {
    match msg_type {
        protocol::MSG_INVOKE_REQUEST => {
            let call: InvokeRequest = messages::decode_body(body)?;
            run_function(
                registry,
                msg_type,
                req_id,
                &call.function_id,
                &call.context,
                &call.payload,
            )
        }
        protocol::MSG_START_JOB_REQUEST => {
            // agent-forwarded job execution; the job id stays with the agent
            let job: StartJobRequest = messages::decode_body(body)?;
            run_function(
                registry,
                msg_type,
                req_id,
                &job.function_id,
                &job.context,
                &job.payload,
            )
        }
        other => {
            warn!(
                "no local handling for {} (req {req_id}); replying empty",
                protocol::name_of(other)
            );
            Ok(Vec::new())
        }
    }
}

fn run_function(
    registry: &HandlerRegistry,
    msg_type: u32,
    req_id: u32,
    function_id: &str,
    context: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>> {
    let (descriptor, handler) = registry
        .lookup(function_id)
        .ok_or_else(|| HandlerError::new(format!("no function registered for {function_id:?}")))?;
    if !descriptor.enabled {
        return Err(HandlerError::new(format!("function {function_id:?} is disabled")).into());
    }
    debug!(
        "dispatching {} (req {req_id}) to {function_id:?}",
        protocol::name_of(msg_type)
    );
    handler(context, payload).map_err(SdkError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insecure_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.service_id = "unit".to_string();
        config.insecure = true;
        config
    }

    fn descriptor(id: &str) -> FunctionDescriptor {
        FunctionDescriptor::new(id)
    }

    #[test]
    fn state_cell_transitions_are_compare_and_swap() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), ConnectionState::Disconnected);

        assert!(cell.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert!(!cell.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert!(cell.transition(ConnectionState::Connecting, ConnectionState::Registered));
        assert_eq!(cell.load(), ConnectionState::Registered);
    }

    #[tokio::test]
    async fn new_client_is_disconnected() {
        let client = AgentClient::new(insecure_config());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert!(client.session_id().is_none());
        assert!(client.local_address().is_none());
    }

    #[tokio::test]
    async fn connect_requires_tls_material_unless_insecure() {
        let mut config = ClientConfig::default();
        config.service_id = "unit".to_string();
        let client = AgentClient::new(config);

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidArgument(_)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let client = AgentClient::new(insecure_config());
        assert!(client.register(descriptor("player.ban"), |_, p| Ok(p.to_vec())));
        assert!(!client.register(descriptor("player.ban"), |_, _| Ok(vec![])));
        assert_eq!(client.functions().len(), 1);
    }

    #[tokio::test]
    async fn stopped_client_is_closed_and_not_reusable() {
        let client = AgentClient::new(insecure_config());
        client.stop().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, SdkError::NotConnected));

        // stop stays idempotent on a closed client
        client.stop().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn dispatch_runs_the_registered_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.register(descriptor("echo"), Arc::new(|_, p| Ok(p.to_vec()))));

        let body = messages::encode_body(&InvokeRequest {
            function_id: "echo".to_string(),
            context: vec![],
            payload: vec![5, 6, 7],
        })
        .unwrap();

        let reply = dispatch(&registry, protocol::MSG_INVOKE_REQUEST, 1, &body).unwrap();
        assert_eq!(reply, vec![5, 6, 7]);
    }

    #[test]
    fn dispatch_runs_jobs_like_invocations() {
        let registry = HandlerRegistry::new();
        assert!(registry.register(
            descriptor("report.rebuild"),
            Arc::new(|_, p| Ok(p.to_vec())),
        ));

        let body = messages::encode_body(&StartJobRequest {
            function_id: "report.rebuild".to_string(),
            context: vec![],
            payload: vec![8],
        })
        .unwrap();

        let reply = dispatch(&registry, protocol::MSG_START_JOB_REQUEST, 3, &body).unwrap();
        assert_eq!(reply, vec![8]);
    }

    #[test]
    fn dispatch_rejects_unknown_and_disabled_functions() {
        let registry = HandlerRegistry::new();
        let mut disabled = descriptor("frozen");
        disabled.enabled = false;
        assert!(registry.register(disabled, Arc::new(|_, _| Ok(vec![]))));

        let unknown = messages::encode_body(&InvokeRequest {
            function_id: "missing".to_string(),
            context: vec![],
            payload: vec![],
        })
        .unwrap();
        assert!(matches!(
            dispatch(&registry, protocol::MSG_INVOKE_REQUEST, 1, &unknown),
            Err(SdkError::Handler(_))
        ));

        let frozen = messages::encode_body(&InvokeRequest {
            function_id: "frozen".to_string(),
            context: vec![],
            payload: vec![],
        })
        .unwrap();
        assert!(matches!(
            dispatch(&registry, protocol::MSG_INVOKE_REQUEST, 2, &frozen),
            Err(SdkError::Handler(_))
        ));
    }

    #[test]
    fn dispatch_answers_unexpected_types_with_an_empty_body() {
        let registry = HandlerRegistry::new();
        let reply = dispatch(&registry, protocol::MSG_LIST_LOCAL_REQUEST, 9, &[]).unwrap();
        assert!(reply.is_empty());
    }
}
