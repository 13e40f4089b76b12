//! Shared test support: an in-process mock Agent.
//!
//! The mock serves the Agent side of the protocol on a reply socket —
//! answering registrations with a freshly minted session id and
//! acknowledging heartbeats — and can dial back into a registered client's
//! reply server the way a real Agent delivers invocations.
#![allow(dead_code)]

use agentlink::messages::{
    self, HeartbeatLocalRequest, HeartbeatLocalResponse, InvokeRequest, RegisterLocalRequest,
    RegisterLocalResponse, StartJobRequest, StartJobResponse,
};
use agentlink::transport::{ReplyServer, RequestTransport};
use agentlink::{protocol, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct MockAgent {
    server: ReplyServer,
    register_calls: Arc<AtomicUsize>,
    heartbeat_calls: Arc<AtomicUsize>,
    client_addr: Arc<Mutex<Option<String>>>,
}

impl MockAgent {
    /// Start a mock Agent on the given reply address (`tcp://127.0.0.1:0`
    /// picks a free port; see [`address`](Self::address) for the result).
    pub async fn start(address: &str) -> Result<Self> {
        let register_calls = Arc::new(AtomicUsize::new(0));
        let heartbeat_calls = Arc::new(AtomicUsize::new(0));
        let client_addr = Arc::new(Mutex::new(None));
        let session_id = uuid::Uuid::new_v4().to_string();

        let registers = register_calls.clone();
        let heartbeats = heartbeat_calls.clone();
        let peer_addr = client_addr.clone();
        let server = ReplyServer::new(
            address,
            Duration::from_millis(100),
            move |msg_type, _req_id, body| match msg_type {
                protocol::MSG_REGISTER_LOCAL_REQUEST => {
                    let request: RegisterLocalRequest = messages::decode_body(body)?;
                    registers.fetch_add(1, Ordering::SeqCst);
                    *peer_addr.lock().unwrap() = Some(request.local_addr);
                    messages::encode_body(&RegisterLocalResponse {
                        session_id: session_id.clone(),
                    })
                }
                protocol::MSG_HEARTBEAT_LOCAL_REQUEST => {
                    let request: HeartbeatLocalRequest = messages::decode_body(body)?;
                    heartbeats.fetch_add(1, Ordering::SeqCst);
                    messages::encode_body(&HeartbeatLocalResponse {
                        session_id: request.session_id,
                    })
                }
                protocol::MSG_START_JOB_REQUEST => {
                    let request: StartJobRequest = messages::decode_body(body)?;
                    messages::encode_body(&StartJobResponse {
                        job_id: format!("job-{}-{}", request.function_id, uuid::Uuid::new_v4()),
                    })
                }
                _ => Ok(Vec::new()),
            },
        );
        server.start().await?;

        Ok(Self {
            server,
            register_calls,
            heartbeat_calls,
            client_addr,
        })
    }

    /// Resolved reply address clients should dial
    pub fn address(&self) -> String {
        self.server.local_address().expect("mock agent not started")
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeat_calls(&self) -> usize {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }

    /// Reply-server address the last registration advertised
    pub fn registered_local_addr(&self) -> Option<String> {
        self.client_addr.lock().unwrap().clone()
    }

    pub async fn stop(&self) {
        self.server.stop().await;
    }

    /// Invoke a function on the registered client, the way the real Agent
    /// delivers invocations into a process.
    pub async fn invoke_registered(
        &self,
        function_id: &str,
        context: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let addr = self
            .registered_local_addr()
            .expect("no client has registered with the mock agent");

        let transport = RequestTransport::new(addr, Duration::from_secs(2));
        transport.connect().await?;
        let body = messages::encode_body(&InvokeRequest {
            function_id: function_id.to_string(),
            context: context.to_vec(),
            payload: payload.to_vec(),
        })?;
        let (_, reply) = transport.call(protocol::MSG_INVOKE_REQUEST, &body).await?;
        transport.close().await;
        Ok(reply)
    }
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}
