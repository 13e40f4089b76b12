//! Control-plane payload bodies carried inside protocol frames.
//!
//! The envelope treats every body as an opaque byte blob; these are the
//! bodies the SDK itself produces and consumes for registration, heartbeat,
//! and invocation packing. Bodies are serialized with bincode.

use crate::error::{Result, SdkError};
use crate::registry::FunctionDescriptor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Registration handshake body sent with `MSG_REGISTER_LOCAL_REQUEST`.
///
/// Carries the identity of the process, the address of its reply server,
/// and the descriptors of every function it exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLocalRequest {
    pub service_id: String,
    pub env: String,
    pub game_id: String,
    /// Per-process instance id minted by the SDK (uuid v4)
    pub instance_id: String,
    /// Resolved address of the reply server the Agent should dial back
    pub local_addr: String,
    pub functions: Vec<FunctionDescriptor>,
}

/// Agent's answer to a registration, establishing the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLocalResponse {
    pub session_id: String,
}

/// Periodic liveness body sent with `MSG_HEARTBEAT_LOCAL_REQUEST`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatLocalRequest {
    pub session_id: String,
}

/// Agent's heartbeat acknowledgement, echoing the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatLocalResponse {
    pub session_id: String,
}

/// Invocation body for `MSG_INVOKE_REQUEST`.
///
/// `context` and `payload` are opaque to the SDK; their format is a contract
/// between the caller and the function handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub function_id: String,
    pub context: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Body for `MSG_START_JOB_REQUEST`; same shape as an invoke, but the
/// Agent answers with a job id instead of the function's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub function_id: String,
    pub context: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Agent's answer to a started job, identifying it for cancel/result calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartJobResponse {
    pub job_id: String,
}

/// Body for `MSG_CANCEL_JOB_REQUEST`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelJobRequest {
    pub job_id: String,
}

/// Body for `MSG_GET_JOB_RESULT_REQUEST`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetJobResultRequest {
    pub job_id: String,
}

/// Serialize a payload body for the wire
pub fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| SdkError::Malformed(format!("unencodable payload: {e}")))
}

/// Deserialize a payload body received from the wire
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| SdkError::Malformed(format!("undecodable payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_body_round_trips() {
        let request = RegisterLocalRequest {
            service_id: "lobby".to_string(),
            env: "dev".to_string(),
            game_id: "skirmish".to_string(),
            instance_id: "c2b0a6f4".to_string(),
            local_addr: "tcp://127.0.0.1:40123".to_string(),
            functions: vec![FunctionDescriptor::new("player.ban")],
        };

        let bytes = encode_body(&request).unwrap();
        let decoded: RegisterLocalRequest = decode_body(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn invoke_body_preserves_opaque_bytes() {
        let request = InvokeRequest {
            function_id: "echo".to_string(),
            context: vec![0xDE, 0xAD],
            payload: vec![1, 2, 3, 4, 5],
        };

        let decoded: InvokeRequest = decode_body(&encode_body(&request).unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn job_bodies_round_trip() {
        let request = StartJobRequest {
            function_id: "report.rebuild".to_string(),
            context: vec![],
            payload: vec![0xA0],
        };
        let decoded: StartJobRequest = decode_body(&encode_body(&request).unwrap()).unwrap();
        assert_eq!(decoded, request);

        let response = StartJobResponse {
            job_id: "job-42".to_string(),
        };
        let decoded: StartJobResponse = decode_body(&encode_body(&response).unwrap()).unwrap();
        assert_eq!(decoded.job_id, "job-42");
    }

    #[test]
    fn truncated_body_is_malformed() {
        let bytes = encode_body(&RegisterLocalResponse {
            session_id: "abcdef".to_string(),
        })
        .unwrap();

        let err = decode_body::<RegisterLocalResponse>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, SdkError::Malformed(_)));
    }
}
