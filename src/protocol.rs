//! Wire protocol: the fixed 8-byte envelope and the message-type registry.
//!
//! Every frame exchanged with the Agent starts with an 8-byte header:
//!
//! ```text
//! ┌─────────┬──────────┬─────────────────┐
//! │ Version │ MsgID    │ RequestID       │
//! │ (1B)    │ (3B BE)  │ (4B BE)         │
//! └─────────┴──────────┴─────────────────┘
//! ```
//!
//! followed by an opaque body. Message types are 24-bit values partitioned
//! into service families by the high byte; within a family the low byte is
//! odd for requests and even for the paired response (`request + 1`). Two
//! one-way notifications ([`MSG_JOB_EVENT`], [`MSG_METRIC_EVENT`]) are
//! classified as neither request nor response.

use crate::error::{Result, SdkError};

/// Current protocol version carried in every header
pub const VERSION_1: u8 = 0x01;

/// Header size: Version(1) + MsgID(3) + RequestID(4)
pub const HEADER_SIZE: usize = 8;

/// Largest value representable in the 24-bit message-type field
pub const MAX_MSG_ID: u32 = 0x00FF_FFFF;

// Sentinel family (0x00xx)
//
// Emitted by the reply server when an inbound frame cannot be decoded, so a
// request/reply peer always receives a reply and is never left waiting.
pub const MSG_MALFORMED_RESPONSE: u32 = 0x000002;

// ControlService (0x01xx)
pub const MSG_REGISTER_REQUEST: u32 = 0x010101;
pub const MSG_REGISTER_RESPONSE: u32 = 0x010102;
pub const MSG_HEARTBEAT_REQUEST: u32 = 0x010103;
pub const MSG_HEARTBEAT_RESPONSE: u32 = 0x010104;
pub const MSG_REGISTER_CAPABILITIES_REQUEST: u32 = 0x010105;
pub const MSG_REGISTER_CAPABILITIES_RESPONSE: u32 = 0x010106;

// ClientService (0x02xx)
pub const MSG_REGISTER_CLIENT_REQUEST: u32 = 0x020101;
pub const MSG_REGISTER_CLIENT_RESPONSE: u32 = 0x020102;
pub const MSG_CLIENT_HEARTBEAT_REQUEST: u32 = 0x020103;
pub const MSG_CLIENT_HEARTBEAT_RESPONSE: u32 = 0x020104;
pub const MSG_LIST_CLIENTS_REQUEST: u32 = 0x020105;
pub const MSG_LIST_CLIENTS_RESPONSE: u32 = 0x020106;
pub const MSG_GET_JOB_RESULT_REQUEST: u32 = 0x020107;
pub const MSG_GET_JOB_RESULT_RESPONSE: u32 = 0x020108;

// InvokerService (0x03xx)
pub const MSG_INVOKE_REQUEST: u32 = 0x030101;
pub const MSG_INVOKE_RESPONSE: u32 = 0x030102;
pub const MSG_START_JOB_REQUEST: u32 = 0x030103;
pub const MSG_START_JOB_RESPONSE: u32 = 0x030104;
pub const MSG_STREAM_JOB_REQUEST: u32 = 0x030105;
pub const MSG_JOB_EVENT: u32 = 0x030106;
pub const MSG_CANCEL_JOB_REQUEST: u32 = 0x030107;
pub const MSG_CANCEL_JOB_RESPONSE: u32 = 0x030108;

// OpsService (0x04xx)
pub const MSG_GET_SYSTEM_INFO_REQUEST: u32 = 0x040101;
pub const MSG_GET_SYSTEM_INFO_RESPONSE: u32 = 0x040102;
pub const MSG_LIST_PROCESSES_REQUEST: u32 = 0x040103;
pub const MSG_LIST_PROCESSES_RESPONSE: u32 = 0x040104;
pub const MSG_REPORT_METRICS_REQUEST: u32 = 0x040105;
pub const MSG_REPORT_METRICS_RESPONSE: u32 = 0x040106;
pub const MSG_STREAM_METRICS_REQUEST: u32 = 0x040107;
pub const MSG_METRIC_EVENT: u32 = 0x040108;
pub const MSG_RESTART_PROCESS_REQUEST: u32 = 0x040109;
pub const MSG_RESTART_PROCESS_RESPONSE: u32 = 0x04010A;
pub const MSG_STOP_PROCESS_REQUEST: u32 = 0x04010B;
pub const MSG_STOP_PROCESS_RESPONSE: u32 = 0x04010C;
pub const MSG_START_PROCESS_REQUEST: u32 = 0x04010D;
pub const MSG_START_PROCESS_RESPONSE: u32 = 0x04010E;
pub const MSG_EXECUTE_COMMAND_REQUEST: u32 = 0x04010F;
pub const MSG_EXECUTE_COMMAND_RESPONSE: u32 = 0x040110;
pub const MSG_LIST_SERVICES_REQUEST: u32 = 0x040111;
pub const MSG_LIST_SERVICES_RESPONSE: u32 = 0x040112;
pub const MSG_GET_SERVICE_STATUS_REQUEST: u32 = 0x040113;
pub const MSG_GET_SERVICE_STATUS_RESPONSE: u32 = 0x040114;

// LocalControlService (0x05xx) - local function registration with the Agent
pub const MSG_REGISTER_LOCAL_REQUEST: u32 = 0x050101;
pub const MSG_REGISTER_LOCAL_RESPONSE: u32 = 0x050102;
pub const MSG_HEARTBEAT_LOCAL_REQUEST: u32 = 0x050103;
pub const MSG_HEARTBEAT_LOCAL_RESPONSE: u32 = 0x050104;
pub const MSG_LIST_LOCAL_REQUEST: u32 = 0x050105;
pub const MSG_LIST_LOCAL_RESPONSE: u32 = 0x050106;

/// A decoded protocol frame: the parsed envelope plus the opaque body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub msg_id: u32,
    pub req_id: u32,
    pub body: Vec<u8>,
}

impl Frame {
    /// Encode a frame: 8-byte header followed by the body.
    ///
    /// Fails with `InvalidArgument` when `msg_id` does not fit in 24 bits.
    pub fn encode(msg_id: u32, req_id: u32, body: &[u8]) -> Result<Vec<u8>> {
        if msg_id > MAX_MSG_ID {
            return Err(SdkError::InvalidArgument(format!(
                "message type {msg_id:#x} does not fit in 24 bits"
            )));
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
        frame.push(VERSION_1);
        frame.push((msg_id >> 16) as u8);
        frame.push((msg_id >> 8) as u8);
        frame.push(msg_id as u8);
        frame.extend_from_slice(&req_id.to_be_bytes());
        frame.extend_from_slice(body);
        Ok(frame)
    }

    /// Decode a frame received from the wire.
    ///
    /// Fails with `Malformed` when the input is shorter than the header.
    /// The body is the suffix after the header and may be empty.
    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        if bytes.len() < HEADER_SIZE {
            return Err(SdkError::Malformed(format!(
                "frame of {} bytes is shorter than the {HEADER_SIZE}-byte header",
                bytes.len()
            )));
        }

        let msg_id =
            (u32::from(bytes[1]) << 16) | (u32::from(bytes[2]) << 8) | u32::from(bytes[3]);
        let req_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        Ok(Frame {
            version: bytes[0],
            msg_id,
            req_id,
            body: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

/// Whether the message type is a request (odd, excluding one-way events)
pub fn is_request(msg_id: u32) -> bool {
    msg_id % 2 == 1 && msg_id != MSG_JOB_EVENT && msg_id != MSG_METRIC_EVENT
}

/// Whether the message type is a response (even, excluding one-way events)
pub fn is_response(msg_id: u32) -> bool {
    msg_id % 2 == 0 && msg_id != MSG_JOB_EVENT && msg_id != MSG_METRIC_EVENT
}

/// The response type paired with a request type
pub fn response_for(msg_id: u32) -> u32 {
    msg_id + 1
}

/// Human-readable name of a message type, for logs
pub fn name_of(msg_id: u32) -> String {
    let name = match msg_id {
        MSG_MALFORMED_RESPONSE => "MalformedResponse",
        MSG_REGISTER_REQUEST => "RegisterRequest",
        MSG_REGISTER_RESPONSE => "RegisterResponse",
        MSG_HEARTBEAT_REQUEST => "HeartbeatRequest",
        MSG_HEARTBEAT_RESPONSE => "HeartbeatResponse",
        MSG_REGISTER_CAPABILITIES_REQUEST => "RegisterCapabilitiesRequest",
        MSG_REGISTER_CAPABILITIES_RESPONSE => "RegisterCapabilitiesResponse",
        MSG_REGISTER_CLIENT_REQUEST => "RegisterClientRequest",
        MSG_REGISTER_CLIENT_RESPONSE => "RegisterClientResponse",
        MSG_CLIENT_HEARTBEAT_REQUEST => "ClientHeartbeatRequest",
        MSG_CLIENT_HEARTBEAT_RESPONSE => "ClientHeartbeatResponse",
        MSG_LIST_CLIENTS_REQUEST => "ListClientsRequest",
        MSG_LIST_CLIENTS_RESPONSE => "ListClientsResponse",
        MSG_GET_JOB_RESULT_REQUEST => "GetJobResultRequest",
        MSG_GET_JOB_RESULT_RESPONSE => "GetJobResultResponse",
        MSG_INVOKE_REQUEST => "InvokeRequest",
        MSG_INVOKE_RESPONSE => "InvokeResponse",
        MSG_START_JOB_REQUEST => "StartJobRequest",
        MSG_START_JOB_RESPONSE => "StartJobResponse",
        MSG_STREAM_JOB_REQUEST => "StreamJobRequest",
        MSG_JOB_EVENT => "JobEvent",
        MSG_CANCEL_JOB_REQUEST => "CancelJobRequest",
        MSG_CANCEL_JOB_RESPONSE => "CancelJobResponse",
        MSG_GET_SYSTEM_INFO_REQUEST => "GetSystemInfoRequest",
        MSG_GET_SYSTEM_INFO_RESPONSE => "GetSystemInfoResponse",
        MSG_LIST_PROCESSES_REQUEST => "ListProcessesRequest",
        MSG_LIST_PROCESSES_RESPONSE => "ListProcessesResponse",
        MSG_REPORT_METRICS_REQUEST => "ReportMetricsRequest",
        MSG_REPORT_METRICS_RESPONSE => "ReportMetricsResponse",
        MSG_STREAM_METRICS_REQUEST => "StreamMetricsRequest",
        MSG_METRIC_EVENT => "MetricEvent",
        MSG_RESTART_PROCESS_REQUEST => "RestartProcessRequest",
        MSG_RESTART_PROCESS_RESPONSE => "RestartProcessResponse",
        MSG_STOP_PROCESS_REQUEST => "StopProcessRequest",
        MSG_STOP_PROCESS_RESPONSE => "StopProcessResponse",
        MSG_START_PROCESS_REQUEST => "StartProcessRequest",
        MSG_START_PROCESS_RESPONSE => "StartProcessResponse",
        MSG_EXECUTE_COMMAND_REQUEST => "ExecuteCommandRequest",
        MSG_EXECUTE_COMMAND_RESPONSE => "ExecuteCommandResponse",
        MSG_LIST_SERVICES_REQUEST => "ListServicesRequest",
        MSG_LIST_SERVICES_RESPONSE => "ListServicesResponse",
        MSG_GET_SERVICE_STATUS_REQUEST => "GetServiceStatusRequest",
        MSG_GET_SERVICE_STATUS_RESPONSE => "GetServiceStatusResponse",
        MSG_REGISTER_LOCAL_REQUEST => "RegisterLocalRequest",
        MSG_REGISTER_LOCAL_RESPONSE => "RegisterLocalResponse",
        MSG_HEARTBEAT_LOCAL_REQUEST => "HeartbeatLocalRequest",
        MSG_HEARTBEAT_LOCAL_RESPONSE => "HeartbeatLocalResponse",
        MSG_LIST_LOCAL_REQUEST => "ListLocalRequest",
        MSG_LIST_LOCAL_RESPONSE => "ListLocalResponse",
        other => return format!("Unknown({other:#X})"),
    };
    name.to_string()
}
