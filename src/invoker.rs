//! Thin facade for issuing remote invocations through the Agent.
//!
//! Packs the caller's arguments into the opaque body of the corresponding
//! request type, forwards through the client's request transport, and hands
//! back the reply. Transport errors propagate unchanged.

use crate::client::AgentClient;
use crate::error::{Result, SdkError};
use crate::messages::{
    self, CancelJobRequest, GetJobResultRequest, InvokeRequest, StartJobRequest, StartJobResponse,
};
use crate::protocol;

/// Invocation surface of an [`AgentClient`]; obtained from
/// [`AgentClient::invoker`]. Cheap to clone.
#[derive(Clone)]
pub struct Invoker {
    client: AgentClient,
}

impl Invoker {
    pub(crate) fn new(client: AgentClient) -> Self {
        Self { client }
    }

    /// Invoke a function hosted elsewhere and wait for its result.
    ///
    /// The reply body is opaque; its format is a contract between the
    /// caller and the remote function.
    pub async fn invoke(
        &self,
        function_id: &str,
        context: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        ensure_function_id(function_id)?;
        let body = messages::encode_body(&InvokeRequest {
            function_id: function_id.to_string(),
            context: context.to_vec(),
            payload: payload.to_vec(),
        })?;
        let (_, reply) = self
            .client
            .transport()
            .call(protocol::MSG_INVOKE_REQUEST, &body)
            .await?;
        Ok(reply)
    }

    /// Start a long-running job and return the id the Agent assigned to it
    pub async fn start_job(
        &self,
        function_id: &str,
        context: &[u8],
        payload: &[u8],
    ) -> Result<String> {
        ensure_function_id(function_id)?;
        let body = messages::encode_body(&StartJobRequest {
            function_id: function_id.to_string(),
            context: context.to_vec(),
            payload: payload.to_vec(),
        })?;
        let (_, reply) = self
            .client
            .transport()
            .call(protocol::MSG_START_JOB_REQUEST, &body)
            .await?;
        let ack: StartJobResponse = messages::decode_body(&reply)?;
        Ok(ack.job_id)
    }

    /// Cancel a previously started job
    pub async fn cancel_job(&self, job_id: &str) -> Result<Vec<u8>> {
        let body = messages::encode_body(&CancelJobRequest {
            job_id: job_id.to_string(),
        })?;
        let (_, reply) = self
            .client
            .transport()
            .call(protocol::MSG_CANCEL_JOB_REQUEST, &body)
            .await?;
        Ok(reply)
    }

    /// Fetch the result of a completed job
    pub async fn get_job_result(&self, job_id: &str) -> Result<Vec<u8>> {
        let body = messages::encode_body(&GetJobResultRequest {
            job_id: job_id.to_string(),
        })?;
        let (_, reply) = self
            .client
            .transport()
            .call(protocol::MSG_GET_JOB_RESULT_REQUEST, &body)
            .await?;
        Ok(reply)
    }
}

fn ensure_function_id(function_id: &str) -> Result<()> {
    if function_id.is_empty() {
        return Err(SdkError::InvalidArgument(
            "function id must not be empty".to_string(),
        ));
    }
    Ok(())
}
