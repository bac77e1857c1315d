//! Two-phase HTTP proxy session forwarding a git push to the primary.
//!
//! The session owns the caller's streams for exactly one invocation and walks
//! an explicit phase machine: relay the operator messages, negotiate via the
//! info-refs endpoint, then forward the whole pack upload to the push endpoint
//! and emit the primary's answer byte-for-byte. Partial-failure states are
//! enumerable, and each phase has one canonical error mapping.
//!
//! The push phase is store-and-forward, not a chunked tunnel: the action
//! endpoints follow request/response semantics, so the caller's input is read
//! to EOF (bounded by `max_payload`) before the one outbound call.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::action::GeoProxyData;
use crate::api::{ActionCallError, InternalApi};
use crate::console;
use crate::errors::ShellError;
use crate::verifier::AuthorizationResponse;

/// Phases of a dispatch session, from authorization to completion.
///
/// `Failed` is implicit: any phase exits through a `ShellError`, and the
/// dispatch boundary turns that into the single caller-visible line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Authorizing,
    Resolving,
    Denying,
    Relaying,
    ProxyingInfoRefs,
    ProxyingPush,
    Done,
}

/// JSON envelope POSTed to each custom-action endpoint.
#[derive(Debug, Serialize)]
pub struct ActionEnvelope<'a> {
    pub data: &'a GeoProxyData,
    /// Base64 of the forwarded bytes; empty for the negotiation call.
    pub output: String,
}

/// JSON envelope returned by a custom-action endpoint.
#[derive(Debug, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub message: String,
}

/// Decode a `result` field into the bytes to emit.
///
/// Base64 first, tolerating embedded line breaks (the upstream encoder wraps
/// long values); anything that is not valid base64 is taken as plain text.
pub fn decode_result(result: &str) -> Vec<u8> {
    let compact: String = result.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match BASE64.decode(compact.as_bytes()) {
        Ok(bytes) => bytes,
        Err(_) => result.as_bytes().to_vec(),
    }
}

/// One proxied push invocation.
///
/// Owns the caller's input and output streams and the resolved geo-proxy
/// payload; never shared across connections. The output stream is flushed on
/// every exit path, including failures.
pub struct ProxySession<'a, R, W> {
    api: &'a InternalApi,
    data: GeoProxyData,
    console_messages: Vec<String>,
    input: &'a mut R,
    output: &'a mut W,
    max_payload: usize,
    phase: SessionPhase,
}

impl<'a, R, W> ProxySession<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        api: &'a InternalApi,
        mut data: GeoProxyData,
        response: &AuthorizationResponse,
        input: &'a mut R,
        output: &'a mut W,
        max_payload: usize,
    ) -> Self {
        // The endpoints expect the identity resolved by the authorization
        // call, not whatever the payload happened to carry.
        data.gl_id = Some(response.gl_id.clone());

        Self {
            api,
            data,
            console_messages: response.console_messages.clone(),
            input,
            output,
            max_payload,
            phase: SessionPhase::Relaying,
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        tracing::debug!(?phase, "proxy session phase");
        self.phase = phase;
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> Result<(), ShellError> {
        let result = self.execute().await;
        // Streams are scoped to the session; leave them flushed no matter
        // which phase we exited from.
        let _ = self.output.flush().await;
        result
    }

    async fn execute(&mut self) -> Result<(), ShellError> {
        self.enter(SessionPhase::Relaying);
        console::relay_all(self.output, &self.console_messages).await?;
        if !self.data.info_message.is_empty() {
            let message = self.data.info_message.clone();
            console::relay_line(self.output, &message).await?;
        }

        self.enter(SessionPhase::ProxyingInfoRefs);
        let handshake = self.call_info_refs().await?;
        if !handshake.is_empty() {
            self.output.write_all(&handshake).await?;
            if !handshake.ends_with(b"\n") {
                self.output.write_all(b"\n").await?;
            }
            self.output.flush().await?;
        }

        self.enter(SessionPhase::ProxyingPush);
        let body = self.read_push_body().await?;
        let result = self.call_push(&body).await?;
        self.output.write_all(&result).await?;
        self.output.flush().await?;

        self.enter(SessionPhase::Done);
        Ok(())
    }

    /// First phase: let the primary establish session state. The decoded
    /// payload is presented to the caller as handshake output.
    async fn call_info_refs(&self) -> Result<Vec<u8>, ShellError> {
        let endpoint = self.api.resolve_endpoint(&self.data.api_endpoints[0]);
        let envelope = ActionEnvelope {
            data: &self.data,
            output: String::new(),
        };

        let reply: ActionResult = self
            .api
            .call_action(&endpoint, &envelope)
            .await
            .map_err(negotiation_error)?;
        tracing::debug!(endpoint, "info-refs negotiation completed");

        Ok(decode_result(&reply.result))
    }

    /// Read the caller's entire input stream. Early EOF is not an error: the
    /// partial bytes become the complete push body.
    async fn read_push_body(&mut self) -> Result<Vec<u8>, ShellError> {
        let mut body = Vec::new();
        // One extra byte distinguishes "exactly at the limit" from "over";
        // saturate so a limit of usize::MAX cannot overflow the take count.
        let limit = (self.max_payload as u64).saturating_add(1);
        let mut limited = (&mut *self.input).take(limit);
        limited
            .read_to_end(&mut body)
            .await
            .map_err(|e| ShellError::ProxyTransfer(e.to_string()))?;

        if body.len() > self.max_payload {
            return Err(ShellError::ProxyTransfer(format!(
                "push payload exceeds the configured limit of {} bytes",
                self.max_payload
            )));
        }

        tracing::debug!(bytes = body.len(), "buffered push payload");
        Ok(body)
    }

    /// Second phase: forward the pack bytes and emit the primary's result.
    async fn call_push(&self, body: &[u8]) -> Result<Vec<u8>, ShellError> {
        let endpoint = self.api.resolve_endpoint(&self.data.api_endpoints[1]);
        let envelope = ActionEnvelope {
            data: &self.data,
            output: BASE64.encode(body),
        };

        let reply: ActionResult = self
            .api
            .call_action(&endpoint, &envelope)
            .await
            .map_err(transfer_error)?;
        tracing::debug!(endpoint, "push transfer completed");

        Ok(decode_result(&reply.result))
    }
}

fn negotiation_error(err: ActionCallError) -> ShellError {
    match err {
        ActionCallError::Status(status) => ShellError::HttpError(status),
        ActionCallError::Unreachable(detail) | ActionCallError::Malformed(detail) => {
            ShellError::ProxyNegotiation(detail)
        }
    }
}

fn transfer_error(err: ActionCallError) -> ShellError {
    match err {
        ActionCallError::Status(status) => ShellError::HttpError(status),
        ActionCallError::Unreachable(detail) | ActionCallError::Malformed(detail) => {
            ShellError::ProxyTransfer(detail)
        }
    }
}
