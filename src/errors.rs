//! Error types for the git-shell-proxy crate.
//!
//! This module defines a unified error enumeration used across access
//! verification, action resolution, console relay, and the two-phase proxy
//! session. It integrates with `thiserror` to provide rich `Display`
//! implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - The caller-visible line and process exit status for every failure are
//!   produced here, in one place, so an invocation never reports twice.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the git-shell-proxy library.
///
/// - Used across the internal API client, the access verifier, the action
///   resolver, and the proxy session.
/// - Implements `std::error::Error` via `thiserror`.
pub enum ShellError {
    /// The internal API could not be reached at the transport level.
    #[error("Internal API unreachable: {0}")]
    ApiUnreachable(String),

    /// The internal API was reachable but returned a non-success status with
    /// no actionable body.
    #[error("Internal API error ({0})")]
    ApiError(u16),

    /// The internal API explicitly denied the request with a message.
    #[error("{0}")]
    Denied(String),

    /// A custom-action endpoint returned a non-success HTTP status.
    #[error("Action endpoint error ({0})")]
    HttpError(u16),

    /// The authorization payload carried an action tag this shell does not
    /// implement. A configuration or version mismatch, never ignored.
    #[error("Unsupported custom action: {0}")]
    UnsupportedAction(String),

    /// The info-refs negotiation phase of the proxy failed.
    #[error("Proxy negotiation failed: {0}")]
    ProxyNegotiation(String),

    /// The push transfer phase of the proxy failed.
    #[error("Proxy transfer failed: {0}")]
    ProxyTransfer(String),

    /// A wire body could not be parsed.
    #[error("Malformed payload: {0}")]
    Decode(String),

    /// The SSH layer handed over a command this shell does not serve.
    #[error("Disallowed command")]
    Disallowed,

    /// I/O error on the caller's streams.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// The single diagnostic line shown to the connected terminal.
    ///
    /// Internal detail stays out of the caller-visible text; only the HTTP
    /// status survives where applicable.
    pub fn user_message(&self) -> String {
        match self {
            ShellError::ApiUnreachable(_) => "API is not accessible".to_string(),
            ShellError::ApiError(status) | ShellError::HttpError(status) => {
                format!("Internal API error ({status})")
            }
            ShellError::Denied(message) => message.clone(),
            ShellError::UnsupportedAction(_) => {
                "Internal configuration error, please contact the administrator".to_string()
            }
            ShellError::ProxyNegotiation(_) | ShellError::ProxyTransfer(_) => {
                "Failed to proxy the git push to the primary".to_string()
            }
            ShellError::Decode(_) => "Parsing failed".to_string(),
            ShellError::Disallowed => "Disallowed command".to_string(),
            ShellError::Io(_) => "Internal error".to_string(),
        }
    }

    /// Process exit status for this failure. Every failure path is non-zero.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
