//! git-shell-proxy: command dispatch and action proxying for SSH-delivered git pushes.
//!
//! Sits between an SSH front end and an internal authorization service. For
//! each incoming `git-receive-pack` it asks the API whether to execute the
//! push locally or to transparently relay it to a different primary server
//! over HTTP, preserving the git smart-HTTP wire semantics and surfacing
//! operator messages on the caller's terminal.
//!
//! Session flow
//! - The access verifier performs the one authorization call of the session.
//! - The resolver classifies the decision payload into a typed action:
//!   allow-local, deny, or a server-directed custom action.
//! - The console relay prints operator messages, each line prefixed and
//!   flushed, before any protocol bytes flow.
//! - The proxy session runs the two-phase exchange: info-refs negotiation,
//!   then the store-and-forward push upload, streaming the primary's answer
//!   back byte-for-byte.
//!
//! Boundaries
//! - SSH command-line parsing, configuration loading, and spawning the local
//!   git process belong to the hosting environment; the crate exposes typed
//!   seams for them (`GitCommand`, `ShellConfig`, `LocalExecutor`).
//! - Proxied protocol bytes are opaque; the pack format is never parsed here.
//!
//! Modules
//! - `command`: typed dispatch entry, identity and service types.
//! - `verifier`: authorization request/response model and the API call.
//! - `action`: the tagged action union and the resolution rules.
//! - `console`: prefixed terminal message relay.
//! - `proxy`: the two-phase proxy session and its phase machine.
//! - `api`: shared internal API HTTP client.
//! - `errors`: unified error types and caller-visible translation.

pub mod action;
pub mod api;
pub mod command;
pub mod config;
pub mod console;
pub mod errors;
pub mod proxy;
pub mod verifier;

// Core types external users need to drive a session.
pub use action::{Action, Decision, GeoProxyData};
pub use command::{Dispatcher, GitCommand, Identity, LocalExecutor, ServiceKind};
pub use config::ShellConfig;
pub use errors::ShellError;
pub use proxy::SessionPhase;
pub use verifier::{AccessVerifier, AuthorizationResponse, DiscoveredUser};
