//! Typed git command dispatch.
//!
//! Entry point for an SSH-delivered git operation after the front end has
//! parsed the command line. The dispatcher verifies access against the
//! internal API, resolves the required action, and either hands off to the
//! local executor or runs the proxy session — finishing every invocation with
//! at most one diagnostic line and a process exit status.

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::action::{Action, Decision, resolve};
use crate::api::InternalApi;
use crate::config::ShellConfig;
use crate::console;
use crate::errors::ShellError;
use crate::proxy::{ProxySession, SessionPhase};
use crate::verifier::{AccessVerifier, AuthorizationResponse};

/// Who the SSH layer authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    KeyId(String),
    Username(String),
}

/// Git service requested over SSH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    ReceivePack,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceKind::ReceivePack => write!(f, "git-receive-pack"),
        }
    }
}

/// An already-parsed git command handed over by the SSH front end.
#[derive(Debug, Clone)]
pub struct GitCommand {
    pub who: Identity,
    pub service: ServiceKind,
    pub repo: String,
}

impl GitCommand {
    /// Build a command, rejecting shapes the shell does not serve.
    pub fn new(who: Identity, service: ServiceKind, repo: &str) -> Result<Self, ShellError> {
        if repo.is_empty() {
            return Err(ShellError::Disallowed);
        }
        Ok(Self {
            who,
            service,
            repo: repo.to_string(),
        })
    }
}

/// Seam for the purely local execution path.
///
/// Spawning the actual git process belongs to the hosting environment; the
/// dispatcher only decides whether it runs and with which resolved context.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    /// Run the allowed command locally; returns the process exit status.
    async fn run(
        &self,
        context: &AuthorizationResponse,
        service: ServiceKind,
        repo: &str,
    ) -> Result<i32, ShellError>;
}

/// Dispatches one git command per invocation.
pub struct Dispatcher<'a, E> {
    config: &'a ShellConfig,
    api: InternalApi,
    local: &'a E,
}

impl<'a, E: LocalExecutor> Dispatcher<'a, E> {
    pub fn new(config: &'a ShellConfig, local: &'a E) -> Result<Self, ShellError> {
        let api = InternalApi::new(config)?;
        Ok(Self { config, api, local })
    }

    /// Run the full session and return the process exit status.
    ///
    /// Failures are translated here, once: a single line on the caller's
    /// error stream and a non-zero status. Inner components never report.
    pub async fn dispatch<R, W, S>(
        &self,
        command: &GitCommand,
        input: &mut R,
        output: &mut W,
        err_output: &mut S,
    ) -> i32
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
        S: AsyncWrite + Unpin + Send,
    {
        match self.execute(command, input, output).await {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!(error = %err, repo = command.repo, "git command failed");
                let line = format!("{}\n", err.user_message());
                let _ = err_output.write_all(line.as_bytes()).await;
                let _ = err_output.flush().await;
                err.exit_code()
            }
        }
    }

    async fn execute<R, W>(
        &self,
        command: &GitCommand,
        input: &mut R,
        output: &mut W,
    ) -> Result<i32, ShellError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        tracing::debug!(phase = ?SessionPhase::Authorizing, repo = command.repo);
        let verifier = AccessVerifier::new(&self.api);
        let response = verifier
            .verify(&command.who, command.service, &command.repo)
            .await?;

        tracing::debug!(phase = ?SessionPhase::Resolving, status = response.http_status);
        let decision = resolve(&response).inspect_err(|_| {
            tracing::debug!(phase = ?SessionPhase::Denying, status = response.http_status);
        })?;

        match decision {
            Decision::AllowLocal => {
                // Operator messages reach the terminal on the local path too,
                // before any git output.
                console::relay_all(output, &response.console_messages).await?;
                self.local.run(&response, command.service, &command.repo).await
            }
            Decision::Custom(Action::GeoProxyToPrimary(data)) => {
                let session = ProxySession::new(
                    &self.api,
                    data,
                    &response,
                    input,
                    output,
                    self.config.max_proxy_payload,
                );
                session.run().await?;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_kind_uses_the_wire_name() {
        assert_eq!(ServiceKind::ReceivePack.to_string(), "git-receive-pack");
    }

    #[test]
    fn empty_repository_is_disallowed() {
        let result = GitCommand::new(
            Identity::KeyId("100".to_string()),
            ServiceKind::ReceivePack,
            "",
        );
        assert!(matches!(result, Err(ShellError::Disallowed)));
    }
}
