//! HTTP client for the internal API.
//!
//! Wraps `reqwest` with the conventions every internal call shares: the
//! `/api/v4/internal` path prefix, the base64-encoded shared-secret header,
//! optional basic auth, and the status-window interpretation that separates
//! transport failures from explicit API decisions.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ShellConfig;
use crate::errors::ShellError;

/// Namespace prefix for internal API paths.
pub const INTERNAL_API_PATH: &str = "/api/v4/internal";

/// Header carrying the base64-encoded operator secret.
const SECRET_HEADER: &str = "Gitlab-Shared-Secret";

/// Internal calls accept the 2xx and 3xx windows; the API signals a custom
/// action with 300 Multiple Choices, which must not read as a failure.
const ACCEPTED_STATUS: std::ops::RangeInclusive<u16> = 200..=399;

/// Error body the API attaches to explicit denials.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: String,
}

/// Failure of a custom-action endpoint call, before the session maps it onto
/// the phase it happened in.
#[derive(Debug)]
pub enum ActionCallError {
    /// The endpoint could not be reached or the connection broke mid-call.
    Unreachable(String),
    /// The endpoint answered with a non-2xx status.
    Status(u16),
    /// The response envelope did not parse.
    Malformed(String),
}

/// Client for the internal API host.
///
/// Cheap to clone; one instance serves a whole invocation.
#[derive(Debug, Clone)]
pub struct InternalApi {
    http: reqwest::Client,
    host: String,
    encoded_secret: String,
    basic_auth: Option<(String, String)>,
}

impl InternalApi {
    /// Build a client from the operator configuration.
    pub fn new(config: &ShellConfig) -> Result<Self, ShellError> {
        if config.gitlab_url.is_empty() {
            return Err(ShellError::ApiUnreachable(
                "no internal API endpoint configured".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ShellError::ApiUnreachable(e.to_string()))?;

        let settings = &config.http_settings;
        let basic_auth = if !settings.user.is_empty() && !settings.password.is_empty() {
            Some((settings.user.clone(), settings.password.clone()))
        } else {
            None
        };

        Ok(Self {
            http,
            host: config.gitlab_url.trim_end_matches('/').to_string(),
            encoded_secret: BASE64.encode(config.secret.as_bytes()),
            basic_auth,
        })
    }

    /// Prefix a relative path with the internal API namespace.
    fn normalize_path(path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        if path.starts_with(INTERNAL_API_PATH) {
            path
        } else {
            format!("{INTERNAL_API_PATH}{path}")
        }
    }

    /// Resolve a custom-action endpoint against the API host.
    ///
    /// Endpoints from the authorization payload live outside the internal
    /// namespace; absolute URLs pass through untouched.
    pub fn resolve_endpoint(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.host, endpoint)
        } else {
            format!("{}/{}", self.host, endpoint)
        }
    }

    fn authenticated(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(SECRET_HEADER, &self.encoded_secret);
        match &self.basic_auth {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(u16, Bytes), ShellError> {
        let response = self.authenticated(request).send().await.map_err(|e| {
            tracing::warn!(error = %e, "internal API request failed");
            ShellError::ApiUnreachable(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ShellError::ApiUnreachable(e.to_string()))?;
        tracing::debug!(status, bytes = body.len(), "internal API response");

        Ok((status, body))
    }

    /// POST a JSON body to an internal path; returns the raw status and body.
    ///
    /// Status interpretation stays with the caller: the access verifier must
    /// see the body of non-success responses before deciding how to fail.
    pub async fn post_raw<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, Bytes), ShellError> {
        let url = format!("{}{}", self.host, Self::normalize_path(path));
        self.send(self.http.post(url).json(body)).await
    }

    /// GET an internal path and parse the accepted-window response as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ShellError> {
        let url = format!("{}{}", self.host, Self::normalize_path(path));
        let (status, body) = self.send(self.http.get(url)).await?;

        if let Some(err) = interpret_error(status, &body) {
            return Err(err);
        }
        serde_json::from_slice(&body).map_err(|e| ShellError::Decode(e.to_string()))
    }

    /// POST a custom-action envelope to a fully resolved endpoint URL.
    ///
    /// Action endpoints follow plain request/response semantics: only 2xx is a
    /// success, and the caller maps failures onto the proxy phase they hit.
    pub async fn call_action<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ActionCallError> {
        let response = self
            .authenticated(self.http.post(url).json(body))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url, "action endpoint unreachable");
                ActionCallError::Unreachable(e.to_string())
            })?;

        let status = response.status().as_u16();
        if !(200..=299).contains(&status) {
            return Err(ActionCallError::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ActionCallError::Unreachable(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| ActionCallError::Malformed(e.to_string()))
    }
}

/// Turn a non-accepted status into the matching failure, preferring the API's
/// own message when the body carries one.
pub(crate) fn interpret_error(status: u16, body: &[u8]) -> Option<ShellError> {
    if ACCEPTED_STATUS.contains(&status) {
        return None;
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => Some(ShellError::Denied(parsed.message)),
        Err(_) => Some(ShellError::ApiError(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> InternalApi {
        InternalApi::new(&ShellConfig {
            gitlab_url: "http://localhost:3000/".to_string(),
            ..ShellConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn relative_paths_gain_the_internal_prefix() {
        assert_eq!(
            InternalApi::normalize_path("/allowed"),
            "/api/v4/internal/allowed"
        );
        assert_eq!(
            InternalApi::normalize_path("discover"),
            "/api/v4/internal/discover"
        );
        assert_eq!(
            InternalApi::normalize_path("/api/v4/internal/allowed"),
            "/api/v4/internal/allowed"
        );
    }

    #[test]
    fn action_endpoints_resolve_against_the_host() {
        let api = api();
        assert_eq!(
            api.resolve_endpoint("/geo/proxy_git_push_ssh/push"),
            "http://localhost:3000/geo/proxy_git_push_ssh/push"
        );
        assert_eq!(
            api.resolve_endpoint("geo/proxy_git_push_ssh/push"),
            "http://localhost:3000/geo/proxy_git_push_ssh/push"
        );
        assert_eq!(
            api.resolve_endpoint("https://primary.example/push"),
            "https://primary.example/push"
        );
    }

    #[test]
    fn custom_action_status_is_not_an_error() {
        assert!(interpret_error(300, b"{}").is_none());
        assert!(interpret_error(200, b"{}").is_none());
    }

    #[test]
    fn error_body_message_wins_over_the_status() {
        let err = interpret_error(403, br#"{ "message": "Not allowed!" }"#).unwrap();
        assert_eq!(err.user_message(), "Not allowed!");
    }

    #[test]
    fn bare_error_status_maps_to_the_status_line() {
        let err = interpret_error(403, b"").unwrap();
        assert_eq!(err.user_message(), "Internal API error (403)");
    }

    #[test]
    fn missing_endpoint_configuration_fails_closed() {
        let result = InternalApi::new(&ShellConfig {
            gitlab_url: String::new(),
            ..ShellConfig::default()
        });
        assert!(matches!(result, Err(ShellError::ApiUnreachable(_))));
    }
}
