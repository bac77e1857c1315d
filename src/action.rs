//! Resolution of an authorization response into the required action.
//!
//! The decision payload is a tagged union over the capability set the shell
//! implements: run the git command locally, or perform a server-directed
//! custom action instead. The tag alone selects the handler; an unrecognized
//! tag is a version mismatch between shell and API and fails loudly rather
//! than falling back to local execution.

use serde::{Deserialize, Serialize};

use crate::errors::ShellError;
use crate::verifier::AuthorizationResponse;

/// Tag of the geo-proxy action: forward the push to the primary over HTTP.
pub const GEO_PROXY_TAG: &str = "geo_proxy_to_primary";

/// Data object of the geo-proxy action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeoProxyData {
    /// Ordered pair: info-refs endpoint first, push endpoint second.
    #[serde(default)]
    pub api_endpoints: Vec<String>,
    #[serde(default)]
    pub gl_username: String,
    /// The repository URL on the primary, informational only.
    #[serde(default)]
    pub primary_repo: String,
    /// Operator message shown before the proxy session starts.
    #[serde(default)]
    pub info_message: String,
    /// Filled in from the authorization response before the envelope is sent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gl_id: Option<String>,
}

/// A server-directed instruction, one variant per known action kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    GeoProxyToPrimary(GeoProxyData),
}

impl Action {
    /// Parse a payload's `data` object according to its tag.
    pub fn from_payload(tag: &str, data: &serde_json::Value) -> Result<Self, ShellError> {
        match tag {
            GEO_PROXY_TAG => {
                let data: GeoProxyData = serde_json::from_value(data.clone())
                    .map_err(|e| ShellError::Decode(e.to_string()))?;
                if data.api_endpoints.len() != 2 {
                    return Err(ShellError::Decode(format!(
                        "geo proxy action requires exactly two api endpoints, got {}",
                        data.api_endpoints.len()
                    )));
                }
                Ok(Action::GeoProxyToPrimary(data))
            }
            other => {
                tracing::warn!(tag = other, "authorization payload with unsupported action");
                Err(ShellError::UnsupportedAction(other.to_string()))
            }
        }
    }
}

/// What the authorization response requires of this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run the git command on this server.
    AllowLocal,
    /// Perform the custom action instead of executing locally.
    Custom(Action),
}

/// Classify an authorization response.
///
/// The presence of a valid action payload is authoritative, regardless of the
/// numeric status the API chose to signal it with. Without a payload, a 2xx
/// status with a positive decision allows local execution and anything else
/// denies, preferring the API's own message over the bare status line.
pub fn resolve(response: &AuthorizationResponse) -> Result<Decision, ShellError> {
    if let Some(payload) = &response.payload {
        if let Some(tag) = &payload.action {
            return Ok(Decision::Custom(Action::from_payload(tag, &payload.data)?));
        }
    }

    let success = (200..=299).contains(&response.http_status);
    if success && response.allowed {
        return Ok(Decision::AllowLocal);
    }

    if !response.message.is_empty() {
        return Err(ShellError::Denied(response.message.clone()));
    }
    Err(ShellError::ApiError(response.http_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::RawPayload;

    fn geo_payload() -> RawPayload {
        RawPayload {
            action: Some(GEO_PROXY_TAG.to_string()),
            data: serde_json::json!({
                "api_endpoints": ["/geo/info_refs", "/geo/push"],
                "gl_username": "custom",
                "primary_repo": "https://repo/path",
                "info_message": "info_message",
            }),
        }
    }

    #[test]
    fn allowed_without_payload_runs_locally() {
        let response = AuthorizationResponse {
            allowed: true,
            http_status: 200,
            ..AuthorizationResponse::default()
        };
        assert_eq!(resolve(&response).unwrap(), Decision::AllowLocal);
    }

    #[test]
    fn payload_wins_over_the_status_code() {
        // 300 Multiple Choices is how the API signals "custom action"; the
        // payload, not the number, drives the decision.
        let response = AuthorizationResponse {
            allowed: true,
            http_status: 300,
            payload: Some(geo_payload()),
            ..AuthorizationResponse::default()
        };
        match resolve(&response).unwrap() {
            Decision::Custom(Action::GeoProxyToPrimary(data)) => {
                assert_eq!(data.api_endpoints, vec!["/geo/info_refs", "/geo/push"]);
                assert_eq!(data.gl_username, "custom");
                assert_eq!(data.info_message, "info_message");
            }
            other => panic!("expected geo proxy action, got {other:?}"),
        }
    }

    #[test]
    fn non_success_without_payload_denies_with_the_status() {
        let response = AuthorizationResponse {
            http_status: 403,
            ..AuthorizationResponse::default()
        };
        let err = resolve(&response).unwrap_err();
        assert_eq!(err.user_message(), "Internal API error (403)");
    }

    #[test]
    fn deny_message_from_the_api_is_preserved() {
        let response = AuthorizationResponse {
            allowed: false,
            http_status: 200,
            message: "missing user".to_string(),
            ..AuthorizationResponse::default()
        };
        let err = resolve(&response).unwrap_err();
        assert_eq!(err.user_message(), "missing user");
    }

    #[test]
    fn unknown_action_tag_is_fatal() {
        let response = AuthorizationResponse {
            http_status: 300,
            payload: Some(RawPayload {
                action: Some("launch_the_missiles".to_string()),
                data: serde_json::Value::Null,
            }),
            ..AuthorizationResponse::default()
        };
        match resolve(&response).unwrap_err() {
            ShellError::UnsupportedAction(tag) => assert_eq!(tag, "launch_the_missiles"),
            other => panic!("expected UnsupportedAction, got {other:?}"),
        }
    }

    #[test]
    fn empty_payload_object_falls_through_to_the_status_rule() {
        let response = AuthorizationResponse {
            allowed: true,
            http_status: 200,
            payload: Some(RawPayload::default()),
            ..AuthorizationResponse::default()
        };
        assert_eq!(resolve(&response).unwrap(), Decision::AllowLocal);
    }

    #[test]
    fn wrong_endpoint_count_is_rejected() {
        let response = AuthorizationResponse {
            http_status: 300,
            payload: Some(RawPayload {
                action: Some(GEO_PROXY_TAG.to_string()),
                data: serde_json::json!({ "api_endpoints": ["/only-one"] }),
            }),
            ..AuthorizationResponse::default()
        };
        assert!(matches!(
            resolve(&response).unwrap_err(),
            ShellError::Decode(_)
        ));
    }
}
