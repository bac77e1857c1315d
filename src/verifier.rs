//! Access verification against the internal authorization endpoint.
//!
//! One `POST /allowed` per invocation, before any proxying. The verifier only
//! performs the call and hands back the parsed decision; interpreting it into
//! an action is the resolver's job (`crate::action`).

use serde::{Deserialize, Serialize};

use crate::api::{InternalApi, interpret_error};
use crate::command::{Identity, ServiceKind};
use crate::errors::ShellError;

const SSH_ENV: &str = "ssh";

/// Placeholder sent while the receive-pack negotiation has produced no ref
/// changes yet.
const ANY_CHANGES: &str = "_any";

/// Body of the authorization call. Built once per invocation.
#[derive(Debug, Serialize)]
pub struct AuthorizationRequest {
    pub action: String,
    #[serde(rename = "project")]
    pub repo: String,
    pub changes: String,
    pub env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AuthorizationRequest {
    pub fn new(who: &Identity, service: ServiceKind, repo: &str) -> Self {
        let (key_id, username) = match who {
            Identity::KeyId(id) => (Some(id.clone()), None),
            Identity::Username(name) => (None, Some(name.clone())),
        };

        Self {
            action: service.to_string(),
            repo: repo.to_string(),
            changes: ANY_CHANGES.to_string(),
            env: SSH_ENV.to_string(),
            key_id,
            username,
        }
    }
}

/// Raw custom-action payload: the tag plus its untyped data object.
///
/// Kept untyped here so the resolver can report an unsupported tag instead of
/// failing the whole body parse.
#[derive(Debug, Deserialize, Default)]
pub struct RawPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Parsed decision payload of the authorization endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct AuthorizationResponse {
    /// The API reports the boolean decision under `status`.
    #[serde(rename = "status", default)]
    pub allowed: bool,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "gl_repository", default)]
    pub repo: String,
    #[serde(default)]
    pub gl_id: String,
    #[serde(default)]
    pub gl_username: String,
    #[serde(default)]
    pub git_protocol: String,
    #[serde(default)]
    pub payload: Option<RawPayload>,
    #[serde(rename = "gl_console_messages", default)]
    pub console_messages: Vec<String>,
    /// Numeric HTTP status, captured out-of-band from the response itself.
    #[serde(skip)]
    pub http_status: u16,
}

/// Response of the identity discovery endpoint.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct DiscoveredUser {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

impl DiscoveredUser {
    pub fn is_anonymous(&self) -> bool {
        self.id < 1
    }
}

/// Performs the single authorization call of a session.
pub struct AccessVerifier<'a> {
    api: &'a InternalApi,
}

impl<'a> AccessVerifier<'a> {
    pub fn new(api: &'a InternalApi) -> Self {
        Self { api }
    }

    /// Ask the internal API whether `who` may run `service` against `repo`.
    ///
    /// Transport failures are `ApiUnreachable`; a reachable API that answers
    /// outside the accepted window with no parseable decision becomes
    /// `ApiError` (or `Denied` when the body carries a message). A body that
    /// parses keeps its payload for the resolver even on unusual statuses.
    pub async fn verify(
        &self,
        who: &Identity,
        service: ServiceKind,
        repo: &str,
    ) -> Result<AuthorizationResponse, ShellError> {
        let request = AuthorizationRequest::new(who, service, repo);
        let (status, body) = self.api.post_raw("/allowed", &request).await?;

        match serde_json::from_slice::<AuthorizationResponse>(&body) {
            Ok(mut response) => {
                response.http_status = status;
                tracing::debug!(
                    status,
                    allowed = response.allowed,
                    custom = response
                        .payload
                        .as_ref()
                        .is_some_and(|p| p.action.is_some()),
                    "access verification completed"
                );
                Ok(response)
            }
            Err(parse_err) => {
                if let Some(err) = interpret_error(status, &body) {
                    return Err(err);
                }
                tracing::warn!(status, error = %parse_err, "unparseable authorization body");
                Err(ShellError::Decode(parse_err.to_string()))
            }
        }
    }

    /// Look up who an SSH key or username belongs to.
    pub async fn discover(&self, who: &Identity) -> Result<DiscoveredUser, ShellError> {
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        match who {
            Identity::KeyId(id) => params.append_pair("key_id", id),
            Identity::Username(name) => params.append_pair("username", name),
        };

        self.api
            .get_json(&format!("/discover?{}", params.finish()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_key_id_or_username_never_both() {
        let by_key = AuthorizationRequest::new(
            &Identity::KeyId("100".to_string()),
            ServiceKind::ReceivePack,
            "group/repo",
        );
        let json = serde_json::to_value(&by_key).unwrap();
        assert_eq!(json["key_id"], "100");
        assert!(json.get("username").is_none());
        assert_eq!(json["action"], "git-receive-pack");
        assert_eq!(json["project"], "group/repo");
        assert_eq!(json["env"], "ssh");
        assert_eq!(json["changes"], "_any");

        let by_name = AuthorizationRequest::new(
            &Identity::Username("someone".to_string()),
            ServiceKind::ReceivePack,
            "group/repo",
        );
        let json = serde_json::to_value(&by_name).unwrap();
        assert_eq!(json["username"], "someone");
        assert!(json.get("key_id").is_none());
    }

    #[test]
    fn response_parses_the_custom_payload_shape() {
        let body = r#"{
            "status": true,
            "gl_id": "user-100",
            "payload": {
                "action": "geo_proxy_to_primary",
                "data": { "api_endpoints": ["/a", "/b"] }
            },
            "gl_console_messages": ["console", "message"]
        }"#;

        let response: AuthorizationResponse = serde_json::from_str(body).unwrap();
        assert!(response.allowed);
        assert_eq!(response.gl_id, "user-100");
        assert_eq!(response.console_messages, vec!["console", "message"]);
        let payload = response.payload.unwrap();
        assert_eq!(payload.action.as_deref(), Some("geo_proxy_to_primary"));
    }

    #[test]
    fn empty_payload_object_means_no_action() {
        let response: AuthorizationResponse =
            serde_json::from_str(r#"{ "status": true, "payload": {} }"#).unwrap();
        assert!(response.payload.unwrap().action.is_none());
    }

    #[test]
    fn deny_body_with_message_parses_as_a_decision() {
        let response: AuthorizationResponse =
            serde_json::from_str(r#"{ "status": false, "message": "missing user" }"#).unwrap();
        assert!(!response.allowed);
        assert_eq!(response.message, "missing user");
    }

    #[test]
    fn anonymous_discovery() {
        let user: DiscoveredUser = serde_json::from_str("{}").unwrap();
        assert!(user.is_anonymous());

        let user: DiscoveredUser =
            serde_json::from_str(r#"{ "id": 2, "name": "Someone", "username": "someone" }"#)
                .unwrap();
        assert!(!user.is_anonymous());
    }
}
