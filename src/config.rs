use serde::{Deserialize, Serialize};

/// Credentials attached to every internal API request when present.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HttpSettings {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Configuration for the shell proxy.
///
/// Deserialized from the operator's config file by the hosting process; every
/// field has a default so partial files parse.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ShellConfig {
    /// Base URL of the internal API host, e.g. `http://localhost:8080`.
    pub gitlab_url: String,
    /// Shared secret sent base64-encoded on every internal API request.
    pub secret: String,
    pub http_settings: HttpSettings,
    /// Upper bound for a buffered push payload, in bytes.
    ///
    /// The push phase is store-and-forward: the caller's input is read to EOF
    /// before the one outbound HTTP call. This cap keeps that buffering
    /// bounded; a transfer above it fails instead of growing without limit.
    pub max_proxy_payload: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            gitlab_url: "http://localhost:8080".to_string(),
            secret: String::new(),
            http_settings: HttpSettings::default(),
            max_proxy_payload: 256 * 1024 * 1024,
        }
    }
}
