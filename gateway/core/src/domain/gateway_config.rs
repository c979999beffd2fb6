// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a Keygate gateway, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Listener address and HTTP route paths
// - Credential table with per-credential permission entries
// - Dispatch and listing policy switches
// - Session buffer sizes and idle timeout
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "keygate.dev/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "keygate.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable gateway name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Gateway configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Known bearer credentials and what each may invoke
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Route that opens the event stream
    #[serde(default = "default_sse_path")]
    pub sse_path: String,

    /// Route that accepts inbound messages (`?session_id=` query)
    #[serde(default = "default_messages_path")]
    pub messages_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Stable identifier, used in logs instead of the token
    pub id: String,

    /// Literal token, or `env:VAR` to read it from the environment at load time
    pub token: String,

    /// Capability names or patterns (`*`, `prefix*`)
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl CredentialConfig {
    pub fn resolve_token(&self) -> anyhow::Result<String> {
        match self.token.strip_prefix("env:") {
            Some(var) => std::env::var(var).map_err(|_| {
                anyhow::anyhow!(
                    "Token for credential '{}' references unset environment variable {}",
                    self.id,
                    var
                )
            }),
            None => Ok(self.token.clone()),
        }
    }
}

/// When the permission check runs relative to the registry lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchOrder {
    /// Resolve the capability and validate arguments, then authorize.
    #[default]
    ExistenceFirst,
    /// Authorize by name before anything else, so denied callers cannot tell
    /// which capabilities exist.
    DenyFirst,
}

/// Which capabilities a listing request returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingPolicy {
    /// Everything registered; enforcement happens at invocation.
    #[default]
    All,
    /// Only what the caller's permission set covers.
    Permitted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub dispatch_order: DispatchOrder,

    #[serde(default)]
    pub listing: ListingPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bounded inbound queue per session; submitters wait when it is full
    #[serde(default = "default_buffer")]
    pub inbound_buffer: usize,

    /// Bounded outbound queue per session
    #[serde(default = "default_buffer")]
    pub outbound_buffer: usize,

    /// Calls one session may run at once. A finished call still counts until
    /// its reply is in the outbound queue, so a stalled reader stops the
    /// worker from taking more work and submitters wait on the inbound queue.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Close a session with no traffic and no in-flight calls after this many
    /// seconds. Zero disables the timeout.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (json, compact)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Serve Prometheus metrics on /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_sse_path() -> String {
    "/sse".to_string()
}

fn default_messages_path() -> String {
    "/messages/".to_string()
}

fn default_buffer() -> usize {
    64
}

fn default_max_in_flight() -> usize {
    16
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            sse_path: default_sse_path(),
            messages_path: default_messages_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_buffer: default_buffer(),
            outbound_buffer: default_buffer(),
            max_in_flight: default_max_in_flight(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: true,
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "keygate".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. KEYGATE_CONFIG_PATH environment variable
    /// 2. ./keygate-config.yaml (working directory)
    /// 3. ~/.keygate/config.yaml (user home)
    /// 4. /etc/keygate/config.yaml (system, Unix) or C:\ProgramData\Keygate\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("KEYGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./keygate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".keygate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/keygate/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Keygate\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using empty defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KEYGATE_BIND_ADDRESS") {
            tracing::info!("Environment override: KEYGATE_BIND_ADDRESS={}", val);
            self.spec.server.bind_address = val;
        }

        if let Ok(val) = std::env::var("KEYGATE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: KEYGATE_PORT={}", port);
                    self.spec.server.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for KEYGATE_PORT: '{}'. Ignoring.", val);
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let http = &self.spec.http;
        for (field, path) in [("sse_path", &http.sse_path), ("messages_path", &http.messages_path)] {
            if !path.starts_with('/') {
                anyhow::bail!("spec.http.{} must start with '/': '{}'", field, path);
            }
        }
        if http.sse_path.trim_end_matches('/') == http.messages_path.trim_end_matches('/') {
            anyhow::bail!("spec.http.sse_path and spec.http.messages_path must differ");
        }

        if self.spec.session.inbound_buffer == 0 {
            anyhow::bail!("spec.session.inbound_buffer must be greater than zero");
        }
        if self.spec.session.outbound_buffer == 0 {
            anyhow::bail!("spec.session.outbound_buffer must be greater than zero");
        }
        if self.spec.session.max_in_flight == 0 {
            anyhow::bail!("spec.session.max_in_flight must be greater than zero");
        }

        let mut ids = HashSet::new();
        let mut tokens: HashSet<String> = HashSet::new();
        for credential in &self.spec.credentials {
            if credential.id.is_empty() {
                anyhow::bail!("Credential id cannot be empty");
            }
            if credential.token.is_empty() {
                anyhow::bail!("Credential token cannot be empty for: {}", credential.id);
            }
            if !ids.insert(credential.id.as_str()) {
                anyhow::bail!("Duplicate credential id: {}", credential.id);
            }
            // Compare what clients will actually present, after `env:` lookup.
            if !tokens.insert(credential.resolve_token()?) {
                anyhow::bail!("Credential '{}' reuses a token already assigned to another credential", credential.id);
            }
            for permission in &credential.permissions {
                if permission.is_empty() {
                    anyhow::bail!("Empty permission entry for credential: {}", credential.id);
                }
            }
        }

        match self.spec.observability.log_format.as_str() {
            "json" | "compact" => {}
            other => anyhow::bail!("Invalid log_format: '{}'. Must be 'json' or 'compact'", other),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: keygate.dev/v1
kind: GatewayConfig
metadata:
  name: test-gateway
spec:
  server:
    port: 9100
  credentials:
    - id: key1-client
      token: key1
      permissions: [add, subtract]
    - id: key2-client
      token: key2
      permissions: [add]
  policy:
    dispatch_order: deny-first
    listing: permitted
"#;

    #[test]
    fn test_default_manifest() {
        let manifest = GatewayConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert!(manifest.spec.credentials.is_empty());
        assert_eq!(manifest.spec.http.sse_path, "/sse");
        assert_eq!(manifest.spec.policy.dispatch_order, DispatchOrder::ExistenceFirst);
        assert_eq!(manifest.spec.policy.listing, ListingPolicy::All);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(manifest.metadata.name, "test-gateway");
        assert_eq!(manifest.spec.server.port, 9100);
        assert_eq!(manifest.spec.server.bind_address, "127.0.0.1");
        assert_eq!(manifest.spec.credentials.len(), 2);
        assert_eq!(manifest.spec.credentials[1].permissions, vec!["add".to_string()]);
        assert_eq!(manifest.spec.policy.dispatch_order, DispatchOrder::DenyFirst);
        assert_eq!(manifest.spec.policy.listing, ListingPolicy::Permitted);
        assert_eq!(manifest.spec.session.inbound_buffer, 64);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keygate-config.yaml");

        let manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = GatewayConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.credentials[0].id, "key1-client");
        assert_eq!(loaded.spec.policy.listing, ListingPolicy::Permitted);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(GatewayConfigManifest::load_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_validation() {
        let mut manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.session.outbound_buffer = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.session.outbound_buffer = 8;

        manifest.spec.http.messages_path = "messages".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.http.messages_path = "/messages/".to_string();

        manifest.spec.credentials[1].id = "key1-client".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.credentials[1].id = "key2-client".to_string();

        manifest.spec.credentials[1].token = "key1".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.credentials[1].token = "key2".to_string();

        manifest.spec.session.max_in_flight = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.session.max_in_flight = 4;

        manifest.spec.observability.log_format = "pretty".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_tokens_must_resolve_to_distinct_values() {
        std::env::set_var("KEYGATE_TEST_ADMIN_TOKEN", "shared-secret");
        std::env::set_var("KEYGATE_TEST_GUEST_TOKEN", "shared-secret");

        let mut manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.spec.credentials[0].token = "env:KEYGATE_TEST_ADMIN_TOKEN".to_string();
        manifest.spec.credentials[1].token = "env:KEYGATE_TEST_GUEST_TOKEN".to_string();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("reuses a token"), "{err}");

        // A literal token equal to another entry's resolved value is caught too.
        manifest.spec.credentials[1].token = "shared-secret".to_string();
        assert!(manifest.validate().is_err());

        std::env::set_var("KEYGATE_TEST_GUEST_TOKEN", "guest-secret");
        manifest.spec.credentials[1].token = "env:KEYGATE_TEST_GUEST_TOKEN".to_string();
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_unset_env_token_fails_validation() {
        std::env::remove_var("KEYGATE_TEST_MISSING_TOKEN");
        let mut manifest = GatewayConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.spec.credentials[0].token = "env:KEYGATE_TEST_MISSING_TOKEN".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_token_resolution() {
        let credential = CredentialConfig {
            id: "ci".to_string(),
            token: "env:KEYGATE_TEST_UNSET_TOKEN_VAR".to_string(),
            permissions: vec![],
        };
        std::env::remove_var("KEYGATE_TEST_UNSET_TOKEN_VAR");
        assert!(credential.resolve_token().is_err());

        let literal = CredentialConfig {
            token: "plain".to_string(),
            ..credential
        };
        assert_eq!(literal.resolve_token().unwrap(), "plain");
    }
}
