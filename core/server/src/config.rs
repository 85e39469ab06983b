//! Service configuration.
//!
//! One JSON document configures the HTTP surface, the store backend and
//! the sync engine. Every section is optional and falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use campussync_common::{Error, Result};
use campussync_sync::SyncConfig;

use crate::auth::Role;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default route namespace.
pub const DEFAULT_NAMESPACE: &str = "/campus/v1";

/// A bearer token accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Secret presented as `Authorization: Bearer <token>`.
    pub token: String,
    /// Access level granted to the token.
    pub role: Role,
    /// Name used in logs.
    #[serde(default)]
    pub label: String,
}

impl TokenConfig {
    /// Generate a fresh random token.
    pub fn generate(role: Role, label: impl Into<String>) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            role,
            label: label.into(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: String,
    /// Path prefix for every route (e.g. "/campus/v1").
    pub namespace: String,
    /// Reject requests without a known token.
    pub require_auth: bool,
    /// Accepted tokens.
    pub tokens: Vec<TokenConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            require_auth: true,
            tokens: Vec::new(),
        }
    }
}

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend name in the store registry (e.g., "memory", "local").
    pub backend: String,
    /// Backend-specific options.
    pub options: serde_json::Value,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            options: serde_json::json!({}),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

impl ServiceConfig {
    /// Starter configuration written by `init-config`: a local store under
    /// `data_root` and one generated edit token.
    pub fn starter(data_root: impl AsRef<Path>) -> Self {
        Self {
            server: ServerConfig {
                tokens: vec![TokenConfig::generate(Role::Edit, "admin")],
                ..ServerConfig::default()
            },
            store: StoreConfig {
                backend: "local".to_string(),
                options: serde_json::json!({
                    "root": data_root.as_ref().to_string_lossy(),
                }),
            },
            sync: SyncConfig::default(),
        }
    }

    /// Check the configuration for contradictions.
    ///
    /// # Errors
    /// - Namespace does not start with `/` or ends with one
    /// - Authentication required but no tokens configured
    /// - Invalid sync settings
    pub fn validate(&self) -> Result<()> {
        let namespace = &self.server.namespace;
        if !namespace.starts_with('/') || namespace.ends_with('/') {
            return Err(Error::InvalidInput(format!(
                "Namespace must start with '/' and not end with one: '{}'",
                namespace
            )));
        }
        if self.server.require_auth && self.server.tokens.is_empty() {
            return Err(Error::InvalidInput(
                "require_auth is set but no tokens are configured".to_string(),
            ));
        }
        if self.server.tokens.iter().any(|t| t.token.trim().is_empty()) {
            return Err(Error::InvalidInput("Tokens must not be empty".to_string()));
        }
        self.sync.validate()
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Read and validate a configuration file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON
    /// - Validation failure
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        config.validate()?;
        Ok(config)
    }
}
