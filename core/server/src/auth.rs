//! Bearer-token authorization.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Access level of a token. `Edit` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Read,
    Edit,
}

#[derive(Debug, Clone)]
struct Grant {
    token: String,
    role: Role,
    label: String,
}

/// Configured tokens, checked in constant time per candidate.
#[derive(Debug, Clone)]
pub struct TokenTable {
    require_auth: bool,
    grants: Vec<Grant>,
}

impl TokenTable {
    /// Build the table from server settings.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            require_auth: config.require_auth,
            grants: config
                .tokens
                .iter()
                .map(|t| Grant {
                    token: t.token.clone(),
                    role: t.role,
                    label: if t.label.is_empty() {
                        "unnamed".to_string()
                    } else {
                        t.label.clone()
                    },
                })
                .collect(),
        }
    }

    /// A table that lets every request through with full access.
    pub fn open() -> Self {
        Self {
            require_auth: false,
            grants: Vec::new(),
        }
    }

    /// Identify the caller from an `Authorization` header value.
    ///
    /// # Errors
    /// - `Unauthorized` if authentication is required and the header is
    ///   missing, malformed, or names no configured token
    pub fn authenticate(&self, header: Option<&str>) -> Result<Caller, ApiError> {
        if !self.require_auth {
            return Ok(Caller {
                label: "anonymous".to_string(),
                role: Role::Edit,
            });
        }

        let presented = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let grant = self
            .grants
            .iter()
            .find(|g| bool::from(g.token.as_bytes().ct_eq(presented.as_bytes())))
            .ok_or_else(|| {
                warn!("Rejected request with unknown token");
                ApiError::Unauthorized
            })?;

        debug!("Authenticated '{}' ({:?})", grant.label, grant.role);
        Ok(Caller {
            label: grant.label.clone(),
            role: grant.role,
        })
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Token label, "anonymous" when authentication is disabled.
    pub label: String,
    /// Granted access level.
    pub role: Role,
}

impl Caller {
    /// Ensure the caller holds at least `role`.
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role >= role {
            Ok(())
        } else {
            warn!("'{}' lacks {:?} access", self.label, role);
            Err(ApiError::Forbidden)
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        state.tokens.authenticate(header)
    }
}
