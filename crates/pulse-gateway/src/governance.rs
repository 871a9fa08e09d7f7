//! First-run governance payloads.

use crate::MIN_PASSWORD_LEN;
use pulse_protocol_types::GatewayError;
use serde::{Deserialize, Serialize};

/// Response of `GET /governance/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceStatus {
    /// True once the first administrator exists.
    pub initialized: bool,
}

/// Body of `POST /governance/bootstrap-admin`.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapAdminRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Confirmation entry; checked locally, never sent.
    #[serde(skip)]
    pub confirm_password: String,
}

impl BootstrapAdminRequest {
    /// Local checks run before the request leaves the client.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.password != self.confirm_password {
            return Err(GatewayError::Validation("Passwords do not match".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GatewayError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.email.trim().is_empty() {
            return Err(GatewayError::Validation("Email is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrappedUser {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response of a successful bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapAdminResponse {
    pub user: BootstrappedUser,
}
