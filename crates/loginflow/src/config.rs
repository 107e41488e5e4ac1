//! Workflow configuration.

use loginflow_timer::TimerConfig;
use serde::{Deserialize, Serialize};

use crate::LoginflowError;

/// Routes and timer settings for a [`SessionWorkflow`](crate::SessionWorkflow).
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```json
/// { "landing_route": "/dashboard", "timer": { "idle_timeout_secs": 900 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Where a login lands when there is no pre-auth URL or usable last path.
    pub landing_route: String,

    /// Where post-auth failures send the user after the redirect delay.
    pub logout_route: String,

    /// Session timer settings.
    pub timer: TimerConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            landing_route: "/home".to_string(),
            logout_route: "/logout".to_string(),
            timer: TimerConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Parses a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, LoginflowError> {
        Ok(serde_json::from_str(json)?)
    }
}
