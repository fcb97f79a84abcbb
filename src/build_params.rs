//! Typed view over the `key=value` parameter map.
//!
//! Absent keys stay `None`; only `SERVER_PASS` and `LOG_LEVEL` carry defaults.

use std::collections::HashMap;
use std::fmt;

use crate::config::{self, ConfigError};
use crate::logging::LogLevel;

pub const DEFAULT_PASSWORD: &str = "dell";

#[derive(Clone, PartialEq, Eq)]
pub struct BuildParameters {
    pub server_ip: Option<String>,
    pub server_user: Option<String>,
    pub server_pass: String,
    pub build_method: Option<String>,
    pub images: Option<String>,
    pub omnia_branch: Option<String>,
    pub log_level: LogLevel,
}

impl BuildParameters {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_map(&config::load_config(path)?))
    }

    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            server_ip: map.get("SERVER_IP").cloned(),
            server_user: map.get("SERVER_USER").cloned(),
            server_pass: map
                .get("SERVER_PASS")
                .cloned()
                .unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            build_method: map.get("BUILD_METHOD").cloned(),
            images: map.get("IMAGES").cloned(),
            omnia_branch: map.get("OMNIA_BRANCH").cloned(),
            log_level: LogLevel::from_str(map.get("LOG_LEVEL").map_or("INFO", |v| v.as_str())),
        }
    }

    /// Lines printed before the sequence starts. The password is left out.
    pub fn summary(&self) -> Vec<String> {
        vec![
            "=== Build Parameters ===".to_string(),
            format!("Host: {}", display_opt(&self.server_ip)),
            format!("User: {}", display_opt(&self.server_user)),
            format!("Build Method: {}", display_opt(&self.build_method)),
            format!("Images: {}", display_opt(&self.images)),
            format!("branch: {}", display_opt(&self.omnia_branch)),
        ]
    }
}

impl fmt::Debug for BuildParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildParameters")
            .field("server_ip", &self.server_ip)
            .field("server_user", &self.server_user)
            .field("server_pass", &"<redacted>")
            .field("build_method", &self.build_method)
            .field("images", &self.images)
            .field("omnia_branch", &self.omnia_branch)
            .field("log_level", &self.log_level)
            .finish()
    }
}

pub(crate) fn display_opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<unset>")
}
