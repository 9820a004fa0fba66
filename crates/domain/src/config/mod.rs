mod admission;
mod audit;
mod auth;
mod executor;
mod observability;
mod server;
mod sessions;
mod transcript;

pub use admission::*;
pub use audit::*;
pub use auth::*;
pub use executor::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;
pub use transcript::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                errors.push(ConfigError::error(
                    "server.rate_limit",
                    "requests_per_second and burst_size must be greater than 0",
                ));
            }
        }

        if self.auth.secret_env.is_empty() {
            errors.push(ConfigError::error("auth.secret_env", "must name an environment variable"));
        }
        if self.auth.token_ttl_hours == 0 {
            errors.push(ConfigError::error("auth.token_ttl_hours", "must be greater than 0"));
        }

        if self.sessions.timeout_secs == 0 {
            errors.push(ConfigError::error("sessions.timeout_secs", "must be greater than 0"));
        }
        if self.sessions.sweep_interval_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.sweep_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.admission.max_requests == 0 {
            errors.push(ConfigError::error(
                "admission.max_requests",
                "must be greater than 0 (every protected request would be refused)",
            ));
        }
        if self.admission.window_secs == 0 {
            errors.push(ConfigError::error("admission.window_secs", "must be greater than 0"));
        }
        if self.admission.sweep_interval_secs == 0 {
            errors.push(ConfigError::error(
                "admission.sweep_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.executor.cli_path.trim().is_empty() {
            errors.push(ConfigError::error("executor.cli_path", "must not be empty"));
        }
        if self.executor.timeout_secs == 0 {
            errors.push(ConfigError::error("executor.timeout_secs", "must be greater than 0"));
        }
        if self.executor.timeout_secs > self.sessions.timeout_secs {
            errors.push(ConfigError::warning(
                "executor.timeout_secs",
                "longer than sessions.timeout_secs; a running session outlives its idle timeout",
            ));
        }

        if self.transcript.enabled && self.transcript.purge_interval_secs == 0 {
            errors.push(ConfigError::error(
                "transcript.purge_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.audit.capacity == 0 {
            errors.push(ConfigError::error("audit.capacity", "must be greater than 0"));
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        errors
    }
}
