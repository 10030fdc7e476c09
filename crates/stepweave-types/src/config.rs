//! Configuration types for stepweave.
//!
//! `StepweaveConfig` represents the top-level `config.toml` that tunes the
//! engine, the recovery scanner and the capability endpoints.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.stepweave/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepweaveConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub agent: AgentEndpointConfig,
    #[serde(default)]
    pub mcp: McpEndpointConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Execution engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Runaway-loop ceiling: maximum loop iterations per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Deadline applied to each member of a parallel group.
    #[serde(default = "default_parallel_step_timeout_secs")]
    pub parallel_step_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    100
}

fn default_parallel_step_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            parallel_step_timeout_secs: default_parallel_step_timeout_secs(),
        }
    }
}

/// Stale-execution scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Running/pending executions older than this are crash candidates.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Interval of the periodic scan.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_scan_interval_secs() -> u64 {
    60
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

/// Where agent steps are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpointConfig {
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_agent_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_agent_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_agent_api_key_env() -> String {
    "STEPWEAVE_AGENT_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for AgentEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: default_agent_endpoint(),
            api_key_env: default_agent_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Where `mcp` script steps are sent. Unset disables MCP delegation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpEndpointConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Size of the read-only pool serving status queries and `sql` steps.
    #[serde(default = "default_read_connections")]
    pub read_connections: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_read_connections() -> u32 {
    8
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            read_connections: default_read_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}
