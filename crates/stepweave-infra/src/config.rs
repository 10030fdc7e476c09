//! Configuration loader for stepweave.
//!
//! Reads `config.toml` from the data directory (`~/.stepweave/` by default)
//! and deserializes it into [`StepweaveConfig`]. Falls back to defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use stepweave_types::config::StepweaveConfig;

/// Resolve the data directory.
///
/// Priority:
/// 1. `STEPWEAVE_DATA_DIR` environment variable
/// 2. `~/.stepweave`
/// 3. `.stepweave` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STEPWEAVE_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".stepweave");
    }

    PathBuf::from(".stepweave")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`StepweaveConfig::default()`].
/// - Unreadable or unparsable file: a warning, then the default.
pub async fn load_config(data_dir: &Path) -> StepweaveConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return StepweaveConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return StepweaveConfig::default();
        }
    };

    match toml::from_str::<StepweaveConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            StepweaveConfig::default()
        }
    }
}

/// Zero limits would stall every run; treat them as unset.
fn sanitize(mut config: StepweaveConfig) -> StepweaveConfig {
    let defaults = StepweaveConfig::default();
    if config.engine.max_steps == 0 {
        tracing::warn!("engine.max_steps must be positive, using {}", defaults.engine.max_steps);
        config.engine.max_steps = defaults.engine.max_steps;
    }
    if config.engine.parallel_step_timeout_secs == 0 {
        config.engine.parallel_step_timeout_secs = defaults.engine.parallel_step_timeout_secs;
    }
    if config.recovery.scan_interval_secs == 0 {
        config.recovery.scan_interval_secs = defaults.recovery.scan_interval_secs;
    }
    if config.database.read_connections == 0 {
        config.database.read_connections = defaults.database.read_connections;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.max_steps, 100);
        assert_eq!(config.recovery.stale_after_secs, 300);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[engine]
max_steps = 40
parallel_step_timeout_secs = 5

[agent]
endpoint = "http://agents.internal:8080"
api_key_env = "AGENTS_TOKEN"

[mcp]
endpoint = "http://localhost:9090/rpc"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.max_steps, 40);
        assert_eq!(config.engine.parallel_step_timeout_secs, 5);
        assert_eq!(config.agent.endpoint, "http://agents.internal:8080");
        assert_eq!(config.agent.api_key_env, "AGENTS_TOKEN");
        assert_eq!(config.mcp.endpoint.as_deref(), Some("http://localhost:9090/rpc"));
        assert_eq!(config.recovery.scan_interval_secs, 60);
        assert_eq!(config.database.read_connections, 8);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.max_steps, 100);
        assert!(config.mcp.endpoint.is_none());
    }

    #[tokio::test]
    async fn load_config_zero_limits_fall_back() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "[engine]\nmax_steps = 0\n\n[recovery]\nscan_interval_secs = 0\n\n[database]\nread_connections = 0\n",
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.max_steps, 100);
        assert_eq!(config.recovery.scan_interval_secs, 60);
        assert_eq!(config.database.read_connections, 8);
    }

    #[test]
    fn resolve_data_dir_is_not_empty() {
        let dir = resolve_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }
}
