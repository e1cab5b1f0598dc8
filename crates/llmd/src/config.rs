//! Configuration management for llmd.
//!
//! Loads settings from /etc/llmd/config.toml or uses defaults. Every field
//! has a default, so a partial file only overrides what it names.

use crate::controller::LifecycleTimings;
use crate::registry::ServiceSpec;
use anyhow::{bail, Context, Result};
use llm_common::{ServiceName, DEFAULT_LISTEN_ADDR};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/llmd/config.toml";

/// Directory the control scripts run in when none is configured
pub const DEFAULT_PROJECT_DIR: &str = "/opt/globalnews-letter";

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Working directory for control scripts; relative script paths resolve here
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub services: ServicesConfig,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PROJECT_DIR)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            lifecycle: LifecycleConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Logging settings (RUST_LOG takes precedence)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Timeouts and retry bounds for lifecycle operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Hard wall-clock limit for a control script
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,

    /// Timeout of a single health probe
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Health polls after a clean start script before giving up
    #[serde(default = "default_start_poll_attempts")]
    pub start_poll_attempts: u32,

    /// Delay before each health poll
    #[serde(default = "default_start_poll_interval")]
    pub start_poll_interval_secs: u64,

    /// Wait after a stop script before reconciling
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Program used to run control scripts
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

fn default_script_timeout() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_start_poll_attempts() -> u32 {
    15
}

fn default_start_poll_interval() -> u64 {
    2
}

fn default_settle_delay() -> u64 {
    2
}

fn default_interpreter() -> String {
    "bash".to_string()
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout(),
            health_timeout_secs: default_health_timeout(),
            start_poll_attempts: default_start_poll_attempts(),
            start_poll_interval_secs: default_start_poll_interval(),
            settle_delay_secs: default_settle_delay(),
            interpreter: default_interpreter(),
        }
    }
}

impl LifecycleConfig {
    pub fn timings(&self) -> LifecycleTimings {
        LifecycleTimings {
            start_poll_attempts: self.start_poll_attempts,
            start_poll_interval: Duration::from_secs(self.start_poll_interval_secs),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
        }
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Static definition of one managed service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub port: u16,
    pub health_url: String,
    pub endpoint: String,
    pub start_script: PathBuf,
    pub stop_script: PathBuf,
}

impl ServiceConfig {
    /// Conventional layout: `llm-control/{start,stop}-<name>.sh` next to a
    /// `/health` route on localhost
    fn local(name: ServiceName, port: u16) -> Self {
        let endpoint = format!("http://localhost:{}", port);
        Self {
            port,
            health_url: format!("{}/health", endpoint),
            endpoint,
            start_script: PathBuf::from(format!("llm-control/start-{}.sh", name)),
            stop_script: PathBuf::from(format!("llm-control/stop-{}.sh", name)),
        }
    }
}

/// One table per member of the fixed service set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesConfig {
    #[serde(default = "default_nllb")]
    pub nllb: ServiceConfig,

    #[serde(default = "default_ollama")]
    pub ollama: ServiceConfig,
}

fn default_nllb() -> ServiceConfig {
    ServiceConfig::local(ServiceName::Nllb, 8000)
}

fn default_ollama() -> ServiceConfig {
    ServiceConfig::local(ServiceName::Ollama, 8001)
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            nllb: default_nllb(),
            ollama: default_ollama(),
        }
    }
}

impl ServicesConfig {
    pub fn get(&self, name: ServiceName) -> &ServiceConfig {
        match name {
            ServiceName::Nllb => &self.nllb,
            ServiceName::Ollama => &self.ollama,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let lc = &self.lifecycle;
        if lc.start_poll_attempts == 0 {
            bail!("lifecycle.start_poll_attempts must be at least 1");
        }
        if lc.script_timeout_secs == 0 || lc.health_timeout_secs == 0 {
            bail!("lifecycle timeouts must be non-zero");
        }
        if lc.interpreter.trim().is_empty() {
            bail!("lifecycle.interpreter must not be empty");
        }

        let mut ports = HashSet::new();
        for name in ServiceName::ALL {
            let svc = self.services.get(name);
            if !ports.insert(svc.port) {
                bail!("services.{} reuses port {}", name, svc.port);
            }
        }

        Ok(())
    }

    /// Resolved service definitions, script paths made absolute
    pub fn service_specs(&self) -> Vec<ServiceSpec> {
        ServiceName::ALL
            .into_iter()
            .map(|name| {
                let svc = self.services.get(name);
                ServiceSpec {
                    name,
                    port: svc.port,
                    health_url: svc.health_url.clone(),
                    endpoint: svc.endpoint.clone(),
                    start_script: self.resolve(&svc.start_script),
                    stop_script: self.resolve(&svc.stop_script),
                }
            })
            .collect()
    }

    fn resolve(&self, script: &Path) -> PathBuf {
        if script.is_absolute() {
            script.to_path_buf()
        } else {
            self.project_dir.join(script)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = Config::default();
        assert_eq!(config.server.listen, "0.0.0.0:7999");
        assert_eq!(config.services.nllb.port, 8000);
        assert_eq!(config.services.ollama.port, 8001);
        assert_eq!(config.services.nllb.health_url, "http://localhost:8000/health");
        assert_eq!(config.services.ollama.endpoint, "http://localhost:8001");
        assert_eq!(config.lifecycle.script_timeout_secs, 30);
        assert_eq!(config.lifecycle.start_poll_attempts, 15);

        let timings = config.lifecycle.timings();
        assert_eq!(timings.start_poll_interval, Duration::from_secs(2));
        assert_eq!(timings.settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            project_dir = "/srv/news"

            [lifecycle]
            start_poll_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle.start_poll_attempts, 3);
        assert_eq!(config.lifecycle.settle_delay_secs, 2);
        assert_eq!(config.services.ollama.port, 8001);
    }

    #[test]
    fn test_service_specs_resolve_scripts() {
        let config = Config::from_toml_str(
            r#"
            project_dir = "/srv/news"

            [services.ollama]
            port = 9001
            health_url = "http://127.0.0.1:9001/health"
            endpoint = "http://127.0.0.1:9001"
            start_script = "/usr/local/bin/ollama-up"
            stop_script = "bin/ollama-down"
            "#,
        )
        .unwrap();

        let specs = config.service_specs();
        assert_eq!(specs.len(), 2);

        let nllb = specs.iter().find(|s| s.name == ServiceName::Nllb).unwrap();
        assert_eq!(
            nllb.start_script,
            PathBuf::from("/srv/news/llm-control/start-nllb.sh")
        );

        let ollama = specs.iter().find(|s| s.name == ServiceName::Ollama).unwrap();
        assert_eq!(ollama.port, 9001);
        assert_eq!(ollama.start_script, PathBuf::from("/usr/local/bin/ollama-up"));
        assert_eq!(ollama.stop_script, PathBuf::from("/srv/news/bin/ollama-down"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = Config::from_toml_str("[lifecycle]\nstart_poll_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("start_poll_attempts"));
    }

    #[test]
    fn test_rejects_shared_port() {
        let toml = r#"
            [services.ollama]
            port = 8000
            health_url = "http://localhost:8000/health"
            endpoint = "http://localhost:8000"
            start_script = "a.sh"
            stop_script = "b.sh"
        "#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_unknown_service_table_rejected() {
        let toml = r#"
            [services.whisper]
            port = 8002
        "#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.project_dir, PathBuf::from(DEFAULT_PROJECT_DIR));
    }
}
