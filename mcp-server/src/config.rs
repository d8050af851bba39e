use anyhow::{Context as _, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;

/// Full server configuration: defaults in code < config file < environment.
/// Disabling any feature flag must leave the core operations functionally
/// correct; flags only shed enhancement work.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub context: ContextConfig,
    pub vision: VisionConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Optional database URL; defaults to a per-user data directory
    pub url: Option<String>,
    pub max_connections: u32,
    /// Seconds
    pub connection_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Context-engine behaviour
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    /// Auto-create missing ancestor contexts during create
    pub auto_create: bool,
    /// Organization name stamped into the bootstrapped global context
    pub organization_name: String,
}

/// Vision-system feature flags
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VisionConfig {
    pub enabled: bool,
    pub context_enforcement: ContextEnforcementConfig,
    pub progress_tracking: ToggleConfig,
    pub workflow_hints: WorkflowHintsConfig,
    pub enrichment: ToggleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextEnforcementConfig {
    pub enabled: bool,
    pub require_completion_summary: bool,
    pub min_summary_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToggleConfig {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowHintsConfig {
    pub enabled: bool,
    pub max_hints: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PerformanceConfig {
    pub cache: CacheConfig,
    pub overhead_limits: OverheadLimitsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverheadLimitsConfig {
    pub max_enrichment_ms: u64,
    pub fail_gracefully: bool,
}

impl Config {
    /// Load defaults, then an optional CONFIG_FILE, then STRATA__* env vars
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("STRATA")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("STRATA")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder
            .build()
            .context("Failed to build configuration from file")?;
        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration from file")?;
        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    /// Standard deployment variables win over everything
    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(database_url) = env::var("DATABASE_URL") {
            config.database.url = Some(database_url);
        }
        if let Ok(listen_addr) = env::var("LISTEN_ADDR") {
            config.server.listen_addr = listen_addr;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }

    /// Configured database URL, or the per-user default location
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => Self::default_database_url(),
        }
    }

    pub fn default_database_url() -> String {
        if let Ok(xdg_data) = env::var("XDG_DATA_HOME") {
            return format!("sqlite://{xdg_data}/strata-mcp/strata.sqlite");
        }
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        format!("sqlite://{home}/strata.sqlite")
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ));
            }
        }

        let database_url = self.database_url();
        if !database_url.starts_with("sqlite://") {
            return Err(anyhow::anyhow!(
                "Only SQLite databases are supported. URL must start with 'sqlite://'. Got: {}",
                database_url
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!(
                "Database max_connections must be greater than 0"
            ));
        }
        if self.performance.cache.ttl_seconds <= 0 {
            return Err(anyhow::anyhow!("Cache TTL must be positive"));
        }
        if self.vision.workflow_hints.max_hints == 0 {
            return Err(anyhow::anyhow!("workflow_hints.max_hints must be at least 1"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connection_timeout: 30,
            },
            server: ServerConfig {
                listen_addr: "127.0.0.1".to_string(),
                port: 3000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            context: ContextConfig {
                auto_create: true,
                organization_name: "default_organization".to_string(),
            },
            vision: VisionConfig {
                enabled: true,
                context_enforcement: ContextEnforcementConfig {
                    enabled: true,
                    require_completion_summary: true,
                    min_summary_length: 1,
                },
                progress_tracking: ToggleConfig { enabled: true },
                workflow_hints: WorkflowHintsConfig {
                    enabled: true,
                    max_hints: 5,
                },
                enrichment: ToggleConfig { enabled: true },
            },
            performance: PerformanceConfig {
                cache: CacheConfig {
                    enabled: true,
                    ttl_seconds: 300,
                },
                overhead_limits: OverheadLimitsConfig {
                    max_enrichment_ms: 100,
                    fail_gracefully: true,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_address(), "127.0.0.1:3000");
        assert!(config.vision.context_enforcement.require_completion_summary);
        assert!(config.performance.cache.enabled);
    }

    #[test]
    fn embedded_defaults_parse() {
        let config = Config::from_env().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.vision.workflow_hints.max_hints, 5);
        assert_eq!(config.performance.cache.ttl_seconds, 300);
        assert!(config.context.auto_create);
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.performance.cache.ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn database_url_fallback() {
        let config = Config::default();
        assert!(config.database_url().starts_with("sqlite://"));

        let mut config = Config::default();
        config.database.url = Some("sqlite://custom.db".to_string());
        assert_eq!(config.database_url(), "sqlite://custom.db");
    }
}
