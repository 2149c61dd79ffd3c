use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "demodeployment";
pub const ENV_PREFIX: &str = "DEMODEPLOYMENT";

pub fn compose_config<'de, CFG: Deserialize<'de>>(external_path: &str, env_prefix: &str) -> Result<CFG, ConfigError> {
    Config::builder()

        // Add in a local configuration file
        .add_source(File::with_name(external_path).required(false))

        // Add in settings from the environment (e.g. DEMODEPLOYMENT_MAX_REPLICAS)
        .add_source(Environment::with_prefix(env_prefix))

        .build()?
        .try_deserialize()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_max_replicas")]
    pub max_replicas: i32,
    #[serde(default = "default_controller_tag")]
    pub controller_tag: String,
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,
    #[serde(default = "default_error_requeue_secs")]
    pub error_requeue_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_backoff_base_millis")]
    pub backoff_base_millis: u64,
    #[serde(default = "default_backoff_max_millis")]
    pub backoff_max_millis: u64,
}

fn default_max_replicas() -> i32 {
    2
}

fn default_controller_tag() -> String {
    String::from("demodeployment-controller")
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_resync_secs() -> u64 {
    300
}

fn default_error_requeue_secs() -> u64 {
    10
}

fn default_workers() -> usize {
    4
}

fn default_backoff_base_millis() -> u64 {
    200
}

fn default_backoff_max_millis() -> u64 {
    30_000
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_replicas: default_max_replicas(),
            controller_tag: default_controller_tag(),
            address: default_address(),
            resync_secs: default_resync_secs(),
            error_requeue_secs: default_error_requeue_secs(),
            workers: default_workers(),
            backoff_base_millis: default_backoff_base_millis(),
            backoff_max_millis: default_backoff_max_millis(),
        }
    }
}

impl OperatorConfig {
    /// Loads the configuration from `path` (extension optional) and the
    /// `DEMODEPLOYMENT_*` environment, then validates it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let cfg: Self = compose_config(path, ENV_PREFIX)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_replicas < 0 {
            return Err(ConfigError::Message(format!("max_replicas must not be negative, given {}", self.max_replicas)));
        }
        if self.controller_tag.trim().is_empty() {
            return Err(ConfigError::Message(String::from("controller_tag must not be empty")));
        }
        if self.workers == 0 {
            return Err(ConfigError::Message(String::from("workers must be at least 1")));
        }
        if self.backoff_base_millis > self.backoff_max_millis {
            return Err(ConfigError::Message(format!(
                "backoff_base_millis ({}) exceeds backoff_max_millis ({})",
                self.backoff_base_millis, self.backoff_max_millis,
            )));
        }
        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn error_requeue_interval(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_millis)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_millis)
    }
}
