use crate::retry::RetryPolicy;

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub page_limit: Option<i32>,
    retry: Option<RetryPolicy>,
    environments: Option<Vec<Environment>>,
}

/// Where an environment's tables live.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Environment {
    pub name: String,
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl Environment {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            profile: None,
            region: None,
            endpoint_url: None,
        }
    }

    /// AWS profile to load credentials from.
    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or(self.name.as_str())
    }
}

impl ConfigFile {
    pub fn new<P: AsRef<Path>>(path: Option<P>) -> Self {
        path.map(read_config).unwrap_or_default()
    }

    /// The `retry` section, making at least one attempt.
    pub fn retry(&self) -> RetryPolicy {
        let retry = self.retry.unwrap_or_default();
        RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        }
    }

    pub fn environments(&self) -> Vec<Environment> {
        self.environments.clone().unwrap_or_default()
    }
}

fn read_config<P: AsRef<Path>>(path: P) -> ConfigFile {
    _read_config(path).unwrap_or_else(|err| {
        warn!("{err}");
        warn!("Skip reading config file.");
        ConfigFile::default()
    })
}

fn _read_config<P: AsRef<Path>>(path: P) -> Result<ConfigFile, String> {
    let content = fs::read_to_string(&path)
        .map_err(|err| format!("Failed to read: {}. {err}", path.as_ref().to_string_lossy()))?;
    serde_yaml::from_str(&content)
        .map_err(|err| format!("Failed to deserialize config file: {err}"))
}
