use crate::retry::RetryPolicy;
use crate::types::DEFAULT_PAGE_LIMIT;
use crate::writer::MAX_BATCH_SIZE;
use crate::{ENV_CONFIG_PATH, ENV_DYNAMODB_ENDPOINT_URL, ENV_WORKERS};

use std::env;
use std::thread;

mod file;

use file::ConfigFile;
pub use file::Environment;

/// Tunables for one invocation, passed to the orchestrator and the query runner.
#[derive(Debug, Clone)]
pub struct Config {
    endpoint_url: Option<String>,
    workers: usize,
    batch_size: usize,
    page_limit: i32,
    retry: RetryPolicy,
    environments: Vec<Environment>,
}

impl Config {
    pub fn new() -> Self {
        let endpoint_url = env::var(ENV_DYNAMODB_ENDPOINT_URL).ok();
        let conf_path = env::var(ENV_CONFIG_PATH).ok();
        let file = ConfigFile::new(conf_path);

        let workers = env::var(ENV_WORKERS)
            .ok()
            .and_then(|w| w.parse::<usize>().ok())
            .or(file.workers)
            .unwrap_or_else(default_workers);

        Self {
            endpoint_url,
            workers,
            batch_size: file.batch_size.unwrap_or(MAX_BATCH_SIZE),
            page_limit: file.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            retry: file.retry(),
            environments: file.environments(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn page_limit(&self) -> i32 {
        self.page_limit
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn set_workers(self, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..self
        }
    }

    pub fn set_retry(self, retry: RetryPolicy) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            ..self
        }
    }

    /// Connection settings for an environment name. Unknown names use the name as
    /// the AWS profile.
    pub fn environment(&self, name: &str) -> Environment {
        let environment = self
            .environments
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .unwrap_or_else(|| Environment::new(name));

        match self.endpoint_url.clone() {
            Some(url) => Environment {
                endpoint_url: Some(url),
                ..environment
            },
            None => environment,
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Self {
            endpoint_url: None,
            workers: default_workers(),
            batch_size: MAX_BATCH_SIZE,
            page_limit: DEFAULT_PAGE_LIMIT,
            retry: RetryPolicy::default(),
            environments: vec![],
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
