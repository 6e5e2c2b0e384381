pub mod client;
pub mod config;
pub mod copy;
mod error;
pub mod executor;
pub mod query;
pub mod retry;
pub mod source;
pub mod types;
pub mod writer;

pub use client::{Client, DynamodbClient};
pub use config::{Config, Environment};
pub use copy::{CopyOrchestrator, Stage};
pub use error::{Error, Result};
pub use query::{QueryMode, QueryRunner, QueryStats};

pub const ENV_DYNAMODB_ENDPOINT_URL: &str = "DYNAMODB_ENDPOINT_URL";
pub const ENV_CONFIG_PATH: &str = "DYNAMO_COPY_CONFIG";
pub const ENV_WORKERS: &str = "DYNAMO_COPY_WORKERS";
