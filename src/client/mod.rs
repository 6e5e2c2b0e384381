mod dynamodb;
#[cfg(test)]
mod mock;

use crate::types::{Item, KeySchema, Page, QueryRequest, ScanRequest, TableDescriptor, WriteOp};
use crate::Result;

use async_trait::async_trait;

/// Capabilities the transfer engine needs from the remote store.
#[async_trait]
pub trait Client: Send + Sync {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescriptor>;

    async fn scan(&self, request: &ScanRequest, cursor: Option<Item>) -> Result<Page>;

    /// `key_schema` is the schema of the table or index the request targets.
    async fn query(
        &self,
        request: &QueryRequest,
        key_schema: &KeySchema,
        cursor: Option<Item>,
    ) -> Result<Page>;

    /// Returns the entries the store left unprocessed.
    async fn batch_write(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>>;

    /// Returns the backup ARN.
    async fn create_backup(&self, table_name: &str, backup_name: &str) -> Result<String>;

    async fn delete_table(&self, table_name: &str) -> Result<()>;
}

pub use dynamodb::{DynamodbClient, DynamodbClientBuilder};
#[cfg(test)]
pub use mock::{MockClient, MockTable};
