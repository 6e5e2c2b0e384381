use super::Client;
use crate::config::Environment;
use crate::types::{
    IndexDescriptor, Item, KeySchema, Page, QueryRequest, ScanRequest, SortKeyPredicate,
    TableDescriptor, WriteOp,
};
use crate::{Error, Result};

use async_trait::async_trait;
use aws_config::ConfigLoader;
use aws_sdk_dynamodb::{
    config::{Builder as DbConfigBuilder, Region},
    types::{AttributeValue, DeleteRequest, PutRequest, Select, WriteRequest},
    Client as DbClient,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DynamodbClient {
    environment: String,
    db_client: DbClient,
}

#[async_trait]
impl Client for DynamodbClient {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescriptor> {
        let table = self
            .db_client
            .describe_table()
            .table_name(table_name)
            .send()
            .await?
            .table
            .ok_or_else(|| {
                Error::RemoteFatal("`table` is None in `DescribeTableOutput`".into())
            })?;

        let key_schema =
            KeySchema::from_elements(table.key_schema.as_deref().unwrap_or_default())?;

        let mut indexes: Vec<IndexDescriptor> = vec![];

        for index in table.global_secondary_indexes.unwrap_or_default() {
            if let Some(name) = index.index_name {
                let key_schema =
                    KeySchema::from_elements(index.key_schema.as_deref().unwrap_or_default())?;
                indexes.push(IndexDescriptor { name, key_schema });
            }
        }

        for index in table.local_secondary_indexes.unwrap_or_default() {
            if let Some(name) = index.index_name {
                let key_schema =
                    KeySchema::from_elements(index.key_schema.as_deref().unwrap_or_default())?;
                indexes.push(IndexDescriptor { name, key_schema });
            }
        }

        Ok(TableDescriptor::new(table_name, &self.environment, key_schema).set_indexes(indexes))
    }

    async fn scan(&self, request: &ScanRequest, cursor: Option<Item>) -> Result<Page> {
        let mut builder = self
            .db_client
            .scan()
            .table_name(&request.table_name)
            .consistent_read(true)
            .set_exclusive_start_key(cursor);

        if let Some(segment) = request.segment {
            builder = builder
                .segment(segment.index)
                .total_segments(segment.total);
        }

        match request.projection.as_ref() {
            Some(names) => {
                let placeholders: Vec<String> =
                    (0..names.len()).map(|i| format!("#k{i}")).collect();
                builder = builder.projection_expression(placeholders.join(", "));

                for (placeholder, name) in placeholders.into_iter().zip(names) {
                    builder = builder.expression_attribute_names(placeholder, name);
                }
            }
            None => {
                builder = builder.select(Select::AllAttributes);
            }
        }

        let output = builder.send().await?;

        Ok(Page {
            items: output.items.unwrap_or_default(),
            cursor: output.last_evaluated_key,
        })
    }

    async fn query(
        &self,
        request: &QueryRequest,
        key_schema: &KeySchema,
        cursor: Option<Item>,
    ) -> Result<Page> {
        let mut condition = String::from("#pk = :pk");

        let mut builder = self
            .db_client
            .query()
            .table_name(&request.table_name)
            .set_index_name(request.index_name.clone())
            .select(Select::AllAttributes)
            .limit(request.limit)
            .expression_attribute_names("#pk", key_schema.partition_key())
            .expression_attribute_values(":pk", request.partition_value.clone())
            .set_exclusive_start_key(cursor);

        if let Some(predicate) = request.sort_key.as_ref() {
            let sort_key = key_schema.sort_key().ok_or_else(|| {
                Error::schema(format!(
                    "`{}` has no sort key to filter on",
                    request.index_name.as_deref().unwrap_or(&request.table_name)
                ))
            })?;

            let value = match predicate {
                SortKeyPredicate::Equals(value) => {
                    condition.push_str(" AND #sk = :sk");
                    value.clone()
                }
                SortKeyPredicate::BeginsWith(prefix) => {
                    condition.push_str(" AND begins_with(#sk, :sk)");
                    AttributeValue::S(prefix.clone())
                }
            };

            builder = builder
                .expression_attribute_names("#sk", sort_key)
                .expression_attribute_values(":sk", value);
        }

        let output = builder.key_condition_expression(condition).send().await?;

        Ok(Page {
            items: output.items.unwrap_or_default(),
            cursor: output.last_evaluated_key,
        })
    }

    async fn batch_write(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>> {
        let requests = ops
            .into_iter()
            .map(into_write_request)
            .collect::<Result<Vec<WriteRequest>>>()?;

        let unprocessed = self
            .db_client
            .batch_write_item()
            .request_items(table_name, requests)
            .send()
            .await?
            .unprocessed_items
            .unwrap_or_default();

        Ok(from_unprocessed(unprocessed, table_name))
    }

    async fn create_backup(&self, table_name: &str, backup_name: &str) -> Result<String> {
        self.db_client
            .create_backup()
            .table_name(table_name)
            .backup_name(backup_name)
            .send()
            .await?
            .backup_details
            .map(|details| details.backup_arn)
            .ok_or_else(|| {
                Error::RemoteFatal("`backup_details` is None in `CreateBackupOutput`".into())
            })
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        self.db_client
            .delete_table()
            .table_name(table_name)
            .send()
            .await?;

        Ok(())
    }
}

fn into_write_request(op: WriteOp) -> Result<WriteRequest> {
    let request = match op {
        WriteOp::Put(item) => WriteRequest::builder()
            .put_request(
                PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map_err(|err| Error::RemoteFatal(err.to_string()))?,
            )
            .build(),
        WriteOp::Delete(key) => WriteRequest::builder()
            .delete_request(
                DeleteRequest::builder()
                    .set_key(Some(key))
                    .build()
                    .map_err(|err| Error::RemoteFatal(err.to_string()))?,
            )
            .build(),
    };

    Ok(request)
}

fn from_unprocessed(
    mut unprocessed: HashMap<String, Vec<WriteRequest>>,
    table_name: &str,
) -> Vec<WriteOp> {
    unprocessed
        .remove(table_name)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|request| match (request.put_request, request.delete_request) {
            (Some(put), _) => Some(WriteOp::Put(put.item)),
            (_, Some(delete)) => Some(WriteOp::Delete(delete.key)),
            _ => None,
        })
        .collect()
}

impl DynamodbClient {
    pub async fn builder(environment: &Environment) -> DynamodbClientBuilder {
        DynamodbClientBuilder::new(environment).await
    }
}

#[derive(Debug)]
pub struct DynamodbClientBuilder {
    environment: String,
    db_builder: DbConfigBuilder,
}

impl DynamodbClientBuilder {
    /// Loads shared AWS config for the environment's profile and region.
    pub async fn new(environment: &Environment) -> Self {
        let mut loader: ConfigLoader = aws_config::from_env().profile_name(environment.profile());

        if let Some(region) = environment.region.clone() {
            loader = loader.region(Region::new(region));
        }

        let config = loader.load().await;
        let db_builder = DbConfigBuilder::from(&config);

        Self {
            environment: environment.name.clone(),
            db_builder,
        }
        .endpoint_url(environment.endpoint_url.clone())
    }

    pub fn endpoint_url(self, url: Option<String>) -> Self {
        match url {
            Some(url) => Self {
                db_builder: self.db_builder.endpoint_url(&url),
                ..self
            },
            None => self,
        }
    }

    pub fn build(self) -> DynamodbClient {
        let db_config = self.db_builder.build();

        DynamodbClient {
            environment: self.environment,
            db_client: DbClient::from_conf(db_config),
        }
    }
}
