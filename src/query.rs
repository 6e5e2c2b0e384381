use crate::client::Client;
use crate::config::Config;
use crate::source::ItemSource;
use crate::types::{type_name, Item, QueryRequest};
use crate::{Error, Result};

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMode {
    Head,
    UniqueAttribute(String),
}

#[derive(Debug, Default, PartialEq)]
pub struct QueryStats {
    pub count: usize,
    pub first: Option<Item>,
    /// Only set for `QueryMode::UniqueAttribute`.
    pub unique: Option<BTreeSet<String>>,
}

/// Runs a single read-only query in one environment.
pub struct QueryRunner {
    client: Arc<dyn Client>,
    page_limit: i32,
}

impl QueryRunner {
    pub fn new(config: &Config, client: Arc<dyn Client>) -> Self {
        Self {
            client,
            page_limit: config.page_limit(),
        }
    }

    pub async fn run(&self, request: QueryRequest, mode: QueryMode) -> Result<QueryStats> {
        let table = self.client.describe_table(&request.table_name).await?;
        let key_schema = table.schema_for(request.index_name.as_deref())?.clone();
        let request = request.set_limit(self.page_limit);

        let items = ItemSource::query(Arc::clone(&self.client), request, key_schema)
            .read_all()
            .await?;

        let unique = match &mode {
            QueryMode::Head => None,
            QueryMode::UniqueAttribute(name) => Some(unique_values(&items, name)?),
        };

        info!("{} items queried from {}", items.len(), table.name());

        Ok(QueryStats {
            count: items.len(),
            first: items.into_iter().next(),
            unique,
        })
    }
}

fn unique_values(items: &[Item], attribute: &str) -> Result<BTreeSet<String>> {
    items
        .iter()
        .filter_map(|item| item.get(attribute))
        .map(|value| match value {
            AttributeValue::S(value) => Ok(value.clone()),
            other => Err(Error::UnsupportedAttributeType {
                attribute: attribute.to_string(),
                found: type_name(other).to_string(),
            }),
        })
        .collect()
}
