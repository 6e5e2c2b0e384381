use super::{type_name, Item};
use crate::{Error, Result};

use aws_sdk_dynamodb::types::{AttributeValue, KeySchemaElement, KeyType};

/// Primary key structure of a table or an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    partition_key: String,
    sort_key: Option<String>,
}

/// Key attributes of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey {
    pub partition: (String, AttributeValue),
    pub sort: Option<(String, AttributeValue)>,
}

impl ItemKey {
    /// The key map a delete request expects.
    pub fn into_item(self) -> Item {
        let mut item = Item::new();
        let (name, value) = self.partition;
        item.insert(name, value);

        if let Some((name, value)) = self.sort {
            item.insert(name, value);
        }

        item
    }
}

impl KeySchema {
    pub fn new<S: Into<String>>(partition_key: S, sort_key: Option<S>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.map(Into::into),
        }
    }

    /// Builds the schema from the `KeySchema` elements of a describe-table response.
    pub fn from_elements(elements: &[KeySchemaElement]) -> Result<Self> {
        let mut partition_key: Option<String> = None;
        let mut sort_key: Option<String> = None;

        for element in elements {
            match element.key_type {
                KeyType::Hash => partition_key = Some(element.attribute_name.clone()),
                KeyType::Range => sort_key = Some(element.attribute_name.clone()),
                _ => {
                    return Err(Error::schema(format!(
                        "unknown key type for `{}`",
                        element.attribute_name
                    )));
                }
            }
        }

        partition_key
            .map(|partition_key| Self {
                partition_key,
                sort_key,
            })
            .ok_or_else(|| Error::schema("key schema has no HASH key"))
    }

    pub fn partition_key(&self) -> &str {
        self.partition_key.as_str()
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Attribute names making up the key, partition key first.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names = vec![self.partition_key.clone()];
        names.extend(self.sort_key.clone());
        names
    }

    pub fn extract_key(&self, item: &Item) -> Result<ItemKey> {
        let partition = (
            self.partition_key.clone(),
            self.key_value(item, &self.partition_key)?.clone(),
        );

        let sort = match self.sort_key.as_ref() {
            Some(name) => Some((name.clone(), self.key_value(item, name)?.clone())),
            None => None,
        };

        Ok(ItemKey { partition, sort })
    }

    /// Checks the item carries every key attribute without copying them.
    pub fn validate(&self, item: &Item) -> Result<()> {
        self.key_value(item, &self.partition_key)?;

        if let Some(name) = self.sort_key.as_ref() {
            self.key_value(item, name)?;
        }

        Ok(())
    }

    fn key_value<'a>(&self, item: &'a Item, name: &str) -> Result<&'a AttributeValue> {
        let value = item
            .get(name)
            .ok_or_else(|| Error::schema(format!("item is missing key attribute `{name}`")))?;

        match value {
            AttributeValue::S(_) | AttributeValue::N(_) | AttributeValue::B(_) => Ok(value),
            other => Err(Error::schema(format!(
                "key attribute `{name}` has type `{}`",
                type_name(other)
            ))),
        }
    }
}
