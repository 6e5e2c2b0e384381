use super::{Item, ItemKey, KeySchema};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub key_schema: KeySchema,
}

/// A table as resolved from the store's metadata in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    environment: String,
    key_schema: KeySchema,
    indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    pub fn new<S, T>(name: S, environment: T, key_schema: KeySchema) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            environment: environment.into(),
            key_schema,
            indexes: vec![],
        }
    }

    pub fn set_indexes(self, indexes: Vec<IndexDescriptor>) -> Self {
        Self { indexes, ..self }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn environment(&self) -> &str {
        self.environment.as_str()
    }

    pub fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    /// Checks that `item` carries this table's key attributes.
    pub fn validate(&self, item: &Item) -> Result<()> {
        self.key_schema
            .validate(item)
            .map_err(|err| self.schema_error(err))
    }

    pub fn extract_key(&self, item: &Item) -> Result<ItemKey> {
        self.key_schema
            .extract_key(item)
            .map_err(|err| self.schema_error(err))
    }

    fn schema_error(&self, err: Error) -> Error {
        match err {
            Error::Schema(message) => Error::Schema(format!("{}: {message}", self.name)),
            other => other,
        }
    }

    /// Key schema of the named index, or of the table itself when no index is given.
    pub fn schema_for(&self, index_name: Option<&str>) -> Result<&KeySchema> {
        match index_name {
            None => Ok(&self.key_schema),
            Some(index_name) => self
                .indexes
                .iter()
                .find(|index| index.name == index_name)
                .map(|index| &index.key_schema)
                .ok_or_else(|| {
                    Error::schema(format!(
                        "index `{index_name}` does not exist on `{}`",
                        self.name
                    ))
                }),
        }
    }

    /// Tables are related when one name contains the other, e.g. `foo` and `foo-backup`.
    pub fn is_related(&self, other: &TableDescriptor) -> bool {
        self.name.contains(other.name()) || other.name.contains(self.name())
    }
}
