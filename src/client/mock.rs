use super::Client;
use crate::types::{Item, KeySchema, Page, QueryRequest, ScanRequest, TableDescriptor, WriteOp};
use crate::{Error, Result};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

const CURSOR_KEY: &str = "__cursor";

/// In-memory store for one environment.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    source: Arc<Mutex<MockSource>>,
}

#[derive(Debug, Default)]
struct MockSource {
    tables: HashMap<String, MockTable>,
    backups: Vec<(String, String)>,
    batch_calls: usize,
    // Number of trailing ops left unprocessed per call, and for how many calls.
    throttle: Option<(usize, usize)>,
    transient_failures: usize,
}

#[derive(Debug, Clone)]
pub struct MockTable {
    descriptor: TableDescriptor,
    page_size: usize,
    items: BTreeMap<String, Item>,
}

impl MockTable {
    pub fn new(descriptor: TableDescriptor) -> Self {
        Self {
            descriptor,
            page_size: 2,
            items: BTreeMap::new(),
        }
    }

    pub fn set_page_size(self, page_size: usize) -> Self {
        Self { page_size, ..self }
    }

    pub fn push(&mut self, item: Item) {
        let key = key_repr(self.descriptor.key_schema(), &item);
        self.items.insert(key, item);
    }

    pub fn with_items<T: IntoIterator<Item = Item>>(mut self, items: T) -> Self {
        for item in items {
            self.push(item);
        }
        self
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, table: MockTable) {
        let mut source = self.source.lock().unwrap();
        source
            .tables
            .insert(table.descriptor.name().to_string(), table);
    }

    pub fn items(&self, table_name: &str) -> Vec<Item> {
        let source = self.source.lock().unwrap();
        source
            .tables
            .get(table_name)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table_name: &str) -> bool {
        self.source.lock().unwrap().tables.contains_key(table_name)
    }

    pub fn backups(&self) -> Vec<(String, String)> {
        self.source.lock().unwrap().backups.clone()
    }

    pub fn batch_calls(&self) -> usize {
        self.source.lock().unwrap().batch_calls
    }

    /// The next `calls` batch writes leave their last `per_call` entries unprocessed.
    pub fn throttle(&self, per_call: usize, calls: usize) {
        self.source.lock().unwrap().throttle = Some((per_call, calls));
    }

    /// The next `calls` batch writes fail with a transient error.
    pub fn fail_transiently(&self, calls: usize) {
        self.source.lock().unwrap().transient_failures = calls;
    }

    fn table<'a>(source: &'a mut MockSource, table_name: &str) -> Result<&'a mut MockTable> {
        source.tables.get_mut(table_name).ok_or_else(|| {
            Error::RemoteFatal(format!(
                "ResourceNotFoundException: Requested resource not found: {table_name}"
            ))
        })
    }
}

#[async_trait]
impl Client for MockClient {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescriptor> {
        let mut source = self.source.lock().unwrap();
        Self::table(&mut source, table_name).map(|t| t.descriptor.clone())
    }

    async fn scan(&self, request: &ScanRequest, cursor: Option<Item>) -> Result<Page> {
        let mut source = self.source.lock().unwrap();
        let table = Self::table(&mut source, &request.table_name)?;
        let page_size = table.page_size;

        let matched = table
            .items
            .iter()
            .filter(|(key, _)| match request.segment {
                Some(segment) => segment_of(key, segment.total) == segment.index,
                None => true,
            })
            .map(|(key, item)| match request.projection.as_ref() {
                Some(names) => (
                    key.clone(),
                    item.iter()
                        .filter(|(name, _)| names.contains(name))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                None => (key.clone(), item.clone()),
            });

        Ok(paginate(matched, cursor, page_size))
    }

    async fn query(
        &self,
        request: &QueryRequest,
        key_schema: &KeySchema,
        cursor: Option<Item>,
    ) -> Result<Page> {
        let mut source = self.source.lock().unwrap();
        let table = Self::table(&mut source, &request.table_name)?;

        if let Some(index_name) = request.index_name.as_deref() {
            table.descriptor.schema_for(Some(index_name)).map_err(|_| {
                Error::RemoteFatal(format!(
                    "ValidationException: The table does not have the specified index: {index_name}"
                ))
            })?;
        }

        if request.sort_key.is_some() && key_schema.sort_key().is_none() {
            return Err(Error::schema(format!(
                "`{}` has no sort key to filter on",
                request.index_name.as_deref().unwrap_or(&request.table_name)
            )));
        }

        let page_size = (request.limit.max(1) as usize).min(table.page_size);

        let matched = table
            .items
            .iter()
            .filter(|(_, item)| {
                item.get(key_schema.partition_key()) == Some(&request.partition_value)
            })
            .filter(
                |(_, item)| match (request.sort_key.as_ref(), key_schema.sort_key()) {
                    (Some(predicate), Some(sort_key)) => item
                        .get(sort_key)
                        .map(|v| predicate.matches(v))
                        .unwrap_or(false),
                    _ => true,
                },
            )
            .map(|(key, item)| (key.clone(), item.clone()));

        Ok(paginate(matched, cursor, page_size))
    }

    async fn batch_write(&self, table_name: &str, mut ops: Vec<WriteOp>) -> Result<Vec<WriteOp>> {
        let mut source = self.source.lock().unwrap();
        source.batch_calls += 1;

        if source.transient_failures > 0 {
            source.transient_failures -= 1;
            return Err(Error::RemoteTransient(
                "ProvisionedThroughputExceededException: rate exceeded".into(),
            ));
        }

        let unprocessed = match source.throttle {
            Some((per_call, calls)) if calls > 0 => {
                source.throttle = Some((per_call, calls - 1));
                ops.split_off(ops.len().saturating_sub(per_call))
            }
            _ => vec![],
        };

        let table = Self::table(&mut source, table_name)?;
        let schema = table.descriptor.key_schema().clone();

        for op in ops {
            let key = key_repr(&schema, op.item());
            match op {
                WriteOp::Put(item) => {
                    table.items.insert(key, item);
                }
                WriteOp::Delete(_) => {
                    table.items.remove(&key);
                }
            }
        }

        Ok(unprocessed)
    }

    async fn create_backup(&self, table_name: &str, backup_name: &str) -> Result<String> {
        let mut source = self.source.lock().unwrap();
        Self::table(&mut source, table_name)?;
        source
            .backups
            .push((table_name.to_string(), backup_name.to_string()));

        Ok(format!(
            "arn:aws:dynamodb:local:000000000000:table/{table_name}/backup/{backup_name}"
        ))
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        let mut source = self.source.lock().unwrap();
        source
            .tables
            .remove(table_name)
            .map(|_| ())
            .ok_or_else(|| Error::RemoteFatal(format!("ResourceNotFoundException: {table_name}")))
    }
}

fn paginate<I>(matched: I, cursor: Option<Item>, page_size: usize) -> Page
where
    I: Iterator<Item = (String, Item)>,
{
    let after = cursor.and_then(|c| match c.get(CURSOR_KEY) {
        Some(AttributeValue::S(key)) => Some(key.clone()),
        _ => None,
    });

    let mut rest = matched.filter(|(key, _)| after.as_ref().map(|a| key > a).unwrap_or(true));

    let page: Vec<(String, Item)> = rest.by_ref().take(page_size).collect();
    let has_more = rest.next().is_some();

    let cursor = match (has_more, page.last()) {
        (true, Some((key, _))) => {
            let mut cursor = Item::new();
            cursor.insert(CURSOR_KEY.into(), AttributeValue::S(key.clone()));
            Some(cursor)
        }
        _ => None,
    };

    Page {
        items: page.into_iter().map(|(_, item)| item).collect(),
        cursor,
    }
}

fn key_repr(schema: &KeySchema, item: &Item) -> String {
    schema
        .attribute_names()
        .iter()
        .map(|name| match item.get(name) {
            Some(AttributeValue::S(v)) | Some(AttributeValue::N(v)) => v.clone(),
            Some(other) => format!("{other:?}"),
            None => String::new(),
        })
        .collect::<Vec<String>>()
        .join("|")
}

fn segment_of(key: &str, total: i32) -> i32 {
    let sum: u64 = key.bytes().map(u64::from).sum();
    (sum % total.max(1) as u64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SortKeyPredicate;

    fn item(id: &str) -> Item {
        [("id".to_string(), AttributeValue::S(id.into()))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn it_pages_through_scan_results() {
        let client = MockClient::new();
        let descriptor = TableDescriptor::new("foo", "dev", KeySchema::new("id", None));
        client.insert_table(MockTable::new(descriptor).with_items(["a", "b", "c"].map(item)));

        let request = ScanRequest::new("foo");
        let first = client.scan(&request, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.cursor.is_some());

        let second = client.scan(&request, first.cursor).await.unwrap();
        assert_eq!(second.items, vec![item("c")]);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn it_leaves_throttled_entries_unprocessed() {
        let client = MockClient::new();
        let descriptor = TableDescriptor::new("foo", "dev", KeySchema::new("id", None));
        client.insert_table(MockTable::new(descriptor));
        client.throttle(1, 1);

        let ops = vec![WriteOp::Put(item("a")), WriteOp::Put(item("b"))];
        let unprocessed = client.batch_write("foo", ops).await.unwrap();
        assert_eq!(unprocessed, vec![WriteOp::Put(item("b"))]);
        assert_eq!(client.items("foo"), vec![item("a")]);

        let unprocessed = client.batch_write("foo", unprocessed).await.unwrap();
        assert!(unprocessed.is_empty());
        assert_eq!(client.items("foo").len(), 2);
    }

    #[tokio::test]
    async fn it_rejects_sort_conditions_without_a_sort_key() {
        let client = MockClient::new();
        let descriptor = TableDescriptor::new("foo", "dev", KeySchema::new("id", None));
        client.insert_table(MockTable::new(descriptor).with_items(["a", "b"].map(item)));

        let request = QueryRequest::new("foo", AttributeValue::S("a".into()))
            .set_sort_key(Some(SortKeyPredicate::BeginsWith("x".into())));
        let result = client
            .query(&request, &KeySchema::new("id", None), None)
            .await;

        match result {
            Err(Error::Schema(message)) => {
                assert_eq!(message, "`foo` has no sort key to filter on");
            }
            _ => unreachable!("expected a schema error"),
        }
    }
}
