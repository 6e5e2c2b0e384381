use crate::client::Client;
use crate::types::{Item, KeySchema, Page, QueryRequest, ScanRequest};
use crate::Result;

use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
enum Request {
    Scan(ScanRequest),
    Query {
        request: QueryRequest,
        key_schema: KeySchema,
    },
}

#[derive(Debug)]
enum Cursor {
    Start,
    Next(Item),
    Done,
}

/// Pulls items from a scan or a query one remote page at a time.
///
/// The cursor lives only in memory: reading again means building a new source.
pub struct ItemSource {
    client: Arc<dyn Client>,
    request: Request,
    cursor: Cursor,
    read: usize,
}

impl ItemSource {
    pub fn scan(client: Arc<dyn Client>, request: ScanRequest) -> Self {
        Self::new(client, Request::Scan(request))
    }

    /// `key_schema` belongs to the table or index named by the request.
    pub fn query(client: Arc<dyn Client>, request: QueryRequest, key_schema: KeySchema) -> Self {
        Self::new(
            client,
            Request::Query {
                request,
                key_schema,
            },
        )
    }

    fn new(client: Arc<dyn Client>, request: Request) -> Self {
        Self {
            client,
            request,
            cursor: Cursor::Start,
            read: 0,
        }
    }

    /// Number of items handed out so far.
    pub fn read(&self) -> usize {
        self.read
    }

    /// Next page of items, or `None` once the store reports no further page.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Item>>> {
        let cursor = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Start => None,
            Cursor::Next(key) => Some(key),
            Cursor::Done => return Ok(None),
        };

        let Page { items, cursor } = match &self.request {
            Request::Scan(request) => self.client.scan(request, cursor).await?,
            Request::Query {
                request,
                key_schema,
            } => self.client.query(request, key_schema, cursor).await?,
        };

        self.cursor = match cursor {
            Some(key) if !key.is_empty() => Cursor::Next(key),
            _ => Cursor::Done,
        };
        self.read += items.len();

        Ok(Some(items))
    }

    /// Drains every remaining page.
    pub async fn read_all(mut self) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = vec![];

        while let Some(mut page) = self.next_page().await? {
            items.append(&mut page);
        }

        info!("Read {} items from `{}`", items.len(), self.table_name());
        Ok(items)
    }

    pub fn table_name(&self) -> &str {
        match &self.request {
            Request::Scan(request) => request.table_name.as_str(),
            Request::Query { request, .. } => request.table_name.as_str(),
        }
    }
}
