use super::Item;

use aws_sdk_dynamodb::types::AttributeValue;
use std::fmt;

pub const DEFAULT_PAGE_LIMIT: i32 = 200;

/// Condition on the sort key. Ranges and inequalities are not supported.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKeyPredicate {
    Equals(AttributeValue),
    BeginsWith(String),
}

impl SortKeyPredicate {
    pub fn matches(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (Self::Equals(expected), actual) => expected == actual,
            (Self::BeginsWith(prefix), AttributeValue::S(actual)) => actual.starts_with(prefix),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub partition_value: AttributeValue,
    pub sort_key: Option<SortKeyPredicate>,
    pub limit: i32,
}

impl QueryRequest {
    pub fn new<S: Into<String>>(table_name: S, partition_value: AttributeValue) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: None,
            partition_value,
            sort_key: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn set_index(self, index_name: Option<String>) -> Self {
        Self { index_name, ..self }
    }

    pub fn set_sort_key(self, sort_key: Option<SortKeyPredicate>) -> Self {
        Self { sort_key, ..self }
    }

    pub fn set_limit(self, limit: i32) -> Self {
        Self { limit, ..self }
    }

    /// Same predicate, pointed at another table.
    pub fn for_table<S: Into<String>>(&self, table_name: S) -> Self {
        Self {
            table_name: table_name.into(),
            ..self.clone()
        }
    }
}

/// One slice of a parallel scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: i32,
    pub total: i32,
}

impl Segment {
    pub fn all(total: usize) -> Vec<Segment> {
        let total = total.max(1) as i32;
        (0..total).map(|index| Segment { index, total }).collect()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table_name: String,
    pub segment: Option<Segment>,
    pub projection: Option<Vec<String>>,
}

impl ScanRequest {
    pub fn new<S: Into<String>>(table_name: S) -> Self {
        Self {
            table_name: table_name.into(),
            segment: None,
            projection: None,
        }
    }

    pub fn set_segment(self, segment: Segment) -> Self {
        Self {
            segment: Some(segment),
            ..self
        }
    }

    /// Only fetch the given attributes.
    pub fn set_projection(self, names: Vec<String>) -> Self {
        Self {
            projection: Some(names),
            ..self
        }
    }
}

/// One page of a scan or query.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub cursor: Option<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Put,
    Delete,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Put => write!(f, "PUT"),
            WriteMode::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single entry of a batch write. `Delete` holds only the key attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Item),
    Delete(Item),
}

impl WriteOp {
    pub fn item(&self) -> &Item {
        match self {
            WriteOp::Put(item) | WriteOp::Delete(item) => item,
        }
    }
}
