mod attribute_value;
mod key_schema;
mod request;
mod table;

pub use attribute_value::AttributeValue;
pub use key_schema::{ItemKey, KeySchema};
pub use request::{
    Page, QueryRequest, ScanRequest, Segment, SortKeyPredicate, WriteMode, WriteOp,
    DEFAULT_PAGE_LIMIT,
};
pub use table::{IndexDescriptor, TableDescriptor};

use aws_sdk_dynamodb::{primitives, types};
use std::collections::{BTreeMap, HashMap};

/// An item as the store hands it out.
pub type Item = HashMap<String, types::AttributeValue>;

fn into_str(blob: primitives::Blob) -> String {
    String::from_utf8_lossy(&blob.into_inner()).into_owned()
}

/// Converts an item into its serializable form, with attributes sorted by name.
pub fn into_document(item: &Item) -> BTreeMap<String, AttributeValue> {
    item.iter()
        .map(|(key, val)| (key.to_owned(), AttributeValue::from(val.clone())))
        .collect()
}

/// Short name of the attribute's type, as DynamoDB spells it.
pub fn type_name(value: &types::AttributeValue) -> &'static str {
    match value {
        types::AttributeValue::B(_) => "B",
        types::AttributeValue::Bool(_) => "BOOL",
        types::AttributeValue::Bs(_) => "BS",
        types::AttributeValue::L(_) => "L",
        types::AttributeValue::M(_) => "M",
        types::AttributeValue::N(_) => "N",
        types::AttributeValue::Ns(_) => "NS",
        types::AttributeValue::Null(_) => "NULL",
        types::AttributeValue::S(_) => "S",
        types::AttributeValue::Ss(_) => "SS",
        _ => "UNKNOWN",
    }
}
