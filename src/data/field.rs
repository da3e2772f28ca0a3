use std::sync::Arc;

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use serde_json::{Map, Value};

use crate::config::{DataField, FieldKind, SendData};

use super::path::lookup_path;
use super::source::FileSources;
use super::transaction::Captures;

pub const LOCATOR_SEPARATOR: &str = "---";

/// Splits a `"<source>---<key>"` locator. Anything but exactly one separator
/// with a non-empty source is rejected.
#[must_use]
pub fn split_locator(locator: &str) -> Option<(&str, &str)> {
    let mut parts = locator.split(LOCATOR_SEPARATOR);
    let source = parts.next()?;
    let key = parts.next()?;
    if parts.next().is_some() || source.is_empty() {
        return None;
    }
    Some((source, key))
}

/// Computes concrete payload values from field descriptors.
#[derive(Debug, Clone)]
pub struct Resolver {
    sources: Arc<FileSources>,
}

impl Resolver {
    #[must_use]
    pub const fn new(sources: Arc<FileSources>) -> Self {
        Self { sources }
    }

    /// Resolves one field. Never fails: missing sources and unmatched paths
    /// resolve to an empty string.
    #[must_use]
    pub fn resolve(&self, field: &DataField, captures: &Captures) -> Value {
        if let Some(literal) = field.literal() {
            return Value::String(literal.to_owned());
        }
        match field.kind {
            FieldKind::Int => {
                if field.len == 0 {
                    return Value::from(0_u64);
                }
                Value::from(thread_rng().gen_range(0..field.len))
            }
            FieldKind::String => {
                let len = usize::try_from(field.len).unwrap_or(usize::MAX);
                let value: String = thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect();
                Value::String(value)
            }
            FieldKind::File => locate(field)
                .and_then(|(source, column)| self.sources.next_value(source, column))
                .map_or_else(empty, Value::String),
            FieldKind::TransactionSend => locate(field)
                .and_then(|(step, path)| lookup_path(captures.sent(step)?, path))
                .unwrap_or_else(empty),
            FieldKind::TransactionResponse => locate(field)
                .and_then(|(step, path)| lookup_path(captures.received(step)?, path))
                .unwrap_or_else(empty),
        }
    }

    /// Resolves every field into a JSON object keyed by field name.
    #[must_use]
    pub fn payload(&self, send_data: &SendData, captures: &Captures) -> Map<String, Value> {
        send_data
            .data_field_list
            .iter()
            .map(|field| (field.name.clone(), self.resolve(field, captures)))
            .collect()
    }

    /// Resolves and JSON-encodes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload cannot be serialized.
    pub fn encode(
        &self,
        send_data: &SendData,
        captures: &Captures,
    ) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&self.payload(send_data, captures)).map(Bytes::from)
    }
}

fn locate(field: &DataField) -> Option<(&str, &str)> {
    field.dynamic.as_deref().and_then(split_locator)
}

fn empty() -> Value {
    Value::String(String::new())
}
