use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

/// Which KV engine layout a read response used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvShape {
    /// `{"data": {"data": {...}, "metadata": {...}}}`
    Versioned,
    /// `{"data": {...}}`
    Flat,
}

/// A read response with its field mapping located.
#[derive(Debug, Clone, Copy)]
pub enum SecretShape<'a> {
    Versioned(&'a Map<String, Value>),
    Flat(&'a Map<String, Value>),
}

impl<'a> SecretShape<'a> {
    /// Locate the canonical field mapping in a response body. A nested
    /// `data.data` object wins; otherwise the top-level `data` object is used.
    pub fn detect(body: &'a Value) -> Option<Self> {
        let data = body.get("data")?.as_object()?;
        match data.get("data").and_then(Value::as_object) {
            Some(nested) => Some(SecretShape::Versioned(nested)),
            None => Some(SecretShape::Flat(data)),
        }
    }

    pub fn kind(&self) -> KvShape {
        match self {
            SecretShape::Versioned(_) => KvShape::Versioned,
            SecretShape::Flat(_) => KvShape::Flat,
        }
    }

    /// Scalar fields as strings. Nulls, arrays and objects are dropped.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let (SecretShape::Versioned(map) | SecretShape::Flat(map)) = self;
        map.iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key.clone(), s.clone())),
                Value::Number(n) => Some((key.clone(), n.to_string())),
                Value::Bool(b) => Some((key.clone(), b.to_string())),
                _ => {
                    debug!(field = %key, "Skipping non-scalar secret field");
                    None
                }
            })
            .collect()
    }
}
