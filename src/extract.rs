//! Typed scalar lookups on generic documents.

use crate::document::GenericDocument;
use crate::error::{FieldError, ParseError};
use serde_json::Value as JsonValue;
use tracing::debug;

/// A scalar type that can be pulled out of a generic document field.
pub trait FromField: Sized {
    /// Description of the accepted type, used in mismatch errors.
    const EXPECTED: &'static str;

    /// Coerce a present, non-null value.
    fn from_value(value: &JsonValue) -> Option<Self>;
}

impl FromField for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Bool(v) => Some(*v),
            JsonValue::String(s) => Some(s == "true"),
            JsonValue::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        }
    }
}

impl FromField for i32 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &JsonValue) -> Option<Self> {
        value.as_i64().and_then(|n| i32::try_from(n).ok())
    }
}

impl FromField for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &JsonValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromField for f64 {
    const EXPECTED: &'static str = "number";

    fn from_value(value: &JsonValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromField for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &JsonValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

/// Read field `name` of `doc` as `T`.
///
/// A key mapped to `null` is treated the same as a missing key.
pub fn extract<T: FromField>(doc: &GenericDocument, name: &str) -> Result<T, FieldError> {
    match doc.get(name) {
        None | Some(JsonValue::Null) => Err(FieldError::Absent),
        Some(value) => T::from_value(value).ok_or_else(|| FieldError::mismatch(name, T::EXPECTED)),
    }
}

/// Read a boolean field.
pub fn get_bool(doc: &GenericDocument, name: &str) -> Result<bool, FieldError> {
    extract(doc, name)
}

/// Read a 32-bit integer field.
pub fn get_i32(doc: &GenericDocument, name: &str) -> Result<i32, FieldError> {
    extract(doc, name)
}

/// Read a 64-bit integer field.
pub fn get_i64(doc: &GenericDocument, name: &str) -> Result<i64, FieldError> {
    extract(doc, name)
}

/// Read a floating point field.
pub fn get_f64(doc: &GenericDocument, name: &str) -> Result<f64, FieldError> {
    extract(doc, name)
}

/// Read a string field.
pub fn get_string(doc: &GenericDocument, name: &str) -> Result<String, FieldError> {
    extract(doc, name)
}

/// Lenient policy: a missing or mistyped field is skipped.
///
/// Conversion failures of document-valued fields are not skippable and are
/// returned as errors.
pub fn lenient<T>(result: Result<T, FieldError>) -> Result<Option<T>, ParseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(FieldError::Absent) => Ok(None),
        Err(FieldError::TypeMismatch { field, expected }) => {
            debug!(field = %field, expected, "skipping malformed option");
            Ok(None)
        }
        Err(FieldError::Convert { field, source }) => Err(ParseError::Convert { field, source }),
    }
}

/// Strict policy: a missing field is `None`, anything malformed aborts.
pub fn strict<T>(result: Result<T, FieldError>) -> Result<Option<T>, ParseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match err.escalate() {
            None => Ok(None),
            Some(parse_err) => Err(parse_err),
        },
    }
}
