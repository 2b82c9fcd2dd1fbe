//! Request handlers, one per bridge method.
//!
//! Every handler follows the same shape: resolve the namespace, convert the
//! request documents, build the typed options, make one engine call and turn
//! the result back into a generic document.

pub mod bulk;
pub mod database;
pub mod find_and_modify;
pub mod index;
pub mod read;
pub mod write;

use crate::document::{
    document_array_field, document_field, from_document, DocumentEncoding, GenericDocument,
};
use crate::engine::Namespace;
use crate::error::{BridgeError, DriverResult, FieldError, HandleKind, Result};
use crate::extract::{get_bool, get_string};
use crate::parser::{write_concern_option, ParseOptions};
use crate::registry::parse_handle;
use bson::Document;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

/// One incoming call: the method name and its request document.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    method: &'a str,
    doc: &'a GenericDocument,
}

impl<'a> Request<'a> {
    /// Wrap a request document.
    pub fn new(method: &'a str, doc: &'a GenericDocument) -> Self {
        Self { method, doc }
    }

    /// The bridge method being called.
    pub fn method(&self) -> &'a str {
        self.method
    }

    /// The whole request document.
    pub fn document_root(&self) -> &'a GenericDocument {
        self.doc
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&'a JsonValue> {
        self.doc.get(key)
    }

    /// The `db` name.
    pub fn db(&self) -> Result<String> {
        non_blank(get_string(self.doc, "db")).ok_or(BridgeError::MissingDbName)
    }

    /// The `options` document, if the request has one.
    pub fn options(&self) -> Option<&'a GenericDocument> {
        self.doc.get("options").and_then(JsonValue::as_object)
    }

    /// Resolve `db`, the write concern in `options`, then `collection`.
    ///
    /// An unparsable write concern is ignored.
    pub fn namespace(&self) -> Result<Namespace> {
        let db = self.db()?;
        let write_concern = write_concern_option(self.options());
        let collection = non_blank(get_string(self.doc, "collection"))
            .ok_or(BridgeError::MissingCollectionName)?;
        Ok(Namespace::new(db, collection).with_write_concern(write_concern))
    }

    /// Build typed options from the `options` document.
    pub fn parse_options<T: ParseOptions>(&self) -> Result<T> {
        Ok(T::parse_optional(self.options())?)
    }

    /// The `filter` document; an absent filter matches everything.
    pub fn filter(&self) -> Result<Document> {
        Ok(self.optional_document("filter")?.unwrap_or_default())
    }

    /// A document valued key that may be absent.
    pub fn optional_document(&self, key: &str) -> Result<Option<Document>> {
        match document_field(self.doc, key) {
            Ok(doc) => Ok(Some(doc)),
            Err(err) => field_failure(key, err, "document"),
        }
    }

    /// A document valued key that must be present.
    pub fn document(&self, key: &str) -> Result<Document> {
        self.optional_document(key)?
            .ok_or_else(|| BridgeError::missing(key))
    }

    /// An array of documents that must be present.
    pub fn documents(&self, key: &str) -> Result<Vec<Document>> {
        match document_array_field(self.doc, key) {
            Ok(docs) => Ok(docs),
            Err(err) => field_failure(key, err, "array of documents")?
                .ok_or_else(|| BridgeError::missing(key)),
        }
    }

    /// A boolean flag, false when absent or malformed.
    pub fn flag(&self, key: &str) -> bool {
        get_bool(self.doc, key).unwrap_or(false)
    }

    /// Output encoding: the request's `useBson` flag, else `default`.
    pub fn encoding(&self, default: DocumentEncoding) -> DocumentEncoding {
        get_bool(self.doc, "useBson")
            .map(DocumentEncoding::from_flag)
            .unwrap_or(default)
    }

    /// Parse a handle identifier that must be well formed.
    pub fn handle(&self, key: &str) -> Result<Uuid> {
        self.optional_handle(key).ok_or_else(|| {
            BridgeError::invalid_argument(format!("{key} must be provided and must be a string"))
        })
    }

    /// Parse a handle identifier, `None` if absent or malformed.
    pub fn optional_handle(&self, key: &str) -> Option<Uuid> {
        get_string(self.doc, key)
            .ok()
            .and_then(|id| parse_handle(&id))
    }

    /// Map an engine fault to a bridge error for this method.
    pub fn driver<T>(&self, result: DriverResult<T>) -> Result<T> {
        result.map_err(|fault| {
            warn!(method = self.method, code = ?fault.code, error = %fault, "engine fault");
            BridgeError::driver(self.method, fault)
        })
    }
}

fn non_blank(value: std::result::Result<String, FieldError>) -> Option<String> {
    value.ok().filter(|s| !s.trim().is_empty())
}

fn field_failure<T>(key: &str, err: FieldError, expected: &str) -> Result<Option<T>> {
    match err {
        FieldError::Absent => Ok(None),
        FieldError::TypeMismatch { .. } => Err(BridgeError::invalid_argument(format!(
            "{key} must be a valid {expected}"
        ))),
        FieldError::Convert { source, .. } => Err(BridgeError::Convert {
            key: key.to_string(),
            source,
        }),
    }
}

/// Add `success: true` to a response object.
pub(crate) fn respond(value: JsonValue) -> GenericDocument {
    let mut response = match value {
        JsonValue::Object(map) => map,
        _ => GenericDocument::new(),
    };
    response.insert("success".to_string(), JsonValue::Bool(true));
    response
}

/// Encode result documents for the response.
pub(crate) fn encode_all(docs: &[Document], encoding: DocumentEncoding) -> Result<Vec<JsonValue>> {
    docs.iter()
        .map(|doc| from_document(doc, encoding).map_err(BridgeError::from))
        .collect()
}

/// Encode an optional result document, `null` when there is none.
pub(crate) fn encode_optional(
    doc: Option<&Document>,
    encoding: DocumentEncoding,
) -> Result<JsonValue> {
    match doc {
        Some(doc) => Ok(from_document(doc, encoding)?),
        None => Ok(JsonValue::Null),
    }
}

/// A count that is only known if the engine acknowledged the write.
pub(crate) fn acknowledged<T: Into<JsonValue>>(acknowledged: bool, value: T) -> JsonValue {
    if acknowledged {
        value.into()
    } else {
        JsonValue::Null
    }
}

/// Error for a handle identifier that is well formed but unknown.
pub(crate) fn unknown_handle(kind: HandleKind, id: &Uuid) -> BridgeError {
    BridgeError::InvalidHandle {
        kind,
        id: id.to_string(),
    }
}
