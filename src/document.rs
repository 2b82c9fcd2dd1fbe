//! Conversion between generic bridge documents and canonical BSON documents.
//!
//! A generic document is the untyped JSON object a bridge call carries. It is
//! converted structurally into a [`bson::Document`], with two special cases:
//!
//! - An object consisting solely of `{"$b64": "<base64>"}` is a binary
//!   envelope. The payload is decoded as raw BSON bytes and used as-is, which
//!   lets callers pass values JSON cannot represent (decimals, binary).
//! - Extended JSON type wrappers (`{"$oid": ..}`, `{"$date": ..}`, ...) are
//!   turned into their native BSON values.

use crate::error::{ConvertError, FieldError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

/// Untyped key-value document received across the bridge.
pub type GenericDocument = Map<String, JsonValue>;

/// Key marking a base64 encoded BSON document.
pub const BINARY_ENVELOPE_KEY: &str = "$b64";

/// Extended JSON keys that denote a single typed BSON value.
const EXTENDED_JSON_KEYS: &[&str] = &[
    "$oid",
    "$date",
    "$numberInt",
    "$numberLong",
    "$numberDouble",
    "$numberDecimal",
    "$binary",
    "$uuid",
    "$timestamp",
    "$regularExpression",
    "$symbol",
    "$code",
    "$dbPointer",
    "$minKey",
    "$maxKey",
    "$undefined",
];

/// How documents are encoded on the way back across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentEncoding {
    /// Relaxed extended JSON objects.
    #[default]
    Json,
    /// `{"$b64": <base64 of raw BSON>}` envelopes.
    Bson,
}

impl DocumentEncoding {
    /// Select the encoding from a request's `useBson` flag.
    pub fn from_flag(use_bson: bool) -> Self {
        if use_bson {
            DocumentEncoding::Bson
        } else {
            DocumentEncoding::Json
        }
    }
}

/// Convert a generic document into a canonical BSON document.
pub fn to_document(generic: &GenericDocument) -> Result<Document, ConvertError> {
    if let Some(payload) = binary_envelope(generic) {
        return decode_envelope(payload);
    }

    let mut doc = Document::new();
    for (key, value) in generic {
        doc.insert(key.clone(), to_bson(value)?);
    }
    Ok(doc)
}

/// Convert a single generic value into BSON.
pub fn to_bson(value: &JsonValue) -> Result<Bson, ConvertError> {
    match value {
        JsonValue::Null => Ok(Bson::Null),
        JsonValue::Bool(v) => Ok(Bson::Boolean(*v)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32))
            } else {
                Ok(n.as_f64().map_or(Bson::Null, Bson::Double))
            }
        }
        JsonValue::String(v) => Ok(Bson::String(v.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(to_bson)
            .collect::<Result<Vec<_>, _>>()
            .map(Bson::Array),
        JsonValue::Object(map) => {
            if is_extended_json(map) {
                return Bson::try_from(value.clone())
                    .map_err(|e| ConvertError::decode(e.to_string()));
            }
            to_document(map).map(Bson::Document)
        }
    }
}

/// Convert every element of `values` into a document, in order.
///
/// Fails on the first element that is not a convertible document, naming its
/// position. Nothing is returned for the elements before it.
pub fn to_document_array(values: &[JsonValue]) -> Result<Vec<Document>, ConvertError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let element = match value {
                JsonValue::Object(map) => to_document(map),
                _ => Err(ConvertError::NotADocument),
            };
            element.map_err(|source| ConvertError::ArrayElement {
                index,
                source: Box::new(source),
            })
        })
        .collect()
}

/// Look up `name` in `doc` and convert it into a BSON document.
pub fn document_field(doc: &GenericDocument, name: &str) -> Result<Document, FieldError> {
    match doc.get(name) {
        None | Some(JsonValue::Null) => Err(FieldError::Absent),
        Some(JsonValue::Object(map)) => to_document(map).map_err(|source| FieldError::Convert {
            field: name.to_string(),
            source,
        }),
        Some(_) => Err(FieldError::mismatch(name, "document")),
    }
}

/// Look up `name` in `doc` and convert it into a list of BSON documents.
pub fn document_array_field(doc: &GenericDocument, name: &str) -> Result<Vec<Document>, FieldError> {
    match doc.get(name) {
        None | Some(JsonValue::Null) => Err(FieldError::Absent),
        Some(JsonValue::Array(items)) => {
            to_document_array(items).map_err(|source| FieldError::Convert {
                field: name.to_string(),
                source,
            })
        }
        Some(_) => Err(FieldError::mismatch(name, "array of documents")),
    }
}

/// Convert a BSON document back into its wire form.
pub fn from_document(
    doc: &Document,
    encoding: DocumentEncoding,
) -> Result<JsonValue, bson::ser::Error> {
    match encoding {
        DocumentEncoding::Json => Ok(Bson::Document(doc.clone()).into_relaxed_extjson()),
        DocumentEncoding::Bson => encode_envelope(doc),
    }
}

/// Convert a single BSON value (an id, a count) into its JSON form.
pub fn from_bson(value: &Bson) -> JsonValue {
    value.clone().into_relaxed_extjson()
}

/// Convert a BSON document into a generic document.
pub fn to_generic(doc: &Document) -> GenericDocument {
    match Bson::Document(doc.clone()).into_relaxed_extjson() {
        JsonValue::Object(map) => map,
        _ => GenericDocument::new(),
    }
}

/// Wrap the raw BSON bytes of `doc` as `{"$b64": <base64>}`.
pub fn encode_envelope(doc: &Document) -> Result<JsonValue, bson::ser::Error> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes)?;

    let mut envelope = GenericDocument::new();
    envelope.insert(
        BINARY_ENVELOPE_KEY.to_string(),
        JsonValue::String(STANDARD.encode(bytes)),
    );
    Ok(JsonValue::Object(envelope))
}

fn binary_envelope(generic: &GenericDocument) -> Option<&JsonValue> {
    if generic.len() == 1 {
        generic.get(BINARY_ENVELOPE_KEY)
    } else {
        None
    }
}

fn decode_envelope(payload: &JsonValue) -> Result<Document, ConvertError> {
    let encoded = payload
        .as_str()
        .ok_or_else(|| ConvertError::decode("$b64 payload must be a string"))?;

    // Line-wrapped base64 from mobile encoders is accepted.
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ConvertError::decode(format!("invalid base64: {e}")))?;

    Document::from_reader(&mut bytes.as_slice())
        .map_err(|e| ConvertError::decode(format!("invalid bson: {e}")))
}

fn is_extended_json(map: &GenericDocument) -> bool {
    map.keys()
        .any(|key| EXTENDED_JSON_KEYS.contains(&key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn generic(value: JsonValue) -> GenericDocument {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn raw_bytes(doc: &Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_structural_conversion() {
        let doc = to_document(&generic(json!({
            "name": "John",
            "age": 30,
            "big": 5_000_000_000_i64,
            "score": 2.5,
            "active": true,
            "nothing": null,
            "tags": ["a", {"nested": 1}],
            "address": {"city": "Provo"},
        })))
        .unwrap();

        assert_eq!(doc.get_str("name").unwrap(), "John");
        assert_eq!(doc.get("age"), Some(&Bson::Int32(30)));
        assert_eq!(doc.get("big"), Some(&Bson::Int64(5_000_000_000)));
        assert_eq!(doc.get("score"), Some(&Bson::Double(2.5)));
        assert_eq!(doc.get("nothing"), Some(&Bson::Null));
        assert_eq!(doc.get_document("address").unwrap().get_str("city").unwrap(), "Provo");
        let tags = doc.get_array("tags").unwrap();
        assert_eq!(tags[0], Bson::String("a".to_string()));
        assert_eq!(tags[1], Bson::Document(doc! { "nested": 1 }));
    }

    #[test]
    fn test_extended_json_values() {
        let oid = ObjectId::new();
        let doc = to_document(&generic(json!({
            "_id": {"$oid": oid.to_hex()},
            "when": {"$date": {"$numberLong": "1704067200000"}},
            "filter": {"$gt": 5},
        })))
        .unwrap();

        assert_eq!(doc.get_object_id("_id").unwrap(), oid);
        assert!(matches!(doc.get("when"), Some(Bson::DateTime(_))));
        // Query operators are ordinary nested documents.
        assert_eq!(doc.get_document("filter").unwrap(), &doc! { "$gt": 5 });
    }

    #[test]
    fn test_binary_envelope_matches_direct_decode() {
        let original = doc! {
            "price": bson::Decimal128::from_bytes([1; 16]),
            "name": "widget",
        };
        let bytes = raw_bytes(&original);
        let envelope = generic(json!({ "$b64": STANDARD.encode(&bytes) }));

        let via_envelope = to_document(&envelope).unwrap();
        let direct = Document::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(via_envelope, direct);
        assert_eq!(via_envelope, original);
    }

    #[test]
    fn test_binary_envelope_ignores_line_breaks() {
        let original = doc! { "long_enough_to_wrap": "x".repeat(80) };
        let encoded = STANDARD.encode(raw_bytes(&original));
        let wrapped = format!("{}\n{}\n", &encoded[..40], &encoded[40..]);

        let doc = to_document(&generic(json!({ "$b64": wrapped }))).unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_nested_binary_envelope() {
        let inner = doc! { "x": 1_i64 };
        let doc = to_document(&generic(json!({
            "outer": { "$b64": STANDARD.encode(raw_bytes(&inner)) },
        })))
        .unwrap();
        assert_eq!(doc.get_document("outer").unwrap(), &inner);
    }

    #[test]
    fn test_b64_with_sibling_keys_is_structural() {
        let doc = to_document(&generic(json!({ "$b64": "abc", "other": 1 }))).unwrap();
        assert_eq!(doc.get_str("$b64").unwrap(), "abc");
    }

    #[test]
    fn test_malformed_base64() {
        let err = to_document(&generic(json!({ "$b64": "!!not base64!!" }))).unwrap_err();
        assert!(matches!(err, ConvertError::DocumentDecode { .. }));
    }

    #[test]
    fn test_malformed_bson_bytes() {
        let err = to_document(&generic(json!({ "$b64": STANDARD.encode([1, 2, 3]) }))).unwrap_err();
        assert!(matches!(err, ConvertError::DocumentDecode { .. }));
    }

    #[test]
    fn test_envelope_payload_must_be_string() {
        let err = to_document(&generic(json!({ "$b64": 12 }))).unwrap_err();
        assert!(matches!(err, ConvertError::DocumentDecode { .. }));
    }

    #[test]
    fn test_document_array_names_failing_index() {
        let values = vec![json!({"a": 1}), json!({"b": 2}), json!("nope"), json!({"$b64": "!!"})];
        let err = to_document_array(&values).unwrap_err();
        match err {
            ConvertError::ArrayElement { index, source } => {
                assert_eq!(index, 2);
                assert_eq!(*source, ConvertError::NotADocument);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_document_array_converts_all() {
        let values = vec![json!({"$match": {"a": 1}}), json!({"$limit": 2})];
        let docs = to_document_array(&values).unwrap();
        assert_eq!(docs, vec![doc! { "$match": { "a": 1 } }, doc! { "$limit": 2 }]);
    }

    #[test]
    fn test_document_field_lookup() {
        let doc = generic(json!({ "sort": {"age": -1}, "limit": 2, "none": null }));
        assert_eq!(document_field(&doc, "sort").unwrap(), doc! { "age": -1 });
        assert_eq!(document_field(&doc, "missing"), Err(FieldError::Absent));
        assert_eq!(document_field(&doc, "none"), Err(FieldError::Absent));
        assert_eq!(
            document_field(&doc, "limit"),
            Err(FieldError::mismatch("limit", "document"))
        );
    }

    #[test]
    fn test_document_array_field_lookup() {
        let doc = generic(json!({ "filters": [{"x.a": 1}], "bad": {"x": 1}, "broken": [1] }));
        assert_eq!(document_array_field(&doc, "filters").unwrap().len(), 1);
        assert!(matches!(
            document_array_field(&doc, "bad"),
            Err(FieldError::TypeMismatch { .. })
        ));
        assert!(matches!(
            document_array_field(&doc, "broken"),
            Err(FieldError::Convert { .. })
        ));
        assert_eq!(document_array_field(&doc, "missing"), Err(FieldError::Absent));
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let original = json!({
            "name": "John",
            "age": 30,
            "ratio": 0.75,
            "active": false,
            "nothing": null,
            "tags": ["a", "b", {"deep": [1, 2]}],
            "address": {"city": "Provo", "zip": 84601},
        });
        let doc = to_document(&generic(original.clone())).unwrap();
        let back = from_document(&doc, DocumentEncoding::Json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_bson_output_encoding() {
        let doc = doc! { "a": 1, "b": "two" };
        let out = from_document(&doc, DocumentEncoding::Bson).unwrap();
        let decoded = to_document(&generic(out)).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_from_bson_object_id() {
        let oid = ObjectId::new();
        let json = from_bson(&Bson::ObjectId(oid));
        assert_eq!(json, json!({ "$oid": oid.to_hex() }));
        assert_eq!(from_bson(&Bson::Int32(7)), json!(7));
    }

    #[test]
    fn test_encoding_from_flag() {
        assert_eq!(DocumentEncoding::from_flag(true), DocumentEncoding::Bson);
        assert_eq!(DocumentEncoding::from_flag(false), DocumentEncoding::Json);
        assert_eq!(DocumentEncoding::default(), DocumentEncoding::Json);
    }
}
