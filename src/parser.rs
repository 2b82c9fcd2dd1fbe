//! Builders turning option documents into typed options.
//!
//! Each option shape implements [`ParseOptions`]. Fields are read through a
//! [`FieldReader`], which applies one of two policies per field:
//!
//! - lenient: a missing or mistyped value leaves the field unset
//! - strict: a missing value leaves the field unset, a mistyped value or an
//!   unrecognized token aborts the whole build
//!
//! Document conversion failures abort the build under both policies.

use crate::document::{document_array_field, document_field, to_document, GenericDocument};
use crate::error::{FieldError, ParseError};
use crate::extract::{extract, lenient, strict, FromField};
use crate::options::*;
use bson::Document;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

/// An options type that can be built from a request's options document.
pub trait ParseOptions: Default + Sized {
    /// Build from a present options document.
    fn parse(reader: &FieldReader<'_>) -> Result<Self, ParseError>;

    /// Build from an options document that may be absent.
    ///
    /// Absent options produce the default value.
    fn parse_optional(doc: Option<&GenericDocument>) -> Result<Self, ParseError> {
        match doc {
            Some(doc) => Self::parse(&FieldReader::new(doc)),
            None => Ok(Self::default()),
        }
    }
}

/// Field-by-field reader over one options document.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    doc: &'a GenericDocument,
}

impl<'a> FieldReader<'a> {
    /// Wrap an options document.
    pub fn new(doc: &'a GenericDocument) -> Self {
        Self { doc }
    }

    /// Read a scalar, skipping it if malformed.
    pub fn lenient<T: FromField>(&self, name: &str) -> Result<Option<T>, ParseError> {
        lenient(extract(self.doc, name))
    }

    /// Read a document, skipping it if it is not an object.
    pub fn document(&self, name: &str) -> Result<Option<Document>, ParseError> {
        lenient(document_field(self.doc, name))
    }

    /// Read an array of documents, skipping it if it is not an array.
    pub fn document_array(&self, name: &str) -> Result<Option<Vec<Document>>, ParseError> {
        lenient(document_array_field(self.doc, name))
    }

    /// Read an i64 millisecond count as a duration.
    pub fn millis(&self, name: &str) -> Result<Option<Duration>, ParseError> {
        Ok(self.lenient::<i64>(name)?.and_then(|ms| to_duration(name, ms)))
    }

    /// Read an i32 millisecond count as a duration.
    pub fn millis_i32(&self, name: &str) -> Result<Option<Duration>, ParseError> {
        Ok(self
            .lenient::<i32>(name)?
            .and_then(|ms| to_duration(name, i64::from(ms))))
    }

    /// Read a string token and map it to an enum.
    ///
    /// Strict: an unrecognized token or a non-string value aborts the build.
    pub fn token<T>(
        &self,
        name: &str,
        from_token: fn(&str) -> Option<T>,
        expected: &'static str,
    ) -> Result<Option<T>, ParseError> {
        match strict(extract::<String>(self.doc, name))? {
            None => Ok(None),
            Some(token) => from_token(&token)
                .map(Some)
                .ok_or_else(|| ParseError::invalid_enum(name, token, expected)),
        }
    }

    /// Read an index hint, either a name or a key pattern.
    pub fn hint(&self, name: &str) -> Result<Option<Hint>, ParseError> {
        match self.doc.get(name) {
            Some(JsonValue::String(index)) => Ok(Some(Hint::Name(index.clone()))),
            Some(JsonValue::Object(_)) => Ok(self.document(name)?.map(Hint::Keys)),
            None | Some(JsonValue::Null) => Ok(None),
            Some(_) => {
                debug!(field = name, "skipping malformed hint");
                Ok(None)
            }
        }
    }

    /// Read a nested options document with its own builder.
    pub fn nested<T: ParseOptions>(&self, name: &str) -> Result<Option<T>, ParseError> {
        match self.doc.get(name) {
            Some(JsonValue::Object(map)) => T::parse(&FieldReader::new(map)).map(Some),
            None | Some(JsonValue::Null) => Ok(None),
            Some(_) => {
                debug!(field = name, "skipping malformed nested options");
                Ok(None)
            }
        }
    }

    /// Read a collation sub-document.
    pub fn collation(&self) -> Result<Option<Collation>, ParseError> {
        self.nested("collation")
    }
}

fn to_duration(name: &str, ms: i64) -> Option<Duration> {
    match u64::try_from(ms) {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            debug!(field = name, ms, "skipping negative duration");
            None
        }
    }
}

impl ParseOptions for Collation {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        let strength = match r.lenient::<i32>("strength")? {
            None => None,
            Some(level) => Some(CollationStrength::from_level(level).ok_or_else(|| {
                ParseError::invalid_enum("strength", level.to_string(), CollationStrength::LEVELS)
            })?),
        };

        Ok(Collation {
            locale: r.lenient("locale")?,
            case_level: r.lenient("caseLevel")?,
            case_first: r.token(
                "caseFirst",
                CollationCaseFirst::from_token,
                CollationCaseFirst::TOKENS,
            )?,
            strength,
            numeric_ordering: r.lenient("numericOrdering")?,
            alternate: r.token(
                "alternate",
                CollationAlternate::from_token,
                CollationAlternate::TOKENS,
            )?,
            max_variable: r.token(
                "maxVariable",
                CollationMaxVariable::from_token,
                CollationMaxVariable::TOKENS,
            )?,
            backwards: r.lenient("backwards")?,
        })
    }
}

impl ParseOptions for FindOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(FindOptions {
            allow_partial_results: r.lenient("allowPartialResults")?,
            batch_size: r.lenient("batchSize")?,
            collation: r.collation()?,
            comment: r.lenient("comment")?,
            cursor_type: r.token("cursorType", CursorType::from_token, CursorType::TOKENS)?,
            hint: r.hint("hint")?,
            limit: r.lenient("limit")?,
            max: r.document("max")?,
            max_await_time: r.millis_i32("maxAwaitTimeMS")?,
            max_time: r.millis("maxTimeMS")?,
            min: r.document("min")?,
            no_cursor_timeout: r.lenient("noCursorTimeout")?,
            projection: r.document("projection")?,
            return_key: r.lenient("returnKey")?,
            show_record_id: r.lenient("showRecordId")?,
            skip: r.lenient("skip")?,
            sort: r.document("sort")?,
        })
    }
}

impl ParseOptions for AggregateOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(AggregateOptions {
            allow_disk_use: r.lenient("allowDiskUse")?,
            batch_size: r.lenient("batchSize")?,
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            collation: r.collation()?,
            comment: r.lenient("comment")?,
            hint: r.hint("hint")?,
            max_time: r.millis("maxTimeMS")?,
        })
    }
}

impl ParseOptions for CountOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(CountOptions {
            collation: r.collation()?,
            hint: r.hint("hint")?,
            limit: r.lenient("limit")?,
            max_time: r.millis("maxTimeMS")?,
            skip: r.lenient("skip")?,
        })
    }
}

impl ParseOptions for InsertOneOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(InsertOneOptions {
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
        })
    }
}

impl ParseOptions for InsertManyOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(InsertManyOptions {
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            ordered: r.lenient("ordered")?,
        })
    }
}

impl ParseOptions for UpdateOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(UpdateOptions {
            array_filters: r.document_array("arrayFilters")?,
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            collation: r.collation()?,
            upsert: r.lenient("upsert")?,
        })
    }
}

impl ParseOptions for ReplaceOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(ReplaceOptions {
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            collation: r.collation()?,
            upsert: r.lenient("upsert")?,
        })
    }
}

impl ParseOptions for DeleteOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(DeleteOptions {
            collation: r.collation()?,
        })
    }
}

impl ParseOptions for CreateCollectionOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        let validation = ValidationOptions {
            validator: r.document("validator")?,
            validation_action: r.token(
                "validationAction",
                ValidationAction::from_token,
                ValidationAction::TOKENS,
            )?,
            validation_level: r.token(
                "validationLevel",
                ValidationLevel::from_token,
                ValidationLevel::TOKENS,
            )?,
        };
        let index_option_defaults = r
            .document("indexOptionDefaults")?
            .map(|storage_engine| IndexOptionDefaults {
                storage_engine: Some(storage_engine),
            });

        Ok(CreateCollectionOptions {
            capped: r.lenient("capped")?,
            size: r.lenient("size")?,
            max: r.lenient("max")?,
            storage_engine: r.document("storageEngine")?,
            validation,
            index_option_defaults,
            collation: r.collation()?,
        })
    }
}

impl ParseOptions for IndexOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        // Index storage engines are given by name only.
        let storage_engine = r.lenient::<String>("storageEngine")?.map(|engine| {
            let mut doc = Document::new();
            doc.insert(engine, Document::new());
            doc
        });
        let expire_after = match r.lenient::<i64>("expireAfter")? {
            Some(secs) => u64::try_from(secs).ok().map(Duration::from_secs),
            None => None,
        };

        Ok(IndexOptions {
            background: r.lenient("background")?,
            expire_after,
            name: r.lenient("name")?,
            sparse: r.lenient("sparse")?,
            storage_engine,
            unique: r.lenient("unique")?,
            version: r.lenient("version")?,
            default_language: r.lenient("defaultLanguage")?,
            language_override: r.lenient("languageOverride")?,
            text_version: r.lenient("textVersion")?,
            weights: r.document("weights")?,
            sphere_version: r.lenient("sphereVersion")?,
            bits: r.lenient("bits")?,
            max: r.lenient("max")?,
            min: r.lenient("min")?,
            bucket_size: r.lenient("bucketSize")?,
            partial_filter_expression: r.document("partialFilterExpression")?,
            collation: r.collation()?,
        })
    }
}

impl ParseOptions for FindOneAndDeleteOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(FindOneAndDeleteOptions {
            collation: r.collation()?,
            max_time: r.millis("maxTimeMS")?,
            projection: r.document("projection")?,
            sort: r.document("sort")?,
        })
    }
}

fn return_document(r: &FieldReader<'_>) -> Result<Option<ReturnDocument>, ParseError> {
    Ok(r.lenient::<bool>("returnNewDocument")?.map(|new| {
        if new {
            ReturnDocument::After
        } else {
            ReturnDocument::Before
        }
    }))
}

impl ParseOptions for FindOneAndReplaceOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(FindOneAndReplaceOptions {
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            collation: r.collation()?,
            max_time: r.millis("maxTimeMS")?,
            projection: r.document("projection")?,
            return_document: return_document(r)?,
            sort: r.document("sort")?,
            upsert: r.lenient("upsert")?,
        })
    }
}

impl ParseOptions for FindOneAndUpdateOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(FindOneAndUpdateOptions {
            array_filters: r.document_array("arrayFilters")?,
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            collation: r.collation()?,
            max_time: r.millis("maxTimeMS")?,
            projection: r.document("projection")?,
            return_document: return_document(r)?,
            sort: r.document("sort")?,
            upsert: r.lenient("upsert")?,
        })
    }
}

impl ParseOptions for BulkWriteOptions {
    fn parse(r: &FieldReader<'_>) -> Result<Self, ParseError> {
        Ok(BulkWriteOptions {
            bypass_document_validation: r.lenient("bypassDocumentValidation")?,
            ordered: r.lenient("ordered")?,
        })
    }
}

/// Parse a write concern given as `{w, j?, wtimeout?}` or as a bare `w`.
pub fn parse_write_concern(value: &JsonValue) -> Result<WriteConcern, FieldError> {
    if let JsonValue::Object(map) = value {
        if let Some(w) = map.get("w").and_then(i32::from_value) {
            let r = FieldReader::new(map);
            // Malformed j/wtimeout do not invalidate an otherwise valid concern.
            return Ok(WriteConcern {
                w,
                journal: r.lenient("j").ok().flatten(),
                w_timeout: r.millis_i32("wtimeout").ok().flatten(),
            });
        }
    }

    i32::from_value(value)
        .map(WriteConcern::nodes)
        .ok_or_else(|| FieldError::mismatch("writeConcern", "integer or {w, j, wtimeout}"))
}

/// Read `writeConcern` from a request's options, if present and well formed.
pub fn write_concern_option(options: Option<&GenericDocument>) -> Option<WriteConcern> {
    let value = options?.get("writeConcern")?;
    if value.is_null() {
        return None;
    }
    match parse_write_concern(value) {
        Ok(concern) => Some(concern),
        Err(err) => {
            debug!(error = %err, "ignoring write concern");
            None
        }
    }
}

/// Build an index model from its key pattern and optional options document.
pub fn parse_index_model(
    keys: &GenericDocument,
    options: Option<&GenericDocument>,
) -> Result<IndexModel, ParseError> {
    let keys = to_document(keys).map_err(|source| ParseError::Convert {
        field: "keys".to_string(),
        source,
    })?;
    let options = match options {
        Some(doc) => Some(IndexOptions::parse(&FieldReader::new(doc))?),
        None => None,
    };
    Ok(IndexModel { keys, options })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bson::doc;
    use serde_json::json;

    fn generic(value: JsonValue) -> GenericDocument {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn parse<T: ParseOptions>(value: JsonValue) -> Result<T, ParseError> {
        T::parse_optional(Some(&generic(value)))
    }

    mod find_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_absent_options_are_default() {
            assert_eq!(FindOptions::parse_optional(None).unwrap(), FindOptions::default());
            assert_eq!(parse::<FindOptions>(json!({})).unwrap(), FindOptions::default());
        }

        #[test]
        fn test_limit_and_sort() {
            let options: FindOptions = parse(json!({ "limit": 2, "sort": { "age": -1 } })).unwrap();
            assert_eq!(options.limit, Some(2));
            assert_eq!(options.sort, Some(doc! { "age": -1 }));
            assert_eq!(options.skip, None);
            assert_eq!(options.projection, None);
            assert_eq!(options.collation, None);
        }

        #[test]
        fn test_malformed_lenient_field_is_skipped() {
            let options: FindOptions =
                parse(json!({ "limit": "ten", "skip": 3, "sort": "name" })).unwrap();
            assert_eq!(options.limit, None);
            assert_eq!(options.skip, Some(3));
            assert_eq!(options.sort, None);
        }

        #[test]
        fn test_every_field() {
            let options: FindOptions = parse(json!({
                "allowPartialResults": true,
                "batchSize": 50,
                "comment": "audit",
                "cursorType": "tailableAwait",
                "hint": "age_1",
                "limit": 5,
                "max": { "age": 90 },
                "maxAwaitTimeMS": 250,
                "maxTimeMS": 1000,
                "min": { "age": 10 },
                "noCursorTimeout": "true",
                "projection": { "name": 1 },
                "returnKey": 0,
                "showRecordId": 1,
                "skip": 2,
                "sort": { "name": 1 },
            }))
            .unwrap();

            assert_eq!(options.allow_partial_results, Some(true));
            assert_eq!(options.batch_size, Some(50));
            assert_eq!(options.comment.as_deref(), Some("audit"));
            assert_eq!(options.cursor_type, Some(CursorType::TailableAwait));
            assert_eq!(options.hint, Some(Hint::Name("age_1".to_string())));
            assert_eq!(options.max, Some(doc! { "age": 90 }));
            assert_eq!(options.max_await_time, Some(Duration::from_millis(250)));
            assert_eq!(options.max_time, Some(Duration::from_millis(1000)));
            assert_eq!(options.min, Some(doc! { "age": 10 }));
            assert_eq!(options.no_cursor_timeout, Some(true));
            assert_eq!(options.projection, Some(doc! { "name": 1 }));
            assert_eq!(options.return_key, Some(false));
            assert_eq!(options.show_record_id, Some(true));
        }

        #[test]
        fn test_hint_as_keys() {
            let options: FindOptions = parse(json!({ "hint": { "age": 1 } })).unwrap();
            assert_eq!(options.hint, Some(Hint::Keys(doc! { "age": 1 })));

            let options: FindOptions = parse(json!({ "hint": 4 })).unwrap();
            assert_eq!(options.hint, None);
        }

        #[test]
        fn test_invalid_cursor_type_aborts() {
            let err = parse::<FindOptions>(json!({ "cursorType": "forever" })).unwrap_err();
            assert_eq!(
                err,
                ParseError::invalid_enum("cursorType", "forever", CursorType::TOKENS)
            );

            let err = parse::<FindOptions>(json!({ "cursorType": 1 })).unwrap_err();
            assert!(matches!(err, ParseError::FieldTypeMismatch { .. }));
        }

        #[test]
        fn test_malformed_binary_sort_surfaces() {
            let err = parse::<FindOptions>(json!({ "sort": { "$b64": "%%%" } })).unwrap_err();
            assert!(matches!(
                err,
                ParseError::Convert { ref field, source: ConvertError::DocumentDecode { .. } }
                    if field == "sort"
            ));
        }

        #[test]
        fn test_binary_projection() {
            let projection = doc! { "name": 1, "_id": 0 };
            let mut bytes = Vec::new();
            projection.to_writer(&mut bytes).unwrap();

            let options: FindOptions =
                parse(json!({ "projection": { "$b64": STANDARD.encode(bytes) } })).unwrap();
            assert_eq!(options.projection, Some(projection));
        }

        #[test]
        fn test_negative_max_time_is_skipped() {
            let options: FindOptions = parse(json!({ "maxTimeMS": -5 })).unwrap();
            assert_eq!(options.max_time, None);
        }
    }

    mod collation_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_full_collation() {
            let collation: Collation = parse(json!({
                "locale": "fr",
                "caseLevel": true,
                "caseFirst": "upper",
                "strength": 2,
                "numericOrdering": false,
                "alternate": "shifted",
                "maxVariable": "punct",
                "backwards": true,
            }))
            .unwrap();

            assert_eq!(
                collation,
                Collation {
                    locale: Some("fr".to_string()),
                    case_level: Some(true),
                    case_first: Some(CollationCaseFirst::Upper),
                    strength: Some(CollationStrength::Secondary),
                    numeric_ordering: Some(false),
                    alternate: Some(CollationAlternate::Shifted),
                    max_variable: Some(CollationMaxVariable::Punct),
                    backwards: Some(true),
                }
            );
        }

        #[test]
        fn test_only_locale() {
            let collation: Collation = parse(json!({ "locale": "en" })).unwrap();
            assert_eq!(collation.locale.as_deref(), Some("en"));
            assert_eq!(collation.strength, None);
            assert_eq!(collation.case_first, None);
        }

        #[test]
        fn test_locale_and_strength() {
            let collation: Collation = parse(json!({ "locale": "en", "strength": 3 })).unwrap();
            assert_eq!(
                collation,
                Collation {
                    locale: Some("en".to_string()),
                    strength: Some(CollationStrength::Tertiary),
                    ..Default::default()
                }
            );
        }

        #[test]
        fn test_invalid_case_first_aborts_enclosing_build() {
            let err = parse::<FindOptions>(json!({
                "limit": 1,
                "collation": { "locale": "en", "caseFirst": "sideways" },
            }))
            .unwrap_err();
            assert_eq!(
                err,
                ParseError::invalid_enum("caseFirst", "sideways", CollationCaseFirst::TOKENS)
            );
        }

        #[test]
        fn test_strength_out_of_range() {
            let err = parse::<Collation>(json!({ "strength": 9 })).unwrap_err();
            assert_eq!(
                err,
                ParseError::invalid_enum("strength", "9", CollationStrength::LEVELS)
            );
        }

        #[test]
        fn test_non_integer_strength_is_skipped() {
            let collation: Collation = parse(json!({ "strength": "high" })).unwrap();
            assert_eq!(collation.strength, None);
        }

        #[test]
        fn test_non_document_collation_is_skipped() {
            let options: DeleteOptions = parse(json!({ "collation": "en" })).unwrap();
            assert_eq!(options.collation, None);
        }
    }

    mod write_option_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_update_options() {
            let options: UpdateOptions = parse(json!({
                "upsert": true,
                "arrayFilters": [{ "x.a": 1 }, { "y.b": 2 }],
                "bypassDocumentValidation": false,
            }))
            .unwrap();
            assert_eq!(options.upsert, Some(true));
            assert_eq!(
                options.array_filters,
                Some(vec![doc! { "x.a": 1 }, doc! { "y.b": 2 }])
            );
            assert_eq!(options.bypass_document_validation, Some(false));
        }

        #[test]
        fn test_array_filters_element_error() {
            let err = parse::<UpdateOptions>(json!({ "arrayFilters": [{ "a": 1 }, 7] })).unwrap_err();
            match err {
                ParseError::Convert {
                    field,
                    source: ConvertError::ArrayElement { index, .. },
                } => {
                    assert_eq!(field, "arrayFilters");
                    assert_eq!(index, 1);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn test_insert_many_ordered() {
            let options: InsertManyOptions = parse(json!({ "ordered": false })).unwrap();
            assert_eq!(options.ordered, Some(false));
        }

        #[test]
        fn test_return_new_document() {
            let options: FindOneAndUpdateOptions =
                parse(json!({ "returnNewDocument": true, "upsert": true })).unwrap();
            assert_eq!(options.return_document, Some(ReturnDocument::After));
            assert_eq!(options.upsert, Some(true));

            let options: FindOneAndReplaceOptions =
                parse(json!({ "returnNewDocument": false })).unwrap();
            assert_eq!(options.return_document, Some(ReturnDocument::Before));

            let options: FindOneAndDeleteOptions =
                parse(json!({ "sort": { "a": 1 }, "maxTimeMS": 20 })).unwrap();
            assert_eq!(options.sort, Some(doc! { "a": 1 }));
            assert_eq!(options.max_time, Some(Duration::from_millis(20)));
        }

        #[test]
        fn test_bulk_write_options() {
            let options: BulkWriteOptions =
                parse(json!({ "ordered": "false", "bypassDocumentValidation": 1 })).unwrap();
            assert_eq!(options.ordered, Some(false));
            assert_eq!(options.bypass_document_validation, Some(true));
        }
    }

    mod collection_option_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_create_collection() {
            let options: CreateCollectionOptions = parse(json!({
                "capped": true,
                "size": 4096,
                "max": 100,
                "validator": { "age": { "$gte": 0 } },
                "validationAction": "warn",
                "validationLevel": "moderate",
                "indexOptionDefaults": { "wiredTiger": {} },
            }))
            .unwrap();

            assert_eq!(options.capped, Some(true));
            assert_eq!(options.size, Some(4096));
            assert_eq!(options.max, Some(100));
            assert_eq!(
                options.validation,
                ValidationOptions {
                    validator: Some(doc! { "age": { "$gte": 0 } }),
                    validation_action: Some(ValidationAction::Warn),
                    validation_level: Some(ValidationLevel::Moderate),
                }
            );
            assert_eq!(
                options.index_option_defaults,
                Some(IndexOptionDefaults {
                    storage_engine: Some(doc! { "wiredTiger": {} }),
                })
            );
        }

        #[test]
        fn test_validation_always_constructed() {
            let options: CreateCollectionOptions = parse(json!({ "capped": false })).unwrap();
            assert_eq!(options.validation, ValidationOptions::default());
        }

        #[test]
        fn test_invalid_validation_level() {
            let err = parse::<CreateCollectionOptions>(json!({ "validationLevel": "loose" }))
                .unwrap_err();
            assert!(matches!(err, ParseError::InvalidEnumValue { ref field, .. } if field == "validationLevel"));
        }
    }

    mod index_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_index_options() {
            let options: IndexOptions = parse(json!({
                "name": "email_unique",
                "unique": true,
                "sparse": false,
                "expireAfter": 3600,
                "storageEngine": "wiredTiger",
                "weights": { "body": 10 },
                "bits": 26,
                "min": -180,
                "max": 180.0,
                "bucketSize": 1.5,
                "partialFilterExpression": { "active": true },
            }))
            .unwrap();

            assert_eq!(options.name.as_deref(), Some("email_unique"));
            assert_eq!(options.unique, Some(true));
            assert_eq!(options.sparse, Some(false));
            assert_eq!(options.expire_after, Some(Duration::from_secs(3600)));
            assert_eq!(options.storage_engine, Some(doc! { "wiredTiger": {} }));
            assert_eq!(options.weights, Some(doc! { "body": 10 }));
            assert_eq!(options.bits, Some(26));
            assert_eq!(options.min, Some(-180.0));
            assert_eq!(options.max, Some(180.0));
            assert_eq!(options.bucket_size, Some(1.5));
            assert_eq!(options.partial_filter_expression, Some(doc! { "active": true }));
        }

        #[test]
        fn test_unique_background_leaves_rest_default() {
            let options: IndexOptions = parse(json!({ "unique": true, "background": false })).unwrap();
            assert_eq!(
                options,
                IndexOptions {
                    unique: Some(true),
                    background: Some(false),
                    ..Default::default()
                }
            );
        }

        #[test]
        fn test_index_model() {
            let keys = generic(json!({ "email": 1 }));
            let options = generic(json!({ "unique": true }));

            let model = parse_index_model(&keys, Some(&options)).unwrap();
            assert_eq!(model.keys, doc! { "email": 1 });
            assert_eq!(model.options.and_then(|o| o.unique), Some(true));

            let model = parse_index_model(&keys, None).unwrap();
            assert!(model.options.is_none());
        }

        #[test]
        fn test_index_model_bad_keys() {
            let keys = generic(json!({ "$b64": "@@" }));
            let err = parse_index_model(&keys, None).unwrap_err();
            assert!(matches!(err, ParseError::Convert { ref field, .. } if field == "keys"));
        }
    }

    mod write_concern_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_object_form() {
            let concern = parse_write_concern(&json!({ "w": 1, "j": true, "wtimeout": 500 })).unwrap();
            assert_eq!(
                concern,
                WriteConcern {
                    w: 1,
                    journal: Some(true),
                    w_timeout: Some(Duration::from_millis(500)),
                }
            );
        }

        #[test]
        fn test_replica_count_with_journal() {
            let concern = parse_write_concern(&json!({ "w": 2, "j": true })).unwrap();
            assert_eq!(concern.w, 2);
            assert_eq!(concern.journal, Some(true));
            assert_eq!(concern.w_timeout, None);
        }

        #[test]
        fn test_bare_integer() {
            assert_eq!(parse_write_concern(&json!(2)).unwrap(), WriteConcern::nodes(2));
            assert_eq!(parse_write_concern(&json!({ "w": 0 })).unwrap(), WriteConcern::nodes(0));
        }

        #[test]
        fn test_malformed() {
            assert!(matches!(
                parse_write_concern(&json!({ "w": "majority" })),
                Err(FieldError::TypeMismatch { .. })
            ));
            assert!(matches!(
                parse_write_concern(&json!("majority")),
                Err(FieldError::TypeMismatch { .. })
            ));
        }

        #[test]
        fn test_option_lookup() {
            let options = generic(json!({ "writeConcern": { "w": 0 } }));
            assert_eq!(write_concern_option(Some(&options)), Some(WriteConcern::nodes(0)));

            let options = generic(json!({ "writeConcern": "majority" }));
            assert_eq!(write_concern_option(Some(&options)), None);
            assert_eq!(write_concern_option(None), None);
        }
    }
}
