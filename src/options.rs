//! Typed operation options produced from request documents.
//!
//! Every field is optional. A field left `None` means the engine default.

use bson::Document;
use std::time::Duration;

/// Kind of cursor a find opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    /// Closed once the last result is returned.
    #[default]
    NonTailable,
    /// Stays open on capped collections after the last result.
    Tailable,
    /// Tailable, and the server waits for new data before returning.
    TailableAwait,
}

impl CursorType {
    /// Accepted request tokens.
    pub const TOKENS: &'static str = "'tailable' | 'nonTailable' | 'tailableAwait'";

    /// Parse a request token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "tailable" => Some(CursorType::Tailable),
            "nonTailable" => Some(CursorType::NonTailable),
            "tailableAwait" => Some(CursorType::TailableAwait),
            _ => None,
        }
    }
}

/// Index to use for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// Index name.
    Name(String),
    /// Index key pattern.
    Keys(Document),
}

/// Which version of the document a find-and-modify returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    /// The document as it was before the modification.
    #[default]
    Before,
    /// The document after the modification.
    After,
}

/// Collation strength levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollationStrength {
    /// Base characters only.
    Primary = 1,
    /// Base characters and diacritics.
    Secondary = 2,
    /// Base characters, diacritics and case.
    Tertiary = 3,
    /// Tertiary plus punctuation.
    Quaternary = 4,
    /// Code point tie breaking.
    Identical = 5,
}

impl CollationStrength {
    /// Accepted levels.
    pub const LEVELS: &'static str = "an integer between 1 and 5";

    /// Map a numeric level to a strength.
    pub fn from_level(level: i32) -> Option<Self> {
        match level {
            1 => Some(CollationStrength::Primary),
            2 => Some(CollationStrength::Secondary),
            3 => Some(CollationStrength::Tertiary),
            4 => Some(CollationStrength::Quaternary),
            5 => Some(CollationStrength::Identical),
            _ => None,
        }
    }

    /// Numeric level.
    pub fn level(self) -> i32 {
        self as i32
    }
}

/// Sort order of upper and lower case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollationCaseFirst {
    /// Uppercase sorts before lowercase.
    Upper,
    /// Lowercase sorts before uppercase.
    Lower,
    /// Locale default.
    Off,
}

impl CollationCaseFirst {
    /// Accepted request tokens.
    pub const TOKENS: &'static str = "'upper' | 'lower' | 'off'";

    /// Parse a request token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "upper" => Some(CollationCaseFirst::Upper),
            "lower" => Some(CollationCaseFirst::Lower),
            "off" => Some(CollationCaseFirst::Off),
            _ => None,
        }
    }
}

/// Whether whitespace and punctuation are considered base characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollationAlternate {
    /// Whitespace and punctuation are base characters.
    NonIgnorable,
    /// Whitespace and punctuation are ignored at lower strengths.
    Shifted,
}

impl CollationAlternate {
    /// Accepted request tokens.
    pub const TOKENS: &'static str = "'non-ignorable' | 'shifted'";

    /// Parse a request token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "non-ignorable" => Some(CollationAlternate::NonIgnorable),
            "shifted" => Some(CollationAlternate::Shifted),
            _ => None,
        }
    }
}

/// Characters affected by [`CollationAlternate::Shifted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollationMaxVariable {
    /// Whitespace and punctuation.
    Punct,
    /// Whitespace only.
    Space,
}

impl CollationMaxVariable {
    /// Accepted request tokens.
    pub const TOKENS: &'static str = "'punct' | 'space'";

    /// Parse a request token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "punct" => Some(CollationMaxVariable::Punct),
            "space" => Some(CollationMaxVariable::Space),
            _ => None,
        }
    }
}

/// Language specific string comparison rules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collation {
    /// ICU locale.
    pub locale: Option<String>,
    /// Whether to include a case comparison level.
    pub case_level: Option<bool>,
    /// Case ordering.
    pub case_first: Option<CollationCaseFirst>,
    /// Comparison strength.
    pub strength: Option<CollationStrength>,
    /// Compare numeric strings as numbers.
    pub numeric_ordering: Option<bool>,
    /// Handling of whitespace and punctuation.
    pub alternate: Option<CollationAlternate>,
    /// Characters considered ignorable.
    pub max_variable: Option<CollationMaxVariable>,
    /// Sort diacritics from the back of the string.
    pub backwards: Option<bool>,
}

/// Acknowledgement requested from the engine for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConcern {
    /// Number of acknowledgements; zero means unacknowledged.
    pub w: i32,
    /// Wait for the journal.
    pub journal: Option<bool>,
    /// Acknowledgement time limit.
    pub w_timeout: Option<Duration>,
}

impl WriteConcern {
    /// Write concern with only `w` set.
    pub fn nodes(w: i32) -> Self {
        Self {
            w,
            journal: None,
            w_timeout: None,
        }
    }

    /// Whether the engine reports results for writes.
    pub fn is_acknowledged(&self) -> bool {
        self.w != 0
    }
}

/// Options for find operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Return partial results if some shards are down.
    pub allow_partial_results: Option<bool>,
    /// Batch size for cursor.
    pub batch_size: Option<i32>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the query.
    pub comment: Option<String>,
    /// Cursor kind.
    pub cursor_type: Option<CursorType>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Maximum number of documents to return.
    pub limit: Option<i32>,
    /// Exclusive upper index bound.
    pub max: Option<Document>,
    /// Wait time for tailable await cursors.
    pub max_await_time: Option<Duration>,
    /// Time limit for the query.
    pub max_time: Option<Duration>,
    /// Inclusive lower index bound.
    pub min: Option<Document>,
    /// Keep idle cursors open.
    pub no_cursor_timeout: Option<bool>,
    /// Projection (fields to include/exclude).
    pub projection: Option<Document>,
    /// Return only index keys.
    pub return_key: Option<bool>,
    /// Add the record id to each result.
    pub show_record_id: Option<bool>,
    /// Number of documents to skip.
    pub skip: Option<i32>,
    /// Sort order.
    pub sort: Option<Document>,
}

impl FindOptions {
    /// Create a builder.
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }
}

/// Builder for FindOptions.
#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    /// Set the limit.
    pub fn limit(mut self, limit: i32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Set the skip.
    pub fn skip(mut self, skip: i32) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Set the sort order.
    pub fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    /// Set the projection.
    pub fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, batch_size: i32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    /// Set the cursor type.
    pub fn cursor_type(mut self, cursor_type: CursorType) -> Self {
        self.options.cursor_type = Some(cursor_type);
        self
    }

    /// Set the index hint.
    pub fn hint(mut self, hint: Hint) -> Self {
        self.options.hint = Some(hint);
        self
    }

    /// Set the collation.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// Build the options.
    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Options for aggregate operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    /// Allow stages to write temporary files.
    pub allow_disk_use: Option<bool>,
    /// Batch size for cursor.
    pub batch_size: Option<i32>,
    /// Skip schema validation for `$out` stages.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<String>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Time limit for the command.
    pub max_time: Option<Duration>,
}

/// Options for count operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    /// Collation.
    pub collation: Option<Collation>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Maximum number of documents to count.
    pub limit: Option<i32>,
    /// Time limit for the command.
    pub max_time: Option<Duration>,
    /// Number of documents to skip before counting.
    pub skip: Option<i32>,
}

/// Options for insert_one operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOneOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
}

/// Options for insert_many operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Stop at the first failed insert.
    pub ordered: Option<bool>,
}

/// Options for update operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Array filters for updating nested arrays.
    pub array_filters: Option<Vec<Document>>,
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Whether to insert if no documents match.
    pub upsert: Option<bool>,
}

impl UpdateOptions {
    /// Create a builder.
    pub fn builder() -> UpdateOptionsBuilder {
        UpdateOptionsBuilder::default()
    }
}

/// Builder for UpdateOptions.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptionsBuilder {
    options: UpdateOptions,
}

impl UpdateOptionsBuilder {
    /// Set upsert option.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.options.upsert = Some(upsert);
        self
    }

    /// Set array filters.
    pub fn array_filters(mut self, filters: Vec<Document>) -> Self {
        self.options.array_filters = Some(filters);
        self
    }

    /// Set the collation.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// Build the options.
    pub fn build(self) -> UpdateOptions {
        self.options
    }
}

/// Options for replace operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Whether to insert if no documents match.
    pub upsert: Option<bool>,
}

impl From<ReplaceOptions> for UpdateOptions {
    fn from(options: ReplaceOptions) -> Self {
        UpdateOptions {
            array_filters: None,
            bypass_document_validation: options.bypass_document_validation,
            collation: options.collation,
            upsert: options.upsert,
        }
    }
}

/// Options for delete operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    /// Collation.
    pub collation: Option<Collation>,
}

/// Action taken when a document fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAction {
    /// Reject the write.
    Error,
    /// Log and accept the write.
    Warn,
}

impl ValidationAction {
    /// Accepted request tokens.
    pub const TOKENS: &'static str = "'error' | 'warn'";

    /// Parse a request token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "error" => Some(ValidationAction::Error),
            "warn" => Some(ValidationAction::Warn),
            _ => None,
        }
    }
}

/// Which writes are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// No validation.
    Off,
    /// All inserts and updates.
    Strict,
    /// Only documents that already pass validation.
    Moderate,
}

impl ValidationLevel {
    /// Accepted request tokens.
    pub const TOKENS: &'static str = "'off' | 'strict' | 'moderate'";

    /// Parse a request token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "off" => Some(ValidationLevel::Off),
            "strict" => Some(ValidationLevel::Strict),
            "moderate" => Some(ValidationLevel::Moderate),
            _ => None,
        }
    }
}

/// Document validation settings of a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOptions {
    /// Validator expression.
    pub validator: Option<Document>,
    /// Action on failed validation.
    pub validation_action: Option<ValidationAction>,
    /// Which writes are validated.
    pub validation_level: Option<ValidationLevel>,
}

/// Defaults applied to indexes created on a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptionDefaults {
    /// Storage engine configuration for new indexes.
    pub storage_engine: Option<Document>,
}

/// Options for create_collection operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateCollectionOptions {
    /// Fixed size collection.
    pub capped: Option<bool>,
    /// Maximum size in bytes of a capped collection.
    pub size: Option<i64>,
    /// Maximum number of documents of a capped collection.
    pub max: Option<i64>,
    /// Storage engine configuration.
    pub storage_engine: Option<Document>,
    /// Validation settings.
    pub validation: ValidationOptions,
    /// Index defaults.
    pub index_option_defaults: Option<IndexOptionDefaults>,
    /// Default collation.
    pub collation: Option<Collation>,
}

/// Options for a single index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptions {
    /// Build in the background.
    pub background: Option<bool>,
    /// TTL of indexed documents.
    pub expire_after: Option<Duration>,
    /// Index name.
    pub name: Option<String>,
    /// Only index documents that contain the field.
    pub sparse: Option<bool>,
    /// Storage engine configuration.
    pub storage_engine: Option<Document>,
    /// Reject duplicate keys.
    pub unique: Option<bool>,
    /// Index version.
    pub version: Option<i32>,
    /// Text index language.
    pub default_language: Option<String>,
    /// Field holding a per-document language.
    pub language_override: Option<String>,
    /// Text index version.
    pub text_version: Option<i32>,
    /// Text index field weights.
    pub weights: Option<Document>,
    /// 2dsphere index version.
    pub sphere_version: Option<i32>,
    /// 2d index precision.
    pub bits: Option<i32>,
    /// 2d index upper bound.
    pub max: Option<f64>,
    /// 2d index lower bound.
    pub min: Option<f64>,
    /// geoHaystack bucket size.
    pub bucket_size: Option<f64>,
    /// Only index documents matching this filter.
    pub partial_filter_expression: Option<Document>,
    /// Collation.
    pub collation: Option<Collation>,
}

impl IndexOptions {
    /// Create a builder.
    pub fn builder() -> IndexOptionsBuilder {
        IndexOptionsBuilder::default()
    }
}

/// Builder for IndexOptions.
#[derive(Debug, Clone, Default)]
pub struct IndexOptionsBuilder {
    options: IndexOptions,
}

impl IndexOptionsBuilder {
    /// Set the index name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Reject duplicate keys.
    pub fn unique(mut self, unique: bool) -> Self {
        self.options.unique = Some(unique);
        self
    }

    /// Only index documents that contain the field.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.options.sparse = Some(sparse);
        self
    }

    /// Build the options.
    pub fn build(self) -> IndexOptions {
        self.options
    }
}

/// An index key pattern with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    /// Key pattern, e.g. `{ "email": 1 }`.
    pub keys: Document,
    /// Index options.
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    /// Create a model without options.
    pub fn new(keys: Document) -> Self {
        Self { keys, options: None }
    }

    /// Attach options.
    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Options for find_one_and_delete operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndDeleteOptions {
    /// Collation.
    pub collation: Option<Collation>,
    /// Time limit for the command.
    pub max_time: Option<Duration>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Picks the document to delete when several match.
    pub sort: Option<Document>,
}

/// Options for find_one_and_replace operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndReplaceOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Time limit for the command.
    pub max_time: Option<Duration>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Whether to return the document before or after the replacement.
    pub return_document: Option<ReturnDocument>,
    /// Picks the document to replace when several match.
    pub sort: Option<Document>,
    /// Whether to insert if no documents match.
    pub upsert: Option<bool>,
}

/// Options for find_one_and_update operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    /// Array filters for updating nested arrays.
    pub array_filters: Option<Vec<Document>>,
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Time limit for the command.
    pub max_time: Option<Duration>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Whether to return the document before or after the update.
    pub return_document: Option<ReturnDocument>,
    /// Picks the document to update when several match.
    pub sort: Option<Document>,
    /// Whether to insert if no documents match.
    pub upsert: Option<bool>,
}

impl From<FindOneAndReplaceOptions> for FindOneAndUpdateOptions {
    fn from(options: FindOneAndReplaceOptions) -> Self {
        FindOneAndUpdateOptions {
            array_filters: None,
            bypass_document_validation: options.bypass_document_validation,
            collation: options.collation,
            max_time: options.max_time,
            projection: options.projection,
            return_document: options.return_document,
            sort: options.sort,
            upsert: options.upsert,
        }
    }
}

/// Options for bulk write execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Stop at the first failed write.
    pub ordered: Option<bool>,
}
