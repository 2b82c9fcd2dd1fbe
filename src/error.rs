//! Error types for bridge requests.
//!
//! Errors are layered the same way a request is processed:
//!
//! - [`FieldError`] is what a single scalar or document lookup produces.
//! - [`ConvertError`] is raised while turning a generic document into BSON.
//! - [`ParseError`] aborts a compound option build.
//! - [`BridgeError`] is what crosses the boundary back to the caller.

use serde::Serialize;
use thiserror::Error;

/// Failure converting a generic document into a canonical BSON document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    /// Malformed base64 or malformed embedded BSON bytes.
    #[error("could not decode document: {reason}")]
    DocumentDecode {
        /// Decoder message.
        reason: String,
    },

    /// An element of a document array failed to convert.
    #[error("element {index} is not a valid document: {source}")]
    ArrayElement {
        /// Position of the first failing element.
        index: usize,
        /// Why the element failed.
        #[source]
        source: Box<ConvertError>,
    },

    /// The value is not an object.
    #[error("expected a document")]
    NotADocument,
}

impl ConvertError {
    /// Create a decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        ConvertError::DocumentDecode {
            reason: reason.into(),
        }
    }
}

/// Outcome of looking up one named field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    /// The key is not present (or is `null`).
    #[error("field not present")]
    Absent,

    /// The key is present but holds a value of the wrong type.
    #[error("invalid type for variable {field}; expected {expected}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Human readable description of the accepted type.
        expected: &'static str,
    },

    /// The field held a document that could not be converted.
    #[error("could not parse {field}: {source}")]
    Convert {
        /// Field name.
        field: String,
        /// Conversion failure.
        #[source]
        source: ConvertError,
    },
}

impl FieldError {
    /// Create a type mismatch for `field`.
    pub fn mismatch(field: &str, expected: &'static str) -> Self {
        FieldError::TypeMismatch {
            field: field.to_string(),
            expected,
        }
    }

    /// Check if the field was simply not there.
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldError::Absent)
    }

    /// Turn a failed lookup into a build-aborting error.
    ///
    /// Absence never aborts a build, so it maps to `None`.
    pub fn escalate(self) -> Option<ParseError> {
        match self {
            FieldError::Absent => None,
            FieldError::TypeMismatch { field, expected } => {
                Some(ParseError::FieldTypeMismatch { field, expected })
            }
            FieldError::Convert { field, source } => Some(ParseError::Convert { field, source }),
        }
    }
}

/// Failure that aborts building a compound options struct.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A string field did not match any recognized token.
    #[error("invalid value {value:?} for {field}; expected {expected}")]
    InvalidEnumValue {
        /// Field name.
        field: String,
        /// The rejected value, rendered as text.
        value: String,
        /// Accepted tokens.
        expected: &'static str,
    },

    /// A strictly checked field held the wrong type.
    #[error("invalid type for variable {field}; expected {expected}")]
    FieldTypeMismatch {
        /// Field name.
        field: String,
        /// Accepted type.
        expected: &'static str,
    },

    /// A document or document array could not be converted.
    #[error("could not parse {field}: {source}")]
    Convert {
        /// Field name.
        field: String,
        /// Conversion failure.
        #[source]
        source: ConvertError,
    },
}

impl ParseError {
    /// Create an invalid enum value error.
    pub fn invalid_enum(field: &str, value: impl Into<String>, expected: &'static str) -> Self {
        ParseError::InvalidEnumValue {
            field: field.to_string(),
            value: value.into(),
            expected,
        }
    }
}

/// A fault raised by the database engine while executing an operation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct DriverFault {
    /// Engine error code, if the engine reports one.
    pub code: Option<i32>,
    /// Error message.
    pub message: String,
}

impl DriverFault {
    /// Create a fault without an error code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create a fault carrying an engine error code.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Kind of opaque handle a request referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// A live result cursor.
    Cursor,
    /// A pending bulk write batch.
    BulkOperation,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::Cursor => f.write_str("cursor"),
            HandleKind::BulkOperation => f.write_str("bulk operation"),
        }
    }
}

/// All errors a bridge request can be rejected with.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An option document could not be built.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A required document could not be converted.
    #[error("{key} must be a valid document: {source}")]
    Convert {
        /// Request key.
        key: String,
        /// Conversion failure.
        #[source]
        source: ConvertError,
    },

    /// `db` is absent or blank.
    #[error("db name must be provided and must be a string")]
    MissingDbName,

    /// `collection` is absent or blank.
    #[error("collection name must be provided and must be a string")]
    MissingCollectionName,

    /// A required request key is absent.
    #[error("{0} must be provided")]
    MissingRequiredField(String),

    /// A request value is present but unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An identifier does not refer to a live handle.
    #[error("{id} does not refer to a valid {kind}")]
    InvalidHandle {
        /// Which table was searched.
        kind: HandleKind,
        /// The identifier as received.
        id: String,
    },

    /// The engine failed while executing the operation.
    #[error("could not execute {operation}: {source}")]
    Driver {
        /// Bridge method name.
        operation: String,
        /// Engine fault.
        #[source]
        source: DriverFault,
    },

    /// The method name is not exposed by the bridge.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The request text is not a JSON object.
    #[error("request must be a JSON object: {0}")]
    Json(String),

    /// BSON serialization error.
    #[error("bson error: {0}")]
    Bson(String),
}

impl BridgeError {
    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BridgeError::InvalidArgument(msg.into())
    }

    /// Create a missing field error.
    pub fn missing(key: impl Into<String>) -> Self {
        BridgeError::MissingRequiredField(key.into())
    }

    /// Wrap an engine fault raised while running `operation`.
    pub fn driver(operation: impl Into<String>, source: DriverFault) -> Self {
        BridgeError::Driver {
            operation: operation.into(),
            source,
        }
    }

    /// Check if the request was rejected before reaching the engine.
    pub fn is_invalid_request(&self) -> bool {
        self.kind() == ErrorKind::InvalidRequest
    }

    /// Get the engine error code if available.
    pub fn code(&self) -> Option<i32> {
        match self {
            BridgeError::Driver { source, .. } => source.code,
            _ => None,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Parse(_)
            | BridgeError::Convert { .. }
            | BridgeError::MissingDbName
            | BridgeError::MissingCollectionName
            | BridgeError::MissingRequiredField(_)
            | BridgeError::InvalidArgument(_)
            | BridgeError::InvalidHandle { .. }
            | BridgeError::UnknownMethod(_)
            | BridgeError::Json(_) => ErrorKind::InvalidRequest,
            BridgeError::Driver { .. } => ErrorKind::Driver,
            BridgeError::Bson(_) => ErrorKind::Internal,
        }
    }
}

impl From<bson::ser::Error> for BridgeError {
    fn from(err: bson::ser::Error) -> Self {
        BridgeError::Bson(err.to_string())
    }
}

impl From<bson::de::Error> for BridgeError {
    fn from(err: bson::de::Error) -> Self {
        BridgeError::Bson(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json(err.to_string())
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result type alias for engine operations.
pub type DriverResult<T> = std::result::Result<T, DriverFault>;

/// Error kind enumeration for pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The request was rejected before reaching the engine.
    InvalidRequest,
    /// The engine raised a fault.
    Driver,
    /// Internal error.
    Internal,
}

/// Failure payload sent back across the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always false.
    pub success: bool,
    /// Human readable message.
    pub message: String,
    /// Error category.
    pub kind: ErrorKind,
    /// Engine error code, for driver faults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl From<&BridgeError> for ErrorResponse {
    fn from(err: &BridgeError) -> Self {
        Self {
            success: false,
            message: err.message(),
            kind: err.kind(),
            code: err.code(),
        }
    }
}
