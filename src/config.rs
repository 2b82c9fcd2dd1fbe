//! Bridge configuration.

use crate::document::{DocumentEncoding, GenericDocument};
use crate::error::ParseError;
use crate::extract::{get_bool, get_i32, get_string, lenient};

/// Page size used by `cursorGetNext` when the request does not give one.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Options controlling bridge behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    /// Application identifier given at initialization.
    pub app_id: Option<String>,
    /// Default `cursorGetNext` page size.
    pub default_batch_size: usize,
    /// Encode results as binary envelopes unless a request says otherwise.
    pub use_bson: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            app_id: None,
            default_batch_size: DEFAULT_BATCH_SIZE,
            use_bson: false,
        }
    }
}

impl BridgeOptions {
    /// Create a builder.
    pub fn builder() -> BridgeOptionsBuilder {
        BridgeOptionsBuilder::default()
    }

    /// Read options from an initialization request.
    ///
    /// Unrecognized or malformed keys keep their defaults.
    pub fn parse(doc: &GenericDocument) -> Result<Self, ParseError> {
        let mut options = Self::default();

        if let Some(app_id) = lenient(get_string(doc, "appId"))? {
            options.app_id = Some(app_id);
        }
        if let Some(size) = lenient(get_i32(doc, "defaultBatchSize"))? {
            // Non-positive sizes would make every page empty.
            match usize::try_from(size) {
                Ok(size) if size > 0 => options.default_batch_size = size,
                _ => {}
            }
        }
        if let Some(use_bson) = lenient(get_bool(doc, "useBson"))? {
            options.use_bson = use_bson;
        }

        Ok(options)
    }

    /// Encoding used when a request has no `useBson` key.
    pub fn default_encoding(&self) -> DocumentEncoding {
        DocumentEncoding::from_flag(self.use_bson)
    }
}

/// Builder for BridgeOptions.
#[derive(Debug, Clone, Default)]
pub struct BridgeOptionsBuilder {
    options: BridgeOptions,
}

impl BridgeOptionsBuilder {
    /// Set the application identifier.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.options.app_id = Some(app_id.into());
        self
    }

    /// Set the default cursor page size.
    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.options.default_batch_size = size.max(1);
        self
    }

    /// Encode results as binary envelopes by default.
    pub fn use_bson(mut self, use_bson: bool) -> Self {
        self.options.use_bson = use_bson;
        self
    }

    /// Build the options.
    pub fn build(self) -> BridgeOptions {
        self.options
    }
}
