//! # mongo-mobile
//!
//! A bridge exposing an embedded document database to mobile application
//! layers.
//!
//! The application layer sends a method name and a generic request document
//! (plain JSON values) and gets a generic response document back. The bridge
//! parses loosely typed option documents into typed options, runs the
//! operation on an [`Engine`] and encodes the results.
//!
//! ## Features
//!
//! - CRUD, aggregation, index and database management methods
//! - Server-side cursors paged through opaque handles
//! - Bulk writes assembled over several calls
//! - `{"$b64": ...}` envelopes for documents carried as raw BSON
//! - `memory-engine` (default): an in-process engine for embedding and tests
//!
//! ## Quick Start
//!
//! ```ignore
//! use mongo_mobile::Bridge;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> mongo_mobile::Result<()> {
//!     let bridge = Bridge::in_memory();
//!
//!     let request = json!({
//!         "db": "app",
//!         "collection": "users",
//!         "doc": { "name": "John", "age": 30 },
//!     });
//!     let response = bridge
//!         .call("insertOne", request.as_object().unwrap())
//!         .await?;
//!     println!("inserted {}", response["insertedId"]);
//!
//!     let request = json!({
//!         "db": "app",
//!         "collection": "users",
//!         "filter": { "age": { "$gte": 18 } },
//!         "options": { "sort": { "age": -1 }, "limit": 10 },
//!     });
//!     let response = bridge.call("find", request.as_object().unwrap()).await?;
//!     println!("{}", serde_json::to_string_pretty(&response["results"]).unwrap());
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod bulk;
pub mod config;
pub mod cursor;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod handlers;
#[cfg(feature = "memory-engine")]
pub mod matcher;
#[cfg(feature = "memory-engine")]
pub mod memory;
pub mod options;
pub mod parser;
pub mod registry;
#[cfg(feature = "memory-engine")]
pub mod update;

// Re-export main types
pub use bridge::{Bridge, Context, METHODS};
pub use config::{BridgeOptions, BridgeOptionsBuilder};
pub use cursor::{BufferedCursor, Cursor, ResultCursor};
pub use document::{DocumentEncoding, GenericDocument};
pub use engine::{
    BulkWriteResult, DeleteResult, Engine, IndexSelector, InsertManyResult, InsertOneResult,
    Namespace, UpdateResult, WriteModel,
};
pub use error::{
    BridgeError, ConvertError, DriverFault, DriverResult, ErrorKind, ErrorResponse, FieldError,
    ParseError, Result,
};
#[cfg(feature = "memory-engine")]
pub use memory::MemoryEngine;
pub use parser::ParseOptions;

// Re-export bson for convenience
pub use bson;
pub use bson::doc;

/// Prelude module for common imports.
pub mod prelude {
    pub use super::bridge::Bridge;
    pub use super::config::BridgeOptions;
    pub use super::document::{DocumentEncoding, GenericDocument};
    pub use super::engine::{Engine, Namespace};
    pub use super::error::{BridgeError, ErrorKind, Result};
    pub use super::options::*;
    pub use super::parser::ParseOptions;
    pub use bson::{doc, Document};
    pub use serde_json::json;
}

/// Get the bridge version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
