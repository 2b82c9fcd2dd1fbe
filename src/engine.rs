//! The database engine seam.
//!
//! Handlers never talk to storage directly. They translate a request into
//! one [`Engine`] call and serialize whatever comes back.

use crate::cursor::ResultCursor;
use crate::error::DriverResult;
use crate::options::*;
use async_trait::async_trait;
use bson::{Bson, Document};
use std::collections::BTreeMap;
use std::fmt;

/// A collection within a database, with the write concern applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    /// Database name.
    pub db: String,
    /// Collection name.
    pub collection: String,
    /// Write concern for writes on this namespace.
    pub write_concern: Option<WriteConcern>,
}

impl Namespace {
    /// Create a namespace with the engine's default write concern.
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
            write_concern: None,
        }
    }

    /// Apply a write concern.
    pub fn with_write_concern(mut self, write_concern: Option<WriteConcern>) -> Self {
        self.write_concern = write_concern;
        self
    }

    /// Whether writes on this namespace report their results.
    pub fn is_acknowledged(&self) -> bool {
        self.write_concern.map_or(true, |wc| wc.is_acknowledged())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// Result of an insert_one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// The ID of the inserted document.
    pub inserted_id: Bson,
}

/// Result of an insert_many operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// Map of input position to inserted ID.
    pub inserted_ids: BTreeMap<usize, Bson>,
    /// Whether the engine acknowledged the write.
    pub acknowledged: bool,
}

/// Result of an update or replace operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Number of documents matched.
    pub matched_count: u64,
    /// Number of documents modified.
    pub modified_count: u64,
    /// The ID of the upserted document, if any.
    pub upserted_id: Option<Bson>,
    /// Whether the engine acknowledged the write.
    pub acknowledged: bool,
}

/// Result of a delete operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    /// Number of documents deleted.
    pub deleted_count: u64,
    /// Whether the engine acknowledged the write.
    pub acknowledged: bool,
}

/// Result of a bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    /// Number of documents inserted.
    pub inserted_count: u64,
    /// Number of documents matched by updates and replacements.
    pub matched_count: u64,
    /// Number of documents modified.
    pub modified_count: u64,
    /// Number of documents deleted.
    pub deleted_count: u64,
    /// Model position to inserted ID.
    pub inserted_ids: BTreeMap<usize, Bson>,
    /// Model position to upserted ID.
    pub upserted_ids: BTreeMap<usize, Bson>,
    /// Whether the engine acknowledged the write.
    pub acknowledged: bool,
}

/// A single queued write of a bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Insert a document.
    InsertOne {
        /// Document to insert.
        document: Document,
    },
    /// Delete the first matching document.
    DeleteOne {
        /// Selection filter.
        filter: Document,
        /// Delete options.
        options: DeleteOptions,
    },
    /// Delete all matching documents.
    DeleteMany {
        /// Selection filter.
        filter: Document,
        /// Delete options.
        options: DeleteOptions,
    },
    /// Replace the first matching document.
    ReplaceOne {
        /// Selection filter.
        filter: Document,
        /// Replacement document.
        replacement: Document,
        /// Replace options.
        options: ReplaceOptions,
    },
    /// Update the first matching document.
    UpdateOne {
        /// Selection filter.
        filter: Document,
        /// Update operators.
        update: Document,
        /// Update options.
        options: UpdateOptions,
    },
    /// Update all matching documents.
    UpdateMany {
        /// Selection filter.
        filter: Document,
        /// Update operators.
        update: Document,
        /// Update options.
        options: UpdateOptions,
    },
}

impl WriteModel {
    /// Operation name, as used in engine fault messages.
    pub fn name(&self) -> &'static str {
        match self {
            WriteModel::InsertOne { .. } => "insertOne",
            WriteModel::DeleteOne { .. } => "deleteOne",
            WriteModel::DeleteMany { .. } => "deleteMany",
            WriteModel::ReplaceOne { .. } => "replaceOne",
            WriteModel::UpdateOne { .. } => "updateOne",
            WriteModel::UpdateMany { .. } => "updateMany",
        }
    }
}

/// Identifies an index to drop.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSelector {
    /// By index name.
    Name(String),
    /// By key pattern.
    Keys(Document),
}

/// The operations the bridge needs from a document database.
#[async_trait]
pub trait Engine: Send + Sync {
    /// List databases as `{name, sizeOnDisk, empty}` documents.
    async fn list_databases(&self) -> DriverResult<Vec<Document>>;

    /// Drop a database. Returns false if it did not exist.
    async fn drop_database(&self, db: &str) -> DriverResult<bool>;

    /// List collections as `{name, type, options}` documents.
    async fn list_collections(&self, db: &str) -> DriverResult<Vec<Document>>;

    /// Create a collection explicitly.
    async fn create_collection(
        &self,
        ns: &Namespace,
        options: CreateCollectionOptions,
    ) -> DriverResult<()>;

    /// Drop a collection. Returns false if it did not exist.
    async fn drop_collection(&self, ns: &Namespace) -> DriverResult<bool>;

    /// Run a database command.
    async fn run_command(&self, db: &str, command: Document) -> DriverResult<Document>;

    /// Count matching documents.
    async fn count(&self, ns: &Namespace, filter: Document, options: CountOptions)
        -> DriverResult<u64>;

    /// Open a cursor over matching documents.
    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn ResultCursor>>;

    /// Open a cursor over the output of an aggregation pipeline.
    async fn aggregate(
        &self,
        ns: &Namespace,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DriverResult<Box<dyn ResultCursor>>;

    /// Insert one document.
    async fn insert_one(
        &self,
        ns: &Namespace,
        document: Document,
        options: InsertOneOptions,
    ) -> DriverResult<InsertOneResult>;

    /// Insert several documents.
    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DriverResult<InsertManyResult>;

    /// Replace the first matching document.
    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> DriverResult<UpdateResult>;

    /// Update the first matching document.
    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;

    /// Update every matching document.
    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;

    /// Delete the first matching document.
    async fn delete_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: DeleteOptions,
    ) -> DriverResult<DeleteResult>;

    /// Delete every matching document.
    async fn delete_many(
        &self,
        ns: &Namespace,
        filter: Document,
        options: DeleteOptions,
    ) -> DriverResult<DeleteResult>;

    /// Create indexes, returning their names in input order.
    async fn create_indexes(
        &self,
        ns: &Namespace,
        models: Vec<IndexModel>,
    ) -> DriverResult<Vec<String>>;

    /// Drop one index.
    async fn drop_index(&self, ns: &Namespace, index: IndexSelector) -> DriverResult<()>;

    /// List index descriptions.
    async fn list_indexes(&self, ns: &Namespace) -> DriverResult<Vec<Document>>;

    /// Delete the first matching document and return it.
    async fn find_one_and_delete(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> DriverResult<Option<Document>>;

    /// Replace the first matching document and return it.
    async fn find_one_and_replace(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: FindOneAndReplaceOptions,
    ) -> DriverResult<Option<Document>>;

    /// Update the first matching document and return it.
    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DriverResult<Option<Document>>;

    /// Execute queued writes.
    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult>;
}
