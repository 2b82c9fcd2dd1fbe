//! Bridge entry point routing method names to handlers.

use crate::config::BridgeOptions;
use crate::document::{DocumentEncoding, GenericDocument};
use crate::engine::Engine;
use crate::error::{BridgeError, ErrorResponse, Result};
use crate::handlers::{self, Request};
use crate::registry::Registry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Everything a handler can reach: the engine, the handle tables and the
/// current configuration.
pub struct Context {
    engine: Arc<dyn Engine>,
    registry: Registry,
    options: RwLock<BridgeOptions>,
}

impl Context {
    /// Create a context with empty handle tables.
    pub fn new(engine: Arc<dyn Engine>, options: BridgeOptions) -> Self {
        Self {
            engine,
            registry: Registry::new(),
            options: RwLock::new(options),
        }
    }

    /// The database engine.
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Live cursors and bulk batches.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A snapshot of the current configuration.
    pub async fn options(&self) -> BridgeOptions {
        self.options.read().await.clone()
    }

    /// Encoding used when a request does not say.
    pub async fn default_encoding(&self) -> DocumentEncoding {
        self.options.read().await.default_encoding()
    }

    /// Page size used by `cursorGetNext` when a request does not say.
    pub async fn default_batch_size(&self) -> usize {
        self.options.read().await.default_batch_size
    }

    async fn reconfigure(&self, options: BridgeOptions) {
        *self.options.write().await = options;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Every method name [`Bridge::call`] understands.
pub const METHODS: &[&str] = &[
    "initDb",
    "listDatabases",
    "dropDatabase",
    "listCollections",
    "createCollection",
    "dropCollection",
    "runCommand",
    "count",
    "find",
    "aggregate",
    "cursorGetNext",
    "closeCursor",
    "insertOne",
    "insertMany",
    "replaceOne",
    "updateOne",
    "updateMany",
    "deleteOne",
    "deleteMany",
    "createIndexes",
    "dropIndex",
    "listIndexes",
    "findOneAndDelete",
    "findOneAndReplace",
    "findOneAndUpdate",
    "newBulkWrite",
    "bulkWriteAddInsertOne",
    "bulkWriteAddDeleteOne",
    "bulkWriteAddDeleteMany",
    "bulkWriteAddReplaceOne",
    "bulkWriteAddUpdateOne",
    "bulkWriteAddUpdateMany",
    "bulkWriteCancel",
    "bulkWriteExecute",
];

/// The bridge between an application layer and a document database.
///
/// # Example
///
/// ```ignore
/// let bridge = Bridge::in_memory();
/// let response = bridge
///     .call("insertOne", &request)
///     .await?;
/// assert_eq!(response["success"], true);
/// ```
#[derive(Debug)]
pub struct Bridge {
    ctx: Context,
}

impl Bridge {
    /// Create a bridge over `engine`.
    pub fn new(engine: Arc<dyn Engine>, options: BridgeOptions) -> Self {
        Self {
            ctx: Context::new(engine, options),
        }
    }

    /// Create a bridge over a fresh in-memory engine with default options.
    #[cfg(feature = "memory-engine")]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::memory::MemoryEngine::new()),
            BridgeOptions::default(),
        )
    }

    /// The shared handler context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run one bridge method.
    pub async fn call(&self, method: &str, request: &GenericDocument) -> Result<GenericDocument> {
        debug!(method, "dispatching bridge call");
        let req = Request::new(method, request);
        let ctx = &self.ctx;

        match method {
            "initDb" => self.init_db(&req).await,

            "listDatabases" => handlers::database::list_databases(ctx, &req).await,
            "dropDatabase" => handlers::database::drop_database(ctx, &req).await,
            "listCollections" => handlers::database::list_collections(ctx, &req).await,
            "createCollection" => handlers::database::create_collection(ctx, &req).await,
            "dropCollection" => handlers::database::drop_collection(ctx, &req).await,
            "runCommand" => handlers::database::run_command(ctx, &req).await,

            "count" => handlers::read::count(ctx, &req).await,
            "find" => handlers::read::find(ctx, &req).await,
            "aggregate" => handlers::read::aggregate(ctx, &req).await,
            "cursorGetNext" => handlers::read::cursor_get_next(ctx, &req).await,
            "closeCursor" => handlers::read::close_cursor(ctx, &req).await,

            "insertOne" => handlers::write::insert_one(ctx, &req).await,
            "insertMany" => handlers::write::insert_many(ctx, &req).await,
            "replaceOne" => handlers::write::replace_one(ctx, &req).await,
            "updateOne" => handlers::write::update_one(ctx, &req).await,
            "updateMany" => handlers::write::update_many(ctx, &req).await,
            "deleteOne" => handlers::write::delete_one(ctx, &req).await,
            "deleteMany" => handlers::write::delete_many(ctx, &req).await,

            "createIndexes" => handlers::index::create_indexes(ctx, &req).await,
            "dropIndex" => handlers::index::drop_index(ctx, &req).await,
            "listIndexes" => handlers::index::list_indexes(ctx, &req).await,

            "findOneAndDelete" => handlers::find_and_modify::find_one_and_delete(ctx, &req).await,
            "findOneAndReplace" => handlers::find_and_modify::find_one_and_replace(ctx, &req).await,
            "findOneAndUpdate" => handlers::find_and_modify::find_one_and_update(ctx, &req).await,

            "newBulkWrite" => handlers::bulk::new_bulk_write(ctx, &req).await,
            "bulkWriteAddInsertOne" => handlers::bulk::add_insert_one(ctx, &req).await,
            "bulkWriteAddDeleteOne" => handlers::bulk::add_delete_one(ctx, &req).await,
            "bulkWriteAddDeleteMany" => handlers::bulk::add_delete_many(ctx, &req).await,
            "bulkWriteAddReplaceOne" => handlers::bulk::add_replace_one(ctx, &req).await,
            "bulkWriteAddUpdateOne" => handlers::bulk::add_update_one(ctx, &req).await,
            "bulkWriteAddUpdateMany" => handlers::bulk::add_update_many(ctx, &req).await,
            "bulkWriteCancel" => handlers::bulk::cancel(ctx, &req).await,
            "bulkWriteExecute" => handlers::bulk::execute(ctx, &req).await,

            other => Err(BridgeError::UnknownMethod(other.to_string())),
        }
    }

    /// Run one bridge method on a JSON encoded request.
    ///
    /// Always produces a JSON object: the response on success, an
    /// [`ErrorResponse`] otherwise.
    pub async fn call_json(&self, method: &str, request: &str) -> String {
        let result = match serde_json::from_str::<GenericDocument>(request) {
            Ok(doc) => self.call(method, &doc).await,
            Err(e) => Err(e.into()),
        };

        let encoded = match result {
            Ok(response) => serde_json::to_string(&response),
            Err(err) => serde_json::to_string(&ErrorResponse::from(&err)),
        };
        encoded.unwrap_or_else(|e| {
            warn!(method, error = %e, "could not encode response");
            r#"{"success":false,"message":"could not encode response","kind":"internal"}"#
                .to_string()
        })
    }

    async fn init_db(&self, req: &Request<'_>) -> Result<GenericDocument> {
        let options = BridgeOptions::parse(req.document_root())?;
        info!(app_id = ?options.app_id, "bridge initialized");
        self.ctx.reconfigure(options).await;
        Ok(handlers::respond(serde_json::json!({})))
    }
}
