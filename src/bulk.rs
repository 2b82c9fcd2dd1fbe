//! Bulk write batches assembled over several bridge calls.

use crate::engine::{BulkWriteResult, Engine, Namespace, WriteModel};
use crate::error::DriverResult;
use crate::options::BulkWriteOptions;

/// Writes queued against one collection, executed together.
#[derive(Debug, Clone)]
pub struct BulkWriteBatch {
    namespace: Namespace,
    options: BulkWriteOptions,
    models: Vec<WriteModel>,
}

impl BulkWriteBatch {
    /// Start an empty batch.
    pub fn new(namespace: Namespace, options: BulkWriteOptions) -> Self {
        Self {
            namespace,
            options,
            models: Vec::new(),
        }
    }

    /// Target namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Queue a write.
    pub fn add(&mut self, model: WriteModel) {
        self.models.push(model);
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Send the queued writes to the engine. The batch itself is left intact.
    pub async fn execute(&self, engine: &dyn Engine) -> DriverResult<BulkWriteResult> {
        engine
            .bulk_write(&self.namespace, self.models.clone(), self.options.clone())
            .await
    }
}
