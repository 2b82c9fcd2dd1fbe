//! Bulk writes assembled over several calls.
//!
//! `newBulkWrite` opens a batch and returns its `operationId`. The
//! `bulkWriteAdd*` methods queue writes onto it, and `bulkWriteExecute` runs
//! them all at once. A batch that fails to execute stays open so it can be
//! retried or cancelled.

use super::{acknowledged, respond, unknown_handle, Request};
use crate::bridge::Context;
use crate::bulk::BulkWriteBatch;
use crate::document::{from_bson, GenericDocument};
use crate::engine::WriteModel;
use crate::error::{HandleKind, Result};
use crate::options::{BulkWriteOptions, DeleteOptions, ReplaceOptions, UpdateOptions};
use bson::Bson;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

const OPERATION_ID: &str = "operationId";

/// `newBulkWrite` → `{operationId}`.
pub async fn new_bulk_write(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let options: BulkWriteOptions = req.parse_options()?;

    let id = ctx
        .registry()
        .bulk
        .insert(BulkWriteBatch::new(ns, options))
        .await;
    Ok(respond(json!({ OPERATION_ID: id.to_string() })))
}

/// Queue `model` onto the batch named in the request.
async fn queue(ctx: &Context, req: &Request<'_>, model: WriteModel) -> Result<GenericDocument> {
    let id = req.handle(OPERATION_ID)?;
    ctx.registry()
        .bulk
        .with_mut(&id, |batch| batch.add(model))
        .await
        .ok_or_else(|| unknown_handle(HandleKind::BulkOperation, &id))?;
    Ok(respond(json!({})))
}

/// `bulkWriteAddInsertOne` (`doc`).
pub async fn add_insert_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let document = req.document("doc")?;
    queue(ctx, req, WriteModel::InsertOne { document }).await
}

/// `bulkWriteAddDeleteOne` (`filter`).
pub async fn add_delete_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let filter = req.filter()?;
    let options: DeleteOptions = req.parse_options()?;
    queue(ctx, req, WriteModel::DeleteOne { filter, options }).await
}

/// `bulkWriteAddDeleteMany` (`filter`).
pub async fn add_delete_many(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let filter = req.filter()?;
    let options: DeleteOptions = req.parse_options()?;
    queue(ctx, req, WriteModel::DeleteMany { filter, options }).await
}

/// `bulkWriteAddReplaceOne` (`filter`, `replacement`).
pub async fn add_replace_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let filter = req.filter()?;
    let replacement = req.document("replacement")?;
    let options: ReplaceOptions = req.parse_options()?;
    let model = WriteModel::ReplaceOne {
        filter,
        replacement,
        options,
    };
    queue(ctx, req, model).await
}

/// `bulkWriteAddUpdateOne` (`filter`, `update`).
pub async fn add_update_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let filter = req.filter()?;
    let update = req.document("update")?;
    let options: UpdateOptions = req.parse_options()?;
    let model = WriteModel::UpdateOne {
        filter,
        update,
        options,
    };
    queue(ctx, req, model).await
}

/// `bulkWriteAddUpdateMany` (`filter`, `update`).
pub async fn add_update_many(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let filter = req.filter()?;
    let update = req.document("update")?;
    let options: UpdateOptions = req.parse_options()?;
    let model = WriteModel::UpdateMany {
        filter,
        update,
        options,
    };
    queue(ctx, req, model).await
}

/// `bulkWriteCancel` → `{removed}`.
///
/// An unknown or malformed identifier is not an error.
pub async fn cancel(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let removed = match req.optional_handle(OPERATION_ID) {
        Some(id) => ctx.registry().bulk.remove(&id).await,
        None => false,
    };
    Ok(respond(json!({ "removed": removed })))
}

/// `bulkWriteExecute` → write counts plus `insertedIds` and `upsertedIds`.
///
/// The batch leaves the table while it runs, so a concurrent execute or add
/// on the same id fails with an invalid handle. A batch whose execution
/// fails is put back under its id.
pub async fn execute(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let id = req.handle(OPERATION_ID)?;
    let batch = ctx
        .registry()
        .bulk
        .take(&id)
        .await
        .ok_or_else(|| unknown_handle(HandleKind::BulkOperation, &id))?;

    let result = match batch.execute(ctx.engine()).await {
        Ok(result) => result,
        Err(fault) => {
            ctx.registry().bulk.restore(id, batch).await;
            return req.driver(Err(fault));
        }
    };

    let ack = result.acknowledged;
    Ok(respond(json!({
        "deletedCount": acknowledged(ack, result.deleted_count),
        "insertedCount": acknowledged(ack, result.inserted_count),
        "matchedCount": acknowledged(ack, result.matched_count),
        "modifiedCount": acknowledged(ack, result.modified_count),
        "upsertedCount": acknowledged(ack, result.upserted_ids.len()),
        "upsertedIds": acknowledged(ack, ids(&result.upserted_ids)),
        "insertedIds": acknowledged(ack, ids(&result.inserted_ids)),
    })))
}

fn ids(ids: &BTreeMap<usize, Bson>) -> Vec<JsonValue> {
    ids.values().map(from_bson).collect()
}
