//! Inserts, updates, replacements and deletes.
//!
//! When the namespace's write concern is unacknowledged (`w: 0`) the engine
//! does not report what happened, so counts and ids are sent back as `null`.

use super::{acknowledged, respond, Request};
use crate::bridge::Context;
use crate::document::{from_bson, GenericDocument};
use crate::engine::{DeleteResult, UpdateResult};
use crate::error::Result;
use crate::options::{
    DeleteOptions, InsertManyOptions, InsertOneOptions, ReplaceOptions, UpdateOptions,
};
use serde_json::{json, Value as JsonValue};

/// `insertOne` → `{insertedId}`.
pub async fn insert_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let doc = req.document("doc")?;
    let options: InsertOneOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().insert_one(&ns, doc, options).await)?;
    Ok(respond(json!({
        "insertedId": acknowledged(ns.is_acknowledged(), from_bson(&result.inserted_id)),
    })))
}

/// `insertMany` → `{insertedCount, insertedIds}`.
///
/// `insertedIds` lists the ids in input order.
pub async fn insert_many(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let docs = req.documents("docs")?;
    let options: InsertManyOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().insert_many(&ns, docs, options).await)?;
    if !result.acknowledged {
        return Ok(respond(json!({ "insertedCount": null, "insertedIds": null })));
    }

    let ids: Vec<JsonValue> = result.inserted_ids.values().map(from_bson).collect();
    Ok(respond(json!({
        "insertedCount": ids.len(),
        "insertedIds": ids,
    })))
}

/// `replaceOne` → update counts.
pub async fn replace_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let replacement = req.document("replacement")?;
    let options: ReplaceOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().replace_one(&ns, filter, replacement, options).await)?;
    Ok(update_response(&result))
}

/// `updateOne` → update counts.
pub async fn update_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let update = req.document("update")?;
    let options: UpdateOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().update_one(&ns, filter, update, options).await)?;
    Ok(update_response(&result))
}

/// `updateMany` → update counts.
pub async fn update_many(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let update = req.document("update")?;
    let options: UpdateOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().update_many(&ns, filter, update, options).await)?;
    Ok(update_response(&result))
}

/// `deleteOne` → `{deletedCount}`.
pub async fn delete_one(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let options: DeleteOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().delete_one(&ns, filter, options).await)?;
    Ok(delete_response(&result))
}

/// `deleteMany` → `{deletedCount}`.
pub async fn delete_many(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let options: DeleteOptions = req.parse_options()?;

    let result = req.driver(ctx.engine().delete_many(&ns, filter, options).await)?;
    Ok(delete_response(&result))
}

fn update_response(result: &UpdateResult) -> GenericDocument {
    if !result.acknowledged {
        return respond(json!({
            "matchedCount": null,
            "modifiedCount": null,
            "upsertedCount": null,
            "upsertedId": null,
        }));
    }

    let upserted_id = result.upserted_id.as_ref().map(from_bson);
    respond(json!({
        "matchedCount": result.matched_count,
        "modifiedCount": result.modified_count,
        "upsertedCount": u64::from(upserted_id.is_some()),
        "upsertedId": upserted_id,
    }))
}

fn delete_response(result: &DeleteResult) -> GenericDocument {
    respond(json!({
        "deletedCount": acknowledged(result.acknowledged, result.deleted_count),
    }))
}
