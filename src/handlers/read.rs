//! Queries and cursor paging.

use super::{encode_all, respond, unknown_handle, Request};
use crate::bridge::Context;
use crate::cursor::{Cursor, ResultCursor};
use crate::document::{DocumentEncoding, GenericDocument};
use crate::engine::Namespace;
use crate::error::{BridgeError, FieldError, HandleKind, Result};
use crate::extract::get_i64;
use crate::options::{AggregateOptions, CountOptions, FindOptions};
use serde_json::json;

/// `count` → `{count}`.
pub async fn count(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let options: CountOptions = req.parse_options()?;
    let count = req.driver(ctx.engine().count(&ns, filter, options).await)?;
    Ok(respond(json!({ "count": count })))
}

/// `find` → `{results}`, or `{cursorId}` with `cursor: true`.
pub async fn find(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let options: FindOptions = req.parse_options()?;
    let encoding = req.encoding(ctx.default_encoding().await);

    let source = req.driver(ctx.engine().find(&ns, filter, options).await)?;
    results_or_cursor(ctx, req, &ns, source, encoding).await
}

/// `aggregate` → `{results}`, or `{cursorId}` with `cursor: true`.
pub async fn aggregate(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let pipeline = req.documents("pipeline")?;
    let options: AggregateOptions = req.parse_options()?;
    let encoding = req.encoding(ctx.default_encoding().await);

    let source = req.driver(ctx.engine().aggregate(&ns, pipeline, options).await)?;
    results_or_cursor(ctx, req, &ns, source, encoding).await
}

async fn results_or_cursor(
    ctx: &Context,
    req: &Request<'_>,
    ns: &Namespace,
    source: Box<dyn ResultCursor>,
    encoding: DocumentEncoding,
) -> Result<GenericDocument> {
    let cursor = Cursor::new(ns.to_string(), source, encoding);

    if req.flag("cursor") {
        let id = ctx.registry().cursors.insert(cursor).await;
        return Ok(respond(json!({ "cursorId": id.to_string() })));
    }

    let docs = req.driver(cursor.collect().await)?;
    Ok(respond(json!({ "results": encode_all(&docs, encoding)? })))
}

/// `cursorGetNext` → `{results}`, plus `complete: true` on the final empty page.
///
/// The cursor handle is removed once it reports completion.
pub async fn cursor_get_next(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let id = req.handle("cursorId")?;
    let cursor = ctx
        .registry()
        .cursors
        .get(&id)
        .await
        .ok_or_else(|| unknown_handle(HandleKind::Cursor, &id))?;

    let batch_size = match get_i64(req.document_root(), "batchSize") {
        Ok(size) if size < 1 => {
            return Err(BridgeError::invalid_argument("batchSize must be at least 1"));
        }
        Ok(size) => usize::try_from(size).unwrap_or(usize::MAX),
        Err(FieldError::Absent) => ctx.default_batch_size().await,
        Err(_) => {
            return Err(BridgeError::invalid_argument(
                "batchSize must be an integer of at least 1",
            ));
        }
    };
    let encoding = req.encoding(cursor.encoding());

    let page = req.driver(cursor.next_page(batch_size).await)?;
    if page.is_empty() {
        cursor.close().await;
        ctx.registry().cursors.remove(&id).await;
        return Ok(respond(json!({ "results": [], "complete": true })));
    }
    Ok(respond(json!({ "results": encode_all(&page, encoding)? })))
}

/// `closeCursor` → `{removed}`.
///
/// An unknown or malformed identifier is not an error.
pub async fn close_cursor(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let removed = match req.optional_handle("cursorId") {
        Some(id) => match ctx.registry().cursors.take(&id).await {
            Some(cursor) => {
                cursor.close().await;
                true
            }
            None => false,
        },
        None => false,
    };
    Ok(respond(json!({ "removed": removed })))
}
