//! Atomic find-and-modify operations. Each returns `{doc}`, `null` when
//! nothing matched.

use super::{encode_optional, respond, Request};
use crate::bridge::Context;
use crate::document::GenericDocument;
use crate::error::Result;
use crate::options::{FindOneAndDeleteOptions, FindOneAndReplaceOptions, FindOneAndUpdateOptions};
use bson::Document;
use serde_json::json;

/// `findOneAndDelete` → `{doc}`, the removed document.
pub async fn find_one_and_delete(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let options: FindOneAndDeleteOptions = req.parse_options()?;

    let doc = req.driver(ctx.engine().find_one_and_delete(&ns, filter, options).await)?;
    found(ctx, req, doc).await
}

/// `findOneAndReplace` → `{doc}`.
pub async fn find_one_and_replace(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let replacement = req.document("replacement")?;
    let options: FindOneAndReplaceOptions = req.parse_options()?;

    let doc = req.driver(
        ctx.engine()
            .find_one_and_replace(&ns, filter, replacement, options)
            .await,
    )?;
    found(ctx, req, doc).await
}

/// `findOneAndUpdate` → `{doc}`.
pub async fn find_one_and_update(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let filter = req.filter()?;
    let update = req.document("update")?;
    let options: FindOneAndUpdateOptions = req.parse_options()?;

    let doc = req.driver(
        ctx.engine()
            .find_one_and_update(&ns, filter, update, options)
            .await,
    )?;
    found(ctx, req, doc).await
}

async fn found(ctx: &Context, req: &Request<'_>, doc: Option<Document>) -> Result<GenericDocument> {
    let encoding = req.encoding(ctx.default_encoding().await);
    Ok(respond(json!({ "doc": encode_optional(doc.as_ref(), encoding)? })))
}
