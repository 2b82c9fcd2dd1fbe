//! Database and collection management.

use super::{encode_all, respond, Request};
use crate::bridge::Context;
use crate::document::{from_document, GenericDocument};
use crate::error::Result;
use crate::options::CreateCollectionOptions;
use serde_json::json;

/// `listDatabases` → `{databases}`.
pub async fn list_databases(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let encoding = req.encoding(ctx.default_encoding().await);
    let databases = req.driver(ctx.engine().list_databases().await)?;
    Ok(respond(json!({ "databases": encode_all(&databases, encoding)? })))
}

/// `dropDatabase` → `{dropped}`.
pub async fn drop_database(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let db = req.db()?;
    let dropped = req.driver(ctx.engine().drop_database(&db).await)?;
    Ok(respond(json!({ "dropped": dropped })))
}

/// `listCollections` → `{collections}`.
pub async fn list_collections(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let db = req.db()?;
    let encoding = req.encoding(ctx.default_encoding().await);
    let collections = req.driver(ctx.engine().list_collections(&db).await)?;
    Ok(respond(json!({ "collections": encode_all(&collections, encoding)? })))
}

/// `createCollection` → `{collection}`.
pub async fn create_collection(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let options: CreateCollectionOptions = req.parse_options()?;
    req.driver(ctx.engine().create_collection(&ns, options).await)?;
    Ok(respond(json!({ "collection": ns.collection })))
}

/// `dropCollection` → `{dropped}`.
pub async fn drop_collection(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let dropped = req.driver(ctx.engine().drop_collection(&ns).await)?;
    Ok(respond(json!({ "dropped": dropped })))
}

/// `runCommand` → `{reply}`.
pub async fn run_command(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let db = req.db()?;
    let command = req.document("command")?;
    let encoding = req.encoding(ctx.default_encoding().await);
    let reply = req.driver(ctx.engine().run_command(&db, command).await)?;
    Ok(respond(json!({ "reply": from_document(&reply, encoding)? })))
}
