//! Index management.

use super::{encode_all, respond, Request};
use crate::bridge::Context;
use crate::document::{to_document, GenericDocument};
use crate::engine::IndexSelector;
use crate::error::{BridgeError, Result};
use crate::options::IndexModel;
use crate::parser::parse_index_model;
use serde_json::{json, Value as JsonValue};

const INDEXES_SHAPE: &str =
    "indexes must be Array<[keys: Document, options?: IndexOptions]> with length >= 1";

/// `createIndexes` → `{indexesCreated}`.
///
/// `indexes` is a non-empty array of `[keys]` or `[keys, options]` pairs.
pub async fn create_indexes(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let models = index_models(req.get("indexes"))?;

    let names = req.driver(ctx.engine().create_indexes(&ns, models).await)?;
    Ok(respond(json!({ "indexesCreated": names })))
}

fn index_models(value: Option<&JsonValue>) -> Result<Vec<IndexModel>> {
    let definitions = match value {
        Some(JsonValue::Array(items)) if !items.is_empty() => items,
        _ => return Err(BridgeError::invalid_argument(INDEXES_SHAPE)),
    };

    definitions
        .iter()
        .enumerate()
        .map(|(i, definition)| {
            let shape_error = || {
                BridgeError::invalid_argument(format!(
                    "indexes[{i}] must be [keys: Document, options?: IndexOptions] (as a 1 or 2 element array)"
                ))
            };
            let parts = match definition {
                JsonValue::Array(parts) if (1..=2).contains(&parts.len()) => parts,
                _ => return Err(shape_error()),
            };
            let keys = parts[0].as_object().ok_or_else(shape_error)?;
            let options = match parts.get(1) {
                None | Some(JsonValue::Null) => None,
                Some(JsonValue::Object(options)) => Some(options),
                Some(_) => return Err(shape_error()),
            };
            Ok(parse_index_model(keys, options)?)
        })
        .collect()
}

/// `dropIndex` → `{done}`. The index is named by `name` or by `keys`.
pub async fn drop_index(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let selector = match (req.get("name"), req.get("keys")) {
        (Some(JsonValue::String(name)), _) => IndexSelector::Name(name.clone()),
        (_, Some(JsonValue::Object(keys))) => {
            let keys = to_document(keys).map_err(|source| BridgeError::Convert {
                key: "keys".to_string(),
                source,
            })?;
            IndexSelector::Keys(keys)
        }
        _ => {
            return Err(BridgeError::invalid_argument(
                "name: string or keys: {[keyName: string]: 1|-1} expected",
            ))
        }
    };

    req.driver(ctx.engine().drop_index(&ns, selector).await)?;
    Ok(respond(json!({ "done": true })))
}

/// `listIndexes` → `{results}`.
pub async fn list_indexes(ctx: &Context, req: &Request<'_>) -> Result<GenericDocument> {
    let ns = req.namespace()?;
    let encoding = req.encoding(ctx.default_encoding().await);
    let indexes = req.driver(ctx.engine().list_indexes(&ns).await)?;
    Ok(respond(json!({ "results": encode_all(&indexes, encoding)? })))
}
