//! Update operators and replacement documents for the in-memory engine.

use crate::error::{DriverFault, DriverResult};
use crate::matcher::{bad_value, get_path};
use bson::{Bson, Document};

const FAILED_TO_PARSE: i32 = 9;
const TYPE_MISMATCH: i32 = 14;
const PATH_NOT_VIABLE: i32 = 28;
const IMMUTABLE_FIELD: i32 = 66;

/// Most null elements a positional `$set` may append to reach its index.
const MAX_ARRAY_PADDING: usize = 1_500_000;

const OPERATORS: &[&str] = &["$set", "$unset", "$inc", "$push", "$setOnInsert"];

/// Whether `update` is an operator document rather than a replacement.
pub fn is_operator_update(update: &Document) -> bool {
    update.keys().next().map_or(false, |k| k.starts_with('$'))
}

/// Check that `update` is a non-empty document of supported operators.
pub fn validate_update(update: &Document) -> DriverResult<()> {
    if update.is_empty() || !is_operator_update(update) {
        return Err(DriverFault::with_code(
            FAILED_TO_PARSE,
            "update document requires atomic operators",
        ));
    }
    for (op, args) in update {
        if !OPERATORS.contains(&op.as_str()) {
            return Err(DriverFault::with_code(
                FAILED_TO_PARSE,
                format!("Unknown modifier: {op}"),
            ));
        }
        if !matches!(args, Bson::Document(_)) {
            return Err(DriverFault::with_code(
                FAILED_TO_PARSE,
                format!("Modifiers operate on fields but we found another type instead for {op}"),
            ));
        }
    }
    Ok(())
}

/// Apply a validated operator document to `doc`.
///
/// `inserting` enables `$setOnInsert`, which is only applied to upserts.
pub fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> DriverResult<()> {
    validate_update(update)?;
    let original_id = doc.get("_id").cloned();

    for (op, args) in update {
        let Bson::Document(fields) = args else {
            continue;
        };
        for (path, value) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, value.clone())?,
                "$setOnInsert" if inserting => set_path(doc, path, value.clone())?,
                "$unset" => {
                    unset_path(doc, path);
                }
                "$inc" => increment(doc, path, value)?,
                "$push" => push(doc, path, value)?,
                _ => {}
            }
        }
    }

    if original_id.is_some() && doc.get("_id") != original_id.as_ref() {
        return Err(immutable_id());
    }
    Ok(())
}

/// Build the document that replaces one with `original_id`.
///
/// The stored `_id` is kept and placed first.
pub fn replace_document(original_id: Option<&Bson>, replacement: &Document) -> DriverResult<Document> {
    if replacement.keys().any(|k| k.starts_with('$')) {
        return Err(bad_value("replacement document must not contain update operators"));
    }

    let mut doc = Document::new();
    match (original_id, replacement.get("_id")) {
        (Some(id), Some(new_id)) if id != new_id => return Err(immutable_id()),
        (Some(id), _) => {
            doc.insert("_id", id.clone());
        }
        (None, Some(new_id)) => {
            doc.insert("_id", new_id.clone());
        }
        (None, None) => {}
    }
    for (key, value) in replacement {
        if key != "_id" {
            doc.insert(key.clone(), value.clone());
        }
    }
    Ok(doc)
}

fn immutable_id() -> DriverFault {
    DriverFault::with_code(
        IMMUTABLE_FIELD,
        "Performing an update on the path '_id' would modify the immutable field '_id'",
    )
}

fn not_viable(segment: &str) -> DriverFault {
    DriverFault::with_code(
        PATH_NOT_VIABLE,
        format!("Cannot create field '{segment}' in a non-document element"),
    )
}

/// Set the value at a dotted path, creating intermediate documents.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) -> DriverResult<()> {
    let Some((head, rest)) = path.split_once('.') else {
        doc.insert(path, value);
        return Ok(());
    };

    if matches!(doc.get(head), None | Some(Bson::Null)) {
        doc.insert(head, Document::new());
    }
    match doc.get_mut(head) {
        Some(Bson::Document(child)) => set_path(child, rest, value),
        Some(Bson::Array(items)) => set_in_array(items, rest, value),
        _ => Err(not_viable(rest)),
    }
}

fn set_in_array(items: &mut Vec<Bson>, path: &str, value: Bson) -> DriverResult<()> {
    let (index, rest) = match path.split_once('.') {
        Some((index, rest)) => (index, Some(rest)),
        None => (path, None),
    };
    let index: usize = index.parse().map_err(|_| not_viable(index))?;
    if index >= items.len() {
        if index - items.len() > MAX_ARRAY_PADDING {
            return Err(bad_value(format!(
                "can't backfill more than {MAX_ARRAY_PADDING} elements"
            )));
        }
        items.resize(index + 1, Bson::Null);
    }

    match rest {
        None => {
            items[index] = value;
            Ok(())
        }
        Some(rest) => {
            if matches!(items[index], Bson::Null) {
                items[index] = Bson::Document(Document::new());
            }
            match &mut items[index] {
                Bson::Document(child) => set_path(child, rest, value),
                _ => Err(not_viable(rest)),
            }
        }
    }
}

/// Remove the value at a dotted path. Returns whether anything was removed.
///
/// Array elements are set to null rather than removed.
pub fn unset_path(doc: &mut Document, path: &str) -> bool {
    let Some((head, rest)) = path.split_once('.') else {
        return doc.remove(path).is_some();
    };

    match doc.get_mut(head) {
        Some(Bson::Document(child)) => unset_path(child, rest),
        Some(Bson::Array(items)) => {
            let (index, rest) = match rest.split_once('.') {
                Some((index, rest)) => (index, Some(rest)),
                None => (rest, None),
            };
            let Ok(index) = index.parse::<usize>() else {
                return false;
            };
            match (rest, items.get_mut(index)) {
                (None, Some(item)) => {
                    *item = Bson::Null;
                    true
                }
                (Some(rest), Some(Bson::Document(child))) => unset_path(child, rest),
                _ => false,
            }
        }
        _ => false,
    }
}

fn increment(doc: &mut Document, path: &str, by: &Bson) -> DriverResult<()> {
    if !is_number(by) {
        return Err(DriverFault::with_code(
            TYPE_MISMATCH,
            format!("Cannot increment with non-numeric argument: {{{path}: {by}}}"),
        ));
    }

    let next = match get_path(doc, path) {
        None => by.clone(),
        Some(current) if is_number(current) => add_numbers(current, by),
        Some(current) => {
            return Err(DriverFault::with_code(
                TYPE_MISMATCH,
                format!(
                    "Cannot apply $inc to a value of non-numeric type: field '{path}' is {:?}",
                    current.element_type()
                ),
            ));
        }
    };
    set_path(doc, path, next)
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn add_numbers(a: &Bson, b: &Bson) -> Bson {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x
            .checked_add(*y)
            .map_or(Bson::Int64(i64::from(*x) + i64::from(*y)), Bson::Int32),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let x = as_i64(a);
            let y = as_i64(b);
            x.checked_add(y)
                .map_or(Bson::Double(x as f64 + y as f64), Bson::Int64)
        }
        _ => Bson::Double(as_f64(a) + as_f64(b)),
    }
}

fn as_i64(value: &Bson) -> i64 {
    match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) => *n as i64,
        _ => 0,
    }
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(n) => f64::from(*n),
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        _ => 0.0,
    }
}

fn push(doc: &mut Document, path: &str, value: &Bson) -> DriverResult<()> {
    let additions = match value {
        Bson::Document(spec) if spec.contains_key("$each") => match spec.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => return Err(bad_value("The argument to $each in $push must be an array")),
        },
        other => vec![other.clone()],
    };

    let next = match get_path(doc, path) {
        None => additions,
        Some(Bson::Array(existing)) => {
            let mut items = existing.clone();
            items.extend(additions);
            items
        }
        Some(other) => {
            return Err(bad_value(format!(
                "The field '{path}' must be an array but is of type {:?}",
                other.element_type()
            )));
        }
    };
    set_path(doc, path, Bson::Array(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn updated(mut doc: Document, update: Document) -> DriverResult<Document> {
        apply_update(&mut doc, &update, false)?;
        Ok(doc)
    }

    #[test]
    fn test_set_and_unset() {
        let doc = updated(
            doc! { "_id": 1, "name": "John", "age": 30 },
            doc! { "$set": { "name": "Jane", "address.city": "Provo" }, "$unset": { "age": "" } },
        )
        .unwrap();
        assert_eq!(doc, doc! { "_id": 1, "name": "Jane", "address": { "city": "Provo" } });
    }

    #[test]
    fn test_set_array_index_pads_with_null() {
        let doc = updated(doc! { "a": [1] }, doc! { "$set": { "a.3": 4 } }).unwrap();
        assert_eq!(doc, doc! { "a": [1, Bson::Null, Bson::Null, 4] });
    }

    #[test]
    fn test_set_far_array_index_rejected() {
        let err = updated(doc! { "a": [] }, doc! { "$set": { "a.3000000": 1 } }).unwrap_err();
        assert_eq!(err.code, Some(2));
        assert!(err.message.contains("backfill"));
    }

    #[test]
    fn test_inc() {
        let doc = updated(doc! { "a": 1, "b": 1.5 }, doc! { "$inc": { "a": 2, "b": 1, "c": 5 } }).unwrap();
        assert_eq!(doc, doc! { "a": 3, "b": 2.5, "c": 5 });

        let doc = updated(doc! { "a": i32::MAX }, doc! { "$inc": { "a": 1 } }).unwrap();
        assert_eq!(doc.get("a"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
    }

    #[test]
    fn test_inc_non_numeric() {
        let err = updated(doc! { "a": "x" }, doc! { "$inc": { "a": 1 } }).unwrap_err();
        assert_eq!(err.code, Some(TYPE_MISMATCH));
        let err = updated(doc! { "a": 1 }, doc! { "$inc": { "a": "1" } }).unwrap_err();
        assert_eq!(err.code, Some(TYPE_MISMATCH));
    }

    #[test]
    fn test_push() {
        let doc = updated(doc! { "tags": ["a"] }, doc! { "$push": { "tags": "b" } }).unwrap();
        assert_eq!(doc, doc! { "tags": ["a", "b"] });

        let doc = updated(doc! {}, doc! { "$push": { "tags": { "$each": ["x", "y"] } } }).unwrap();
        assert_eq!(doc, doc! { "tags": ["x", "y"] });

        assert!(updated(doc! { "tags": 1 }, doc! { "$push": { "tags": "b" } }).is_err());
    }

    #[test]
    fn test_set_on_insert() {
        let update = doc! { "$setOnInsert": { "created": true }, "$set": { "n": 1 } };

        let doc = updated(doc! {}, update.clone()).unwrap();
        assert_eq!(doc, doc! { "n": 1 });

        let mut doc = doc! {};
        apply_update(&mut doc, &update, true).unwrap();
        assert_eq!(doc, doc! { "created": true, "n": 1 });
    }

    #[test]
    fn test_id_is_immutable() {
        let err = updated(doc! { "_id": 1 }, doc! { "$set": { "_id": 2 } }).unwrap_err();
        assert_eq!(err.code, Some(IMMUTABLE_FIELD));
    }

    #[test]
    fn test_invalid_updates() {
        assert!(validate_update(&doc! {}).is_err());
        assert!(validate_update(&doc! { "name": "x" }).is_err());
        assert!(validate_update(&doc! { "$rename": { "a": "b" } }).is_err());
        assert!(validate_update(&doc! { "$set": 1 }).is_err());
        assert!(validate_update(&doc! { "$set": { "a": 1 } }).is_ok());
    }

    #[test]
    fn test_replace_keeps_id() {
        let doc = replace_document(Some(&Bson::Int32(7)), &doc! { "name": "x" }).unwrap();
        assert_eq!(doc, doc! { "_id": 7, "name": "x" });

        let doc = replace_document(Some(&Bson::Int32(7)), &doc! { "name": "x", "_id": 7 }).unwrap();
        assert_eq!(doc, doc! { "_id": 7, "name": "x" });

        assert!(replace_document(Some(&Bson::Int32(7)), &doc! { "_id": 8 }).is_err());
        assert!(replace_document(None, &doc! { "$set": { "a": 1 } }).is_err());
    }

    #[test]
    fn test_set_path_into_arrays() {
        let mut doc = doc! { "items": [{ "n": 1 }] };
        set_path(&mut doc, "items.0.n", Bson::Int32(5)).unwrap();
        set_path(&mut doc, "items.2", Bson::Int32(9)).unwrap();
        assert_eq!(doc, doc! { "items": [{ "n": 5 }, null, 9] });

        let mut doc = doc! { "a": 1 };
        let err = set_path(&mut doc, "a.b", Bson::Int32(1)).unwrap_err();
        assert_eq!(err.code, Some(PATH_NOT_VIABLE));
    }

    #[test]
    fn test_unset_path() {
        let mut doc = doc! { "a": { "b": 1, "c": 2 }, "list": [1, 2] };
        assert!(unset_path(&mut doc, "a.b"));
        assert!(unset_path(&mut doc, "list.0"));
        assert!(!unset_path(&mut doc, "missing.x"));
        assert_eq!(doc, doc! { "a": { "c": 2 }, "list": [null, 2] });
    }
}
