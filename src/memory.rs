//! In-process reference engine.
//!
//! Stores documents in insertion order per collection behind a single
//! `RwLock`. It understands the query, update and aggregation subset
//! implemented in [`crate::matcher`] and [`crate::update`]; collation, array
//! filters and time limits are accepted and ignored.

use crate::cursor::{BufferedCursor, ResultCursor};
use crate::engine::*;
use crate::error::{DriverFault, DriverResult};
use crate::matcher::{bad_value, values_at, values_equal, Expression, Projection, SortSpec};
use crate::options::*;
use crate::update::{apply_update, is_operator_update, replace_document, validate_update};
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;
const NAMESPACE_EXISTS: i32 = 48;
const COMMAND_NOT_FOUND: i32 = 59;
const CANNOT_CREATE_INDEX: i32 = 67;
const INVALID_OPTIONS: i32 = 72;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
const OBJECT_TOO_LARGE: i32 = 10334;
const STAGE_FIELD_COUNT: i32 = 40323;
const UNRECOGNIZED_STAGE: i32 = 40324;

/// Engine error code for a unique index violation.
pub const DUPLICATE_KEY: i32 = 11000;

/// Largest stored document, in encoded BSON bytes.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// The `_id` index every collection has.
const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone)]
struct IndexSpec {
    name: String,
    keys: Document,
    unique: bool,
    sparse: bool,
}

impl IndexSpec {
    fn id_index() -> Self {
        Self {
            name: ID_INDEX.to_string(),
            keys: doc! { "_id": 1 },
            unique: true,
            sparse: false,
        }
    }

    /// Key values of `doc`, or `None` when a sparse index skips it.
    fn key_of(&self, doc: &Document) -> Option<Vec<Bson>> {
        let values: Vec<Option<Bson>> = self
            .keys
            .keys()
            .map(|path| values_at(doc, path).first().map(|v| (*v).clone()))
            .collect();
        if self.sparse && values.iter().all(Option::is_none) {
            return None;
        }
        Some(values.into_iter().map(|v| v.unwrap_or(Bson::Null)).collect())
    }

    fn describe(&self) -> Document {
        let mut out = doc! { "v": 2, "key": self.keys.clone(), "name": self.name.clone() };
        if self.unique && self.name != ID_INDEX {
            out.insert("unique", true);
        }
        if self.sparse {
            out.insert("sparse", true);
        }
        out
    }
}

fn same_key(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Default index name: `field_direction` pairs joined by underscores.
pub fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::Int32(n) => n.to_string(),
                Bson::Int64(n) => n.to_string(),
                Bson::Double(n) => n.to_string(),
                Bson::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{field}_{direction}")
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// A modification applied to matched documents.
#[derive(Clone, Copy)]
enum Change<'a> {
    Operators(&'a Document),
    Replacement(&'a Document),
}

impl Change<'_> {
    fn validate(&self) -> DriverResult<()> {
        match self {
            Change::Operators(update) => validate_update(update),
            Change::Replacement(replacement) if is_operator_update(replacement) => Err(bad_value(
                "replacement document must not contain update operators",
            )),
            Change::Replacement(_) => Ok(()),
        }
    }

    fn apply(&self, doc: &Document, inserting: bool) -> DriverResult<Document> {
        match self {
            Change::Operators(update) => {
                let mut next = doc.clone();
                apply_update(&mut next, update, inserting)?;
                Ok(next)
            }
            Change::Replacement(replacement) => replace_document(doc.get("_id"), replacement),
        }
    }
}

/// Everything an update, replace or find-and-modify needs.
struct Modify<'a> {
    filter: &'a Document,
    change: Change<'a>,
    multi: bool,
    upsert: bool,
    sort: Option<&'a Document>,
    bypass: Option<bool>,
}

impl<'a> Modify<'a> {
    fn new(filter: &'a Document, change: Change<'a>) -> Self {
        Self {
            filter,
            change,
            multi: false,
            upsert: false,
            sort: None,
            bypass: None,
        }
    }

    fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    fn upsert(mut self, upsert: Option<bool>) -> Self {
        self.upsert = upsert.unwrap_or(false);
        self
    }

    fn sort(mut self, sort: Option<&'a Document>) -> Self {
        self.sort = sort;
        self
    }

    fn bypass(mut self, bypass: Option<bool>) -> Self {
        self.bypass = bypass;
        self
    }
}

#[derive(Debug, Default)]
struct UpdateOutcome {
    matched: u64,
    modified: u64,
    upserted_id: Option<Bson>,
    before: Option<Document>,
    after: Option<Document>,
}

#[derive(Debug, Clone)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
    capped: bool,
    max: Option<usize>,
    validation: ValidationOptions,
}

impl Default for CollectionData {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexSpec::id_index()],
            capped: false,
            max: None,
            validation: ValidationOptions::default(),
        }
    }
}

impl CollectionData {
    fn with_options(options: &CreateCollectionOptions) -> Self {
        Self {
            capped: options.capped.unwrap_or(false),
            max: options
                .max
                .and_then(|max| usize::try_from(max).ok())
                .filter(|max| *max > 0),
            validation: options.validation.clone(),
            ..Self::default()
        }
    }

    fn describe(&self, name: &str) -> Document {
        let mut options = Document::new();
        if self.capped {
            options.insert("capped", true);
        }
        if let Some(max) = self.max {
            options.insert("max", max as i64);
        }
        if let Some(validator) = &self.validation.validator {
            options.insert("validator", validator.clone());
        }
        doc! { "name": name, "type": "collection", "options": options }
    }

    /// Positions of matching documents, ordered by `sort` when given.
    fn select(&self, filter: &Expression, sort: Option<&Document>) -> DriverResult<Vec<usize>> {
        let mut positions: Vec<usize> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(i, _)| i)
            .collect();
        if let Some(sort) = sort {
            let spec = SortSpec::parse(sort)?;
            positions.sort_by(|a, b| spec.compare(&self.documents[*a], &self.documents[*b]));
        }
        Ok(positions)
    }

    fn validate(
        &self,
        doc: &Document,
        previous: Option<&Document>,
        bypass: Option<bool>,
    ) -> DriverResult<()> {
        let Some(validator) = &self.validation.validator else {
            return Ok(());
        };
        let level = self.validation.validation_level;
        if bypass == Some(true) || level == Some(ValidationLevel::Off) {
            return Ok(());
        }

        let expression = Expression::parse(validator)?;
        if level == Some(ValidationLevel::Moderate) {
            if let Some(previous) = previous {
                if !expression.matches(previous) {
                    return Ok(());
                }
            }
        }
        if expression.matches(doc) {
            return Ok(());
        }
        if self.validation.validation_action == Some(ValidationAction::Warn) {
            debug!("document failed validation; accepted with warn action");
            return Ok(());
        }
        Err(DriverFault::with_code(
            DOCUMENT_VALIDATION_FAILURE,
            "Document failed validation",
        ))
    }

    fn check_unique(
        &self,
        ns: &Namespace,
        doc: &Document,
        skip: Option<usize>,
    ) -> DriverResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let Some(key) = index.key_of(doc) else {
                continue;
            };
            let duplicate = self
                .documents
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .filter_map(|(_, other)| index.key_of(other))
                .any(|other| same_key(&other, &key));
            if duplicate {
                let shown: Document = index
                    .keys
                    .keys()
                    .zip(&key)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                return Err(DriverFault::with_code(
                    DUPLICATE_KEY,
                    format!(
                        "E11000 duplicate key error collection: {ns} index: {} dup key: {shown}",
                        index.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn insert(
        &mut self,
        ns: &Namespace,
        doc: Document,
        bypass: Option<bool>,
    ) -> DriverResult<Bson> {
        let doc = with_id(doc);
        check_size(&doc)?;
        self.validate(&doc, None, bypass)?;
        self.check_unique(ns, &doc, None)?;

        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        self.documents.push(doc);

        if self.capped {
            if let Some(max) = self.max {
                while self.documents.len() > max {
                    self.documents.remove(0);
                }
            }
        }
        Ok(id)
    }

    /// Overwrite the document at `position`. Returns false if nothing changed.
    fn store(
        &mut self,
        ns: &Namespace,
        position: usize,
        doc: Document,
        bypass: Option<bool>,
    ) -> DriverResult<bool> {
        let previous = &self.documents[position];
        if *previous == doc {
            return Ok(false);
        }
        check_size(&doc)?;
        self.validate(&doc, Some(previous), bypass)?;
        self.check_unique(ns, &doc, Some(position))?;
        self.documents[position] = doc;
        Ok(true)
    }

    fn modify(&mut self, ns: &Namespace, request: Modify<'_>) -> DriverResult<UpdateOutcome> {
        request.change.validate()?;
        let expression = Expression::parse(request.filter)?;
        let mut positions = self.select(&expression, request.sort)?;
        if !request.multi {
            positions.truncate(1);
        }

        let mut outcome = UpdateOutcome::default();
        for position in positions {
            let before = self.documents[position].clone();
            let after = request.change.apply(&before, false)?;
            outcome.matched += 1;
            if self.store(ns, position, after.clone(), request.bypass)? {
                outcome.modified += 1;
            }
            outcome.before.get_or_insert(before);
            outcome.after.get_or_insert(after);
        }

        if outcome.matched == 0 && request.upsert {
            let seed = expression.equality_seed();
            let doc = with_id(request.change.apply(&seed, true)?);
            let id = self.insert(ns, doc.clone(), request.bypass)?;
            outcome.upserted_id = Some(id);
            outcome.after = Some(doc);
        }
        Ok(outcome)
    }

    fn delete(
        &mut self,
        filter: &Document,
        multi: bool,
        sort: Option<&Document>,
    ) -> DriverResult<Vec<Document>> {
        let expression = Expression::parse(filter)?;
        let mut positions = self.select(&expression, sort)?;
        if !multi {
            positions.truncate(1);
        }
        // Remove from the back so earlier positions stay valid.
        let mut ordered = positions.clone();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        let mut removed: BTreeMap<usize, Document> = BTreeMap::new();
        for position in ordered {
            removed.insert(position, self.documents.remove(position));
        }
        Ok(positions
            .into_iter()
            .filter_map(|p| removed.remove(&p))
            .collect())
    }

    fn create_index(&mut self, ns: &Namespace, model: IndexModel) -> DriverResult<String> {
        if model.keys.is_empty() {
            return Err(DriverFault::with_code(
                CANNOT_CREATE_INDEX,
                "Index keys cannot be empty",
            ));
        }
        let options = model.options.unwrap_or_default();
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| default_index_name(&model.keys));

        if let Some(existing) = self.indexes.iter().find(|i| i.name == name) {
            if existing.keys == model.keys {
                return Ok(name);
            }
            return Err(DriverFault::with_code(
                INDEX_KEY_SPECS_CONFLICT,
                format!("Index with name: {name} already exists with a different key pattern"),
            ));
        }

        let index = IndexSpec {
            name: name.clone(),
            keys: model.keys,
            unique: options.unique.unwrap_or(false),
            sparse: options.sparse.unwrap_or(false),
        };
        if index.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for doc in &self.documents {
                let Some(key) = index.key_of(doc) else {
                    continue;
                };
                if seen.iter().any(|other| same_key(other, &key)) {
                    return Err(DriverFault::with_code(
                        DUPLICATE_KEY,
                        format!("E11000 duplicate key error collection: {ns} index: {name}"),
                    ));
                }
                seen.push(key);
            }
        }
        self.indexes.push(index);
        Ok(name)
    }

    fn write_one(
        &mut self,
        ns: &Namespace,
        index: usize,
        model: &WriteModel,
        bypass: Option<bool>,
        result: &mut BulkWriteResult,
    ) -> DriverResult<()> {
        let outcome = match model {
            WriteModel::InsertOne { document } => {
                let id = self.insert(ns, document.clone(), bypass)?;
                result.inserted_count += 1;
                result.inserted_ids.insert(index, id);
                return Ok(());
            }
            WriteModel::DeleteOne { filter, .. } => {
                result.deleted_count += self.delete(filter, false, None)?.len() as u64;
                return Ok(());
            }
            WriteModel::DeleteMany { filter, .. } => {
                result.deleted_count += self.delete(filter, true, None)?.len() as u64;
                return Ok(());
            }
            WriteModel::ReplaceOne {
                filter,
                replacement,
                options,
            } => {
                let request = Modify::new(filter, Change::Replacement(replacement))
                    .upsert(options.upsert)
                    .bypass(bypass);
                self.modify(ns, request)?
            }
            WriteModel::UpdateOne {
                filter,
                update,
                options,
            }
            | WriteModel::UpdateMany {
                filter,
                update,
                options,
            } => {
                let request = Modify::new(filter, Change::Operators(update))
                    .multi(matches!(model, WriteModel::UpdateMany { .. }))
                    .upsert(options.upsert)
                    .bypass(bypass);
                self.modify(ns, request)?
            }
        };

        result.matched_count += outcome.matched;
        result.modified_count += outcome.modified;
        if let Some(id) = outcome.upserted_id {
            result.upserted_ids.insert(index, id);
        }
        Ok(())
    }
}

/// Put an `_id` first in `doc`, generating one if missing.
fn check_size(doc: &Document) -> DriverResult<()> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes)
        .map_err(|e| DriverFault::new(format!("could not encode document: {e}")))?;
    if bytes.len() > MAX_DOCUMENT_SIZE {
        return Err(DriverFault::with_code(
            OBJECT_TOO_LARGE,
            format!(
                "document too large: {} bytes, max size: {MAX_DOCUMENT_SIZE}",
                bytes.len()
            ),
        ));
    }
    Ok(())
}

fn with_id(doc: Document) -> Document {
    if doc.keys().next().map(String::as_str) == Some("_id") {
        return doc;
    }
    let id = doc
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    let mut out = doc! { "_id": id };
    for (key, value) in doc {
        if key != "_id" {
            out.insert(key, value);
        }
    }
    out
}

fn as_count(value: &Bson, stage: &str) -> DriverResult<i64> {
    match value {
        Bson::Int32(n) => Ok(i64::from(*n)),
        Bson::Int64(n) => Ok(*n),
        Bson::Double(n) if n.fract() == 0.0 => Ok(*n as i64),
        _ => Err(bad_value(format!("{stage} requires an integer argument"))),
    }
}

fn window(
    docs: Vec<Document>,
    skip: Option<i64>,
    limit: Option<i64>,
) -> DriverResult<Vec<Document>> {
    let skip = match skip {
        Some(n) if n < 0 => return Err(bad_value("skip value must be non-negative")),
        Some(n) => n as usize,
        None => 0,
    };
    let iter = docs.into_iter().skip(skip);
    // A negative limit behaves like its absolute value; zero means none.
    Ok(match limit.map(i64::unsigned_abs) {
        Some(n) if n > 0 => iter.take(n as usize).collect(),
        _ => iter.collect(),
    })
}

fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> DriverResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = match stage.iter().next() {
            Some(entry) if stage.len() == 1 => entry,
            _ => {
                return Err(DriverFault::with_code(
                    STAGE_FIELD_COUNT,
                    "A pipeline stage specification object must contain exactly one field.",
                ))
            }
        };
        docs = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => {
                let expression = Expression::parse(filter)?;
                docs.into_iter().filter(|d| expression.matches(d)).collect()
            }
            ("$sort", Bson::Document(sort)) => {
                SortSpec::parse(sort)?.sort(&mut docs);
                docs
            }
            ("$skip", n) => window(docs, Some(as_count(n, "$skip")?), None)?,
            ("$limit", n) => match as_count(n, "$limit")? {
                n if n > 0 => window(docs, None, Some(n))?,
                _ => return Err(bad_value("the limit must be positive")),
            },
            ("$project", Bson::Document(spec)) => {
                let projection = Projection::parse(spec)?;
                docs.iter().map(|d| projection.apply(d)).collect()
            }
            ("$count", Bson::String(field)) if !field.is_empty() && !field.starts_with('$') => {
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.clone(), docs.len() as i32);
                    vec![out]
                }
            }
            ("$match" | "$sort" | "$project" | "$count", _) => {
                return Err(bad_value(format!("invalid argument to {name} stage")));
            }
            (other, _) => {
                return Err(DriverFault::with_code(
                    UNRECOGNIZED_STAGE,
                    format!("Unrecognized pipeline stage name: '{other}'"),
                ));
            }
        };
    }
    Ok(docs)
}

fn query(
    collection: &CollectionData,
    filter: &Document,
    options: &FindOptions,
) -> DriverResult<Vec<Document>> {
    if let Some(hint) = &options.hint {
        let known = collection.indexes.iter().any(|index| match hint {
            Hint::Name(name) => &index.name == name,
            Hint::Keys(keys) => &index.keys == keys,
        });
        if !known {
            return Err(bad_value(
                "hint provided does not correspond to an existing index",
            ));
        }
    }

    let expression = Expression::parse(filter)?;
    let docs = collection
        .select(&expression, options.sort.as_ref())?
        .into_iter()
        .map(|p| collection.documents[p].clone())
        .collect();
    let docs = window(
        docs,
        options.skip.map(i64::from),
        options.limit.map(i64::from),
    )?;

    match &options.projection {
        Some(spec) => {
            let projection = Projection::parse(spec)?;
            Ok(docs.iter().map(|d| projection.apply(d)).collect())
        }
        None => Ok(docs),
    }
}

fn update_result(ns: &Namespace, outcome: UpdateOutcome) -> UpdateResult {
    UpdateResult {
        matched_count: outcome.matched,
        modified_count: outcome.modified,
        upserted_id: outcome.upserted_id,
        acknowledged: ns.is_acknowledged(),
    }
}

fn delete_result(ns: &Namespace, removed: Option<Vec<Document>>) -> DeleteResult {
    DeleteResult {
        deleted_count: removed.map_or(0, |docs| docs.len() as u64),
        acknowledged: ns.is_acknowledged(),
    }
}

fn project_one(
    doc: Option<Document>,
    projection: Option<&Document>,
) -> DriverResult<Option<Document>> {
    match (doc, projection) {
        (Some(doc), Some(spec)) => Ok(Some(Projection::parse(spec)?.apply(&doc))),
        (doc, _) => Ok(doc),
    }
}

fn pick(
    outcome: UpdateOutcome,
    return_document: Option<ReturnDocument>,
    projection: Option<&Document>,
) -> DriverResult<Option<Document>> {
    let doc = match return_document.unwrap_or_default() {
        ReturnDocument::Before => outcome.before,
        ReturnDocument::After => outcome.after,
    };
    project_one(doc, projection)
}

type Databases = BTreeMap<String, BTreeMap<String, CollectionData>>;

/// In-process engine holding every database in memory.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    databases: RwLock<Databases>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the collection. `None` if it does not exist.
    async fn read<R>(
        &self,
        ns: &Namespace,
        f: impl FnOnce(&CollectionData) -> DriverResult<R>,
    ) -> DriverResult<Option<R>> {
        let databases = self.databases.read().await;
        match databases.get(&ns.db).and_then(|db| db.get(&ns.collection)) {
            Some(collection) => f(collection).map(Some),
            None => Ok(None),
        }
    }

    /// Run `f` on the collection, creating it if it does not exist.
    async fn write<R>(
        &self,
        ns: &Namespace,
        f: impl FnOnce(&mut CollectionData) -> DriverResult<R>,
    ) -> DriverResult<R> {
        let mut databases = self.databases.write().await;
        let collection = databases
            .entry(ns.db.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default();
        f(collection)
    }

    /// Run `f` on an existing collection. `None` if it does not exist.
    async fn write_existing<R>(
        &self,
        ns: &Namespace,
        f: impl FnOnce(&mut CollectionData) -> DriverResult<R>,
    ) -> DriverResult<Option<R>> {
        let mut databases = self.databases.write().await;
        match databases
            .get_mut(&ns.db)
            .and_then(|db| db.get_mut(&ns.collection))
        {
            Some(collection) => f(collection).map(Some),
            None => Ok(None),
        }
    }

    async fn select(
        &self,
        ns: &Namespace,
        filter: &Document,
        options: &FindOptions,
    ) -> DriverResult<Vec<Document>> {
        match self.read(ns, |c| query(c, filter, options)).await? {
            Some(docs) => Ok(docs),
            None => {
                // A missing collection is empty, but the filter must still be valid.
                Expression::parse(filter)?;
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn list_databases(&self) -> DriverResult<Vec<Document>> {
        let databases = self.databases.read().await;
        Ok(databases
            .iter()
            .map(|(name, collections)| {
                let documents: usize = collections.values().map(|c| c.documents.len()).sum();
                doc! {
                    "name": name.clone(),
                    "sizeOnDisk": documents as i64,
                    "empty": (documents == 0),
                }
            })
            .collect())
    }

    async fn drop_database(&self, db: &str) -> DriverResult<bool> {
        Ok(self.databases.write().await.remove(db).is_some())
    }

    async fn list_collections(&self, db: &str) -> DriverResult<Vec<Document>> {
        let databases = self.databases.read().await;
        Ok(databases
            .get(db)
            .map(|collections| {
                collections
                    .iter()
                    .map(|(name, data)| data.describe(name))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_collection(
        &self,
        ns: &Namespace,
        options: CreateCollectionOptions,
    ) -> DriverResult<()> {
        if let Some(validator) = &options.validation.validator {
            Expression::parse(validator)?;
        }
        let mut databases = self.databases.write().await;
        let collections = databases.entry(ns.db.clone()).or_default();
        if collections.contains_key(&ns.collection) {
            return Err(DriverFault::with_code(
                NAMESPACE_EXISTS,
                format!("Collection already exists. NS: {ns}"),
            ));
        }
        collections.insert(ns.collection.clone(), CollectionData::with_options(&options));
        Ok(())
    }

    async fn drop_collection(&self, ns: &Namespace) -> DriverResult<bool> {
        let mut databases = self.databases.write().await;
        Ok(databases
            .get_mut(&ns.db)
            .map_or(false, |db| db.remove(&ns.collection).is_some()))
    }

    async fn run_command(&self, db: &str, command: Document) -> DriverResult<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        match name.as_str() {
            "ping" => Ok(doc! { "ok": 1.0 }),
            "count" => {
                let collection = command
                    .get_str("count")
                    .map_err(|_| bad_value("count requires a collection name"))?;
                let filter = command.get_document("query").cloned().unwrap_or_default();
                let n = self
                    .count(&Namespace::new(db, collection), filter, CountOptions::default())
                    .await?;
                Ok(doc! { "n": n as i64, "ok": 1.0 })
            }
            "listCollections" => {
                let collections = self.list_collections(db).await?;
                Ok(doc! {
                    "cursor": {
                        "id": 0_i64,
                        "ns": format!("{db}.$cmd.listCollections"),
                        "firstBatch": collections,
                    },
                    "ok": 1.0,
                })
            }
            other => Err(DriverFault::with_code(
                COMMAND_NOT_FOUND,
                format!("no such command: '{other}'"),
            )),
        }
    }

    async fn count(
        &self,
        ns: &Namespace,
        filter: Document,
        options: CountOptions,
    ) -> DriverResult<u64> {
        let find = FindOptions {
            hint: options.hint,
            limit: options.limit,
            skip: options.skip,
            ..FindOptions::default()
        };
        Ok(self.select(ns, &filter, &find).await?.len() as u64)
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn ResultCursor>> {
        let docs = self.select(ns, &filter, &options).await?;
        debug!(namespace = %ns, results = docs.len(), "find");
        Ok(Box::new(BufferedCursor::new(docs)))
    }

    async fn aggregate(
        &self,
        ns: &Namespace,
        pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> DriverResult<Box<dyn ResultCursor>> {
        let docs = self
            .read(ns, |c| Ok(c.documents.clone()))
            .await?
            .unwrap_or_default();
        let docs = run_pipeline(docs, &pipeline)?;
        Ok(Box::new(BufferedCursor::new(docs)))
    }

    async fn insert_one(
        &self,
        ns: &Namespace,
        document: Document,
        options: InsertOneOptions,
    ) -> DriverResult<InsertOneResult> {
        let bypass = options.bypass_document_validation;
        let inserted_id = self.write(ns, |c| c.insert(ns, document, bypass)).await?;
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DriverResult<InsertManyResult> {
        let ordered = options.ordered.unwrap_or(true);
        let bypass = options.bypass_document_validation;
        let inserted_ids = self
            .write(ns, |c| {
                let mut ids = BTreeMap::new();
                let mut first_error = None;
                for (index, doc) in documents.into_iter().enumerate() {
                    match c.insert(ns, doc, bypass) {
                        Ok(id) => {
                            ids.insert(index, id);
                        }
                        Err(e) if ordered => return Err(e),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(ids),
                }
            })
            .await?;
        Ok(InsertManyResult {
            inserted_ids,
            acknowledged: ns.is_acknowledged(),
        })
    }

    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> DriverResult<UpdateResult> {
        let request = Modify::new(&filter, Change::Replacement(&replacement))
            .upsert(options.upsert)
            .bypass(options.bypass_document_validation);
        let outcome = self.write(ns, |c| c.modify(ns, request)).await?;
        Ok(update_result(ns, outcome))
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        let request = Modify::new(&filter, Change::Operators(&update))
            .upsert(options.upsert)
            .bypass(options.bypass_document_validation);
        let outcome = self.write(ns, |c| c.modify(ns, request)).await?;
        Ok(update_result(ns, outcome))
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        let request = Modify::new(&filter, Change::Operators(&update))
            .multi(true)
            .upsert(options.upsert)
            .bypass(options.bypass_document_validation);
        let outcome = self.write(ns, |c| c.modify(ns, request)).await?;
        Ok(update_result(ns, outcome))
    }

    async fn delete_one(
        &self,
        ns: &Namespace,
        filter: Document,
        _options: DeleteOptions,
    ) -> DriverResult<DeleteResult> {
        let removed = self
            .write_existing(ns, |c| c.delete(&filter, false, None))
            .await?;
        Ok(delete_result(ns, removed))
    }

    async fn delete_many(
        &self,
        ns: &Namespace,
        filter: Document,
        _options: DeleteOptions,
    ) -> DriverResult<DeleteResult> {
        let removed = self
            .write_existing(ns, |c| c.delete(&filter, true, None))
            .await?;
        Ok(delete_result(ns, removed))
    }

    async fn create_indexes(
        &self,
        ns: &Namespace,
        models: Vec<IndexModel>,
    ) -> DriverResult<Vec<String>> {
        self.write(ns, |c| {
            models
                .into_iter()
                .map(|model| c.create_index(ns, model))
                .collect()
        })
        .await
    }

    async fn drop_index(&self, ns: &Namespace, index: IndexSelector) -> DriverResult<()> {
        let dropped = self
            .write_existing(ns, |c| {
                let position = c.indexes.iter().position(|i| match &index {
                    IndexSelector::Name(name) => &i.name == name,
                    IndexSelector::Keys(keys) => &i.keys == keys,
                });
                match position {
                    Some(p) if c.indexes[p].name == ID_INDEX => Err(DriverFault::with_code(
                        INVALID_OPTIONS,
                        "cannot drop _id index",
                    )),
                    Some(p) => {
                        c.indexes.remove(p);
                        Ok(())
                    }
                    None => Err(DriverFault::with_code(
                        INDEX_NOT_FOUND,
                        format!("index not found with {index:?}"),
                    )),
                }
            })
            .await?;
        dropped.ok_or_else(|| {
            DriverFault::with_code(NAMESPACE_NOT_FOUND, format!("ns not found {ns}"))
        })
    }

    async fn list_indexes(&self, ns: &Namespace) -> DriverResult<Vec<Document>> {
        self.read(ns, |c| Ok(c.indexes.iter().map(IndexSpec::describe).collect()))
            .await?
            .ok_or_else(|| {
                DriverFault::with_code(NAMESPACE_NOT_FOUND, format!("ns does not exist: {ns}"))
            })
    }

    async fn find_one_and_delete(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> DriverResult<Option<Document>> {
        let removed = self
            .write_existing(ns, |c| c.delete(&filter, false, options.sort.as_ref()))
            .await?;
        let doc = removed.and_then(|docs| docs.into_iter().next());
        project_one(doc, options.projection.as_ref())
    }

    async fn find_one_and_replace(
        &self,
        ns: &Namespace,
        filter: Document,
        replacement: Document,
        options: FindOneAndReplaceOptions,
    ) -> DriverResult<Option<Document>> {
        let request = Modify::new(&filter, Change::Replacement(&replacement))
            .upsert(options.upsert)
            .sort(options.sort.as_ref())
            .bypass(options.bypass_document_validation);
        let outcome = self.write(ns, |c| c.modify(ns, request)).await?;
        pick(outcome, options.return_document, options.projection.as_ref())
    }

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DriverResult<Option<Document>> {
        let request = Modify::new(&filter, Change::Operators(&update))
            .upsert(options.upsert)
            .sort(options.sort.as_ref())
            .bypass(options.bypass_document_validation);
        let outcome = self.write(ns, |c| c.modify(ns, request)).await?;
        pick(outcome, options.return_document, options.projection.as_ref())
    }

    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult> {
        if models.is_empty() {
            return Err(bad_value("bulk write requires at least one operation"));
        }
        let ordered = options.ordered.unwrap_or(true);
        let bypass = options.bypass_document_validation;

        let mut result = self
            .write(ns, |c| {
                let mut result = BulkWriteResult::default();
                let mut failures = Vec::new();
                for (index, model) in models.iter().enumerate() {
                    if let Err(e) = c.write_one(ns, index, model, bypass, &mut result) {
                        debug!(
                            index,
                            operation = model.name(),
                            error = %e,
                            "bulk write operation failed"
                        );
                        failures.push((index, e));
                        if ordered {
                            break;
                        }
                    }
                }
                match failures.first() {
                    Some((index, e)) => Err(DriverFault {
                        code: e.code,
                        message: format!(
                            "{} of {} bulk write operations failed; first at index {index}: {}",
                            failures.len(),
                            models.len(),
                            e.message
                        ),
                    }),
                    None => Ok(result),
                }
            })
            .await?;
        result.acknowledged = ns.is_acknowledged();
        Ok(result)
    }
}
