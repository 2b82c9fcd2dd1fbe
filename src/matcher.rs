//! Filter, sort and projection evaluation for the in-memory engine.
//!
//! Filters are parsed once into an [`Expression`] tree and then evaluated
//! against each stored document. Supported operators:
//!
//! - comparison: `$eq $ne $gt $gte $lt $lte $in $nin $exists`
//! - logical: `$and $or $nor`
//!
//! Field paths may be dotted (`address.city`). A path crossing an array
//! matches if any element matches.

use crate::error::{DriverFault, DriverResult};
use crate::update::{set_path, unset_path};
use bson::{Bson, Document};
use std::cmp::Ordering;

/// Engine error code for malformed arguments.
pub(crate) const BAD_VALUE: i32 = 2;

static NULL: Bson = Bson::Null;

pub(crate) fn bad_value(message: impl Into<String>) -> DriverFault {
    DriverFault::with_code(BAD_VALUE, message)
}

/// A parsed filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// All children match. An empty conjunction matches everything.
    And(Vec<Expression>),
    /// At least one child matches.
    Or(Vec<Expression>),
    /// No child matches.
    Nor(Vec<Expression>),
    /// A condition on the values found at a field path.
    Field {
        /// Dotted field path.
        path: String,
        /// Condition applied to the values at `path`.
        condition: Condition,
    },
}

/// A single field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equal, or an array containing an equal element.
    Eq(Bson),
    /// Negation of [`Condition::Eq`].
    Ne(Bson),
    /// Greater than.
    Gt(Bson),
    /// Greater than or equal.
    Gte(Bson),
    /// Less than.
    Lt(Bson),
    /// Less than or equal.
    Lte(Bson),
    /// Equal to any listed value.
    In(Vec<Bson>),
    /// Equal to none of the listed values.
    Nin(Vec<Bson>),
    /// Field presence.
    Exists(bool),
}

impl Expression {
    /// Parse a filter document.
    pub fn parse(filter: &Document) -> DriverResult<Expression> {
        let mut children = Vec::new();

        for (key, value) in filter {
            match key.as_str() {
                "$and" => children.push(Expression::And(parse_logical(key, value)?)),
                "$or" => children.push(Expression::Or(parse_logical(key, value)?)),
                "$nor" => children.push(Expression::Nor(parse_logical(key, value)?)),
                k if k.starts_with('$') => {
                    return Err(bad_value(format!("unknown top level operator: {k}")));
                }
                _ => children.extend(parse_field(key, value)?),
            }
        }

        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(Expression::And(children))
        }
    }

    /// Whether `doc` satisfies the filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Expression::And(children) => children.iter().all(|c| c.matches(doc)),
            Expression::Or(children) => children.iter().any(|c| c.matches(doc)),
            Expression::Nor(children) => !children.iter().any(|c| c.matches(doc)),
            Expression::Field { path, condition } => condition.matches(&values_at(doc, path)),
        }
    }

    /// Document built from the filter's equality conditions.
    ///
    /// Used as the starting point of an upserted document.
    pub fn equality_seed(&self) -> Document {
        let mut seed = Document::new();
        self.collect_equalities(&mut seed);
        seed
    }

    fn collect_equalities(&self, seed: &mut Document) {
        match self {
            Expression::And(children) => {
                for child in children {
                    child.collect_equalities(seed);
                }
            }
            Expression::Field {
                path,
                condition: Condition::Eq(value),
            } => {
                // A path conflicting with an earlier one is left out.
                let _ = set_path(seed, path, value.clone());
            }
            _ => {}
        }
    }
}

fn parse_logical(op: &str, value: &Bson) -> DriverResult<Vec<Expression>> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => return Err(bad_value(format!("{op} must be a nonempty array"))),
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Expression::parse(doc),
            _ => Err(bad_value(format!("{op} argument's entries must be objects"))),
        })
        .collect()
}

fn parse_field(path: &str, value: &Bson) -> DriverResult<Vec<Expression>> {
    let operators = match value {
        Bson::Document(ops) if ops.keys().next().map_or(false, |k| k.starts_with('$')) => ops,
        _ => {
            return Ok(vec![Expression::Field {
                path: path.to_string(),
                condition: Condition::Eq(value.clone()),
            }])
        }
    };

    operators
        .iter()
        .map(|(op, arg)| {
            let condition = match op.as_str() {
                "$eq" => Condition::Eq(arg.clone()),
                "$ne" => Condition::Ne(arg.clone()),
                "$gt" => Condition::Gt(arg.clone()),
                "$gte" => Condition::Gte(arg.clone()),
                "$lt" => Condition::Lt(arg.clone()),
                "$lte" => Condition::Lte(arg.clone()),
                "$in" => Condition::In(array_argument(op, arg)?),
                "$nin" => Condition::Nin(array_argument(op, arg)?),
                "$exists" => Condition::Exists(truthy(arg)),
                other => return Err(bad_value(format!("unknown operator: {other}"))),
            };
            Ok(Expression::Field {
                path: path.to_string(),
                condition,
            })
        })
        .collect()
}

fn array_argument(op: &str, arg: &Bson) -> DriverResult<Vec<Bson>> {
    match arg {
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(bad_value(format!("{op} needs an array"))),
    }
}

impl Condition {
    /// Evaluate against every value found at the field path.
    pub fn matches(&self, values: &[&Bson]) -> bool {
        match self {
            Condition::Eq(target) => equality_matches(values, target),
            Condition::Ne(target) => !equality_matches(values, target),
            Condition::Gt(target) => range_matches(values, target, Ordering::is_gt),
            Condition::Gte(target) => range_matches(values, target, Ordering::is_ge),
            Condition::Lt(target) => range_matches(values, target, Ordering::is_lt),
            Condition::Lte(target) => range_matches(values, target, Ordering::is_le),
            Condition::In(targets) => targets.iter().any(|t| equality_matches(values, t)),
            Condition::Nin(targets) => !targets.iter().any(|t| equality_matches(values, t)),
            Condition::Exists(expected) => !values.is_empty() == *expected,
        }
    }
}

fn equality_matches(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }
    values.iter().any(|value| {
        values_equal(value, target)
            || matches!(value, Bson::Array(items) if items.iter().any(|item| values_equal(item, target)))
    })
}

fn range_matches(values: &[&Bson], target: &Bson, accept: fn(Ordering) -> bool) -> bool {
    values.iter().any(|value| {
        let direct = compare_comparable(value, target).map_or(false, accept);
        direct
            || matches!(value, Bson::Array(items) if items
                .iter()
                .any(|item| compare_comparable(item, target).map_or(false, accept)))
    })
}

/// Every value reachable through `path`, fanning out over arrays.
pub fn values_at<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_from_document(doc, &segments, &mut out);
    out
}

fn collect_from_document<'a>(doc: &'a Document, segments: &[&str], out: &mut Vec<&'a Bson>) {
    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = doc.get(*first) {
            collect_from_value(value, rest, out);
        }
    }
}

fn collect_from_value<'a>(value: &'a Bson, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((next, after)) = rest.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => collect_from_document(doc, rest, out),
        Bson::Array(items) => match next.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    collect_from_value(item, after, out);
                }
            }
            Err(_) => {
                for item in items {
                    if let Bson::Document(doc) = item {
                        collect_from_document(doc, rest, out);
                    }
                }
            }
        },
        _ => {}
    }
}

/// The value at `path` without array fan-out.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((head, rest)) => match doc.get(head)? {
            Bson::Document(child) => get_path(child, rest),
            Bson::Array(items) => {
                let (index, rest) = match rest.split_once('.') {
                    Some((index, rest)) => (index, Some(rest)),
                    None => (rest, None),
                };
                let item = items.get(index.parse::<usize>().ok()?)?;
                match (rest, item) {
                    (None, item) => Some(item),
                    (Some(rest), Bson::Document(child)) => get_path(child, rest),
                    _ => None,
                }
            }
            _ => None,
        },
    }
}

/// Truthiness of a projection or `$exists` argument.
pub fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn as_number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Number::Int(*n)),
        Bson::Double(n) => Some(Number::Float(*n)),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a.cmp(&b),
        (Number::Int(a), Number::Float(b)) => (a as f64).partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Number::Float(a), Number::Int(b)) => a.partial_cmp(&(b as f64)).unwrap_or(Ordering::Equal),
        (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Equality with numeric types compared by value.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Document(a), Bson::Document(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => compare_numbers(x, y) == Ordering::Equal,
            _ => a == b,
        },
    }
}

/// Ordering between values of the same kind. `None` across kinds.
fn compare_comparable(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return Some(compare_numbers(x, y));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => Some((x.time, x.increment).cmp(&(y.time, y.increment))),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over BSON values used for sorting.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    if let Some(ord) = compare_comparable(a, b) {
        return ord;
    }
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y.iter()) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Array(x), Bson::Array(y)) => {
            for (va, vb) in x.iter().zip(y.iter()) {
                let ord = compare_values(va, vb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        _ => Ordering::Equal,
    }
}

/// A parsed sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    keys: Vec<(String, bool)>,
}

impl SortSpec {
    /// Parse `{field: 1 | -1, ...}`.
    pub fn parse(spec: &Document) -> DriverResult<Self> {
        let keys = spec
            .iter()
            .map(|(path, direction)| {
                let descending = match as_number(direction) {
                    Some(n) if compare_numbers(n, Number::Int(0)) == Ordering::Greater => false,
                    Some(n) if compare_numbers(n, Number::Int(0)) == Ordering::Less => true,
                    _ => {
                        return Err(bad_value(
                            "$sort key ordering must be 1 (for ascending) or -1 (for descending)",
                        ))
                    }
                };
                Ok((path.clone(), descending))
            })
            .collect::<DriverResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Compare two documents by the sort keys.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (path, descending) in &self.keys {
            let a_value = values_at(a, path).first().copied().unwrap_or(&NULL);
            let b_value = values_at(b, path).first().copied().unwrap_or(&NULL);
            let ord = compare_values(a_value, b_value);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of `docs`.
    pub fn sort(&self, docs: &mut [Document]) {
        if !self.keys.is_empty() {
            docs.sort_by(|a, b| self.compare(a, b));
        }
    }
}

/// A parsed projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    include: bool,
    include_id: bool,
    paths: Vec<String>,
}

impl Projection {
    /// Parse an inclusion or exclusion projection.
    pub fn parse(spec: &Document) -> DriverResult<Self> {
        let mut include = None;
        let mut include_id = true;
        let mut paths = Vec::new();

        for (path, value) in spec {
            let on = truthy(value);
            if path == "_id" {
                include_id = on;
                continue;
            }
            match include {
                None => include = Some(on),
                Some(mode) if mode != on => {
                    return Err(bad_value(format!(
                        "cannot mix inclusion and exclusion in projection at field {path}"
                    )));
                }
                Some(_) => {}
            }
            paths.push(path.clone());
        }

        Ok(Self {
            include: include.unwrap_or(false),
            include_id,
            paths,
        })
    }

    /// Apply the projection to `doc`.
    pub fn apply(&self, doc: &Document) -> Document {
        if self.include {
            let mut out = Document::new();
            if self.include_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            for path in &self.paths {
                if let Some(value) = get_path(doc, path) {
                    let _ = set_path(&mut out, path, value.clone());
                }
            }
            out
        } else {
            let mut out = doc.clone();
            for path in &self.paths {
                unset_path(&mut out, path);
            }
            if !self.include_id {
                out.remove("_id");
            }
            out
        }
    }
}
