//! Filter compiler: `$eq/$ne/$gt/$gte/$lt/$lte/$in/$nin/$regex`.
//!
//! Grounded on the teacher's strategy-pattern operator registry
//! (`ironbase-core/src/query/operators.rs`) and its regex LRU cache; scaled
//! down to the operator set this engine actually supports (no `$and`/`$or`/
//! `$exists`, which the teacher has but the spec does not call for).

use std::cmp::Ordering;
use std::sync::Mutex;

use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde_json::Value;

use crate::document::Document;

const REGEX_CACHE_SIZE: usize = 128;

lazy_static! {
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(std::num::NonZeroUsize::new(REGEX_CACHE_SIZE).unwrap()));
}

fn get_or_compile_regex(pattern: &str) -> Option<Regex> {
    {
        let mut cache = REGEX_CACHE.lock().unwrap();
        if let Some(re) = cache.get(pattern) {
            return Some(re.clone());
        }
    }
    let re = Regex::new(pattern).ok()?;
    REGEX_CACHE.lock().unwrap().put(pattern.to_string(), re.clone());
    Some(re)
}

/// A compiled filter: a JSON filter object plus an optional user predicate.
pub struct Matcher<'a> {
    filter: &'a Value,
    predicate: Option<&'a dyn Fn(&Document) -> bool>,
}

impl<'a> Matcher<'a> {
    pub fn new(filter: &'a Value, predicate: Option<&'a dyn Fn(&Document) -> bool>) -> Self {
        Matcher { filter, predicate }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if !matches_filter(doc, self.filter) {
            return false;
        }
        self.predicate.map(|p| p(doc)).unwrap_or(true)
    }

    /// True when every clause is a literal or a bare `$eq`, naming a field
    /// usable by the secondary-index point-lookup optimization.
    pub fn single_field_eq(&self) -> Option<(&'a str, &'a Value)> {
        let obj = self.filter.as_object()?;
        if obj.len() != 1 {
            return None;
        }
        let (field, clause) = obj.iter().next().unwrap();
        match clause {
            Value::Object(ops) if ops.len() == 1 => {
                let (op, target) = ops.iter().next().unwrap();
                (op == "$eq").then_some((field.as_str(), target))
            }
            Value::Object(_) => None,
            other => Some((field.as_str(), other)),
        }
    }
}

/// Does `doc` satisfy `filter`? `filter` maps field names to either a
/// literal (equality) or an operator object.
pub fn matches_filter(doc: &Document, filter: &Value) -> bool {
    let obj = match filter.as_object() {
        Some(o) => o,
        None => return false,
    };
    for (field, clause) in obj {
        let value = doc.get(field).unwrap_or(&Value::Null);
        if !matches_clause(value, clause) {
            return false;
        }
    }
    true
}

fn matches_clause(value: &Value, clause: &Value) -> bool {
    match clause {
        Value::Object(ops) if is_operator_object(ops) => {
            ops.iter().all(|(op, target)| matches_operator(value, op, target, clause))
        }
        literal => value == literal,
    }
}

fn is_operator_object(ops: &serde_json::Map<String, Value>) -> bool {
    ops.keys().all(|k| k.starts_with('$'))
}

fn matches_operator(value: &Value, op: &str, target: &Value, whole: &Value) -> bool {
    match op {
        "$eq" => value == target,
        "$ne" => value != target,
        "$gt" => compare(value, target) == Some(Ordering::Greater),
        "$gte" => matches!(compare(value, target), Some(Ordering::Greater) | Some(Ordering::Equal)),
        "$lt" => compare(value, target) == Some(Ordering::Less),
        "$lte" => matches!(compare(value, target), Some(Ordering::Less) | Some(Ordering::Equal)),
        "$in" => target.as_array().map(|a| a.contains(value)).unwrap_or(false),
        "$nin" => target.as_array().map(|a| !a.contains(value)).unwrap_or(false),
        "$regex" => match (value.as_str(), target.as_str()) {
            (Some(s), Some(pattern)) => get_or_compile_regex(pattern)
                .map(|re| re.is_match(s))
                .unwrap_or(false),
            _ => false,
        },
        _ => value == whole,
    }
}

/// Generic ordering for scalar JSON values; `None` when not comparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(fields: Value) -> Document {
        Document::from_value(1, fields).unwrap()
    }

    #[test]
    fn eq_literal() {
        let d = doc(json!({"name": "A"}));
        assert!(matches_filter(&d, &json!({"name": "A"})));
        assert!(!matches_filter(&d, &json!({"name": "B"})));
    }

    #[test]
    fn gt_numeric() {
        let d = doc(json!({"price": 10}));
        assert!(matches_filter(&d, &json!({"price": {"$gt": 8}})));
        assert!(!matches_filter(&d, &json!({"price": {"$gt": 12}})));
    }

    #[test]
    fn in_operator() {
        let d = doc(json!({"category": "fruit"}));
        assert!(matches_filter(&d, &json!({"category": {"$in": ["fruit", "veg"]}})));
        assert!(!matches_filter(&d, &json!({"category": {"$in": ["veg"]}})));
    }

    #[test]
    fn nin_operator() {
        let d = doc(json!({"category": "fruit"}));
        assert!(matches_filter(&d, &json!({"category": {"$nin": ["veg"]}})));
        assert!(!matches_filter(&d, &json!({"category": {"$nin": ["fruit", "veg"]}})));
        // a non-sequence target is malformed input, not a wildcard match
        assert!(!matches_filter(&d, &json!({"category": {"$nin": "fruit"}})));
    }

    #[test]
    fn regex_operator() {
        let d = doc(json!({"name": "Carrot"}));
        assert!(matches_filter(&d, &json!({"name": {"$regex": "^C"}})));
        assert!(!matches_filter(&d, &json!({"name": {"$regex": "^Z"}})));
    }

    #[test]
    fn unknown_operator_falls_back_to_deep_equality() {
        let d = doc(json!({"meta": {"$weird": 1}}));
        assert!(matches_filter(&d, &json!({"meta": {"$weird": 1}})));
    }

    #[test]
    fn single_field_eq_detection() {
        let filter = json!({"email": "a@b.com"});
        let m = Matcher::new(&filter, None);
        assert_eq!(m.single_field_eq(), Some(("email", &json!("a@b.com"))));

        let filter2 = json!({"email": {"$eq": "a@b.com"}});
        let m2 = Matcher::new(&filter2, None);
        assert!(m2.single_field_eq().is_some());

        let filter3 = json!({"email": "a@b.com", "age": {"$gt": 1}});
        let m3 = Matcher::new(&filter3, None);
        assert_eq!(m3.single_field_eq(), None);
    }
}
