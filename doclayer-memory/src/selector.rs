//! Selector matching for in-memory `find`.
//!
//! A selector is a document mapping field paths to conditions. A plain value is an
//! equality test; a document of operators (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$in`, `$nin`, `$exists`) applies each operator. `$and` and `$or` combine
//! sub-selectors. Dotted paths reach into nested documents.

use std::cmp::Ordering;

use bson::{Bson, Document, datetime::DateTime};

use doclayer_core::error::{DocumentStoreError, DocumentStoreResult};

/// Comparable view of a BSON value; integers and doubles compare as numbers.
#[derive(Debug, PartialEq)]
enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            other => Comparable::Other(other),
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut value = document.get(parts.next()?)?;

    for part in parts {
        value = value.as_document()?.get(part)?;
    }

    Some(value)
}

fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

fn compare(left: Option<&Bson>, right: &Bson, accept: fn(Ordering) -> bool) -> bool {
    left.and_then(|left| Comparable::from(left).partial_cmp(&Comparable::from(right)))
        .is_some_and(accept)
}

fn operand_array<'a>(operator: &str, operand: &'a Bson) -> DocumentStoreResult<&'a Vec<Bson>> {
    operand.as_array().ok_or_else(|| {
        DocumentStoreError::BadRequest(format!("{operator} expects an array"))
    })
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> DocumentStoreResult<bool> {
    let operators = match condition {
        Bson::Document(operators) if operators.keys().all(|key| key.starts_with('$')) => {
            operators
        }
        expected => return Ok(value.is_some_and(|value| values_equal(value, expected))),
    };

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => value.is_some_and(|value| values_equal(value, operand)),
            "$ne" => !value.is_some_and(|value| values_equal(value, operand)),
            "$gt" => compare(value, operand, Ordering::is_gt),
            "$gte" => compare(value, operand, Ordering::is_ge),
            "$lt" => compare(value, operand, Ordering::is_lt),
            "$lte" => compare(value, operand, Ordering::is_le),
            "$in" => {
                let candidates = operand_array(operator, operand)?;
                value.is_some_and(|value| candidates.iter().any(|c| values_equal(value, c)))
            }
            "$nin" => {
                let candidates = operand_array(operator, operand)?;
                !value.is_some_and(|value| candidates.iter().any(|c| values_equal(value, c)))
            }
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            unknown => {
                return Err(DocumentStoreError::BadRequest(format!(
                    "unsupported selector operator {unknown}"
                )));
            }
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn sub_selectors<'a>(operator: &str, operand: &'a Bson) -> DocumentStoreResult<Vec<&'a Document>> {
    operand_array(operator, operand)?
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                DocumentStoreError::BadRequest(format!("{operator} expects an array of selectors"))
            })
        })
        .collect()
}

/// Returns whether `document` satisfies `selector`.
///
/// # Errors
///
/// Returns a bad-request error for malformed selectors.
pub(crate) fn matches(document: &Document, selector: &Document) -> DocumentStoreResult<bool> {
    for (field, condition) in selector {
        let matched = match field.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_selectors(field, condition)? {
                    if !matches(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_selectors(field, condition)? {
                    if matches(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            path => matches_condition(lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn test_equality_and_nested_paths() {
        let document = doc! { "name": "Alice", "address": { "city": "Oslo" }, "age": 30 };

        assert!(matches(&document, &doc! { "name": "Alice" }).unwrap());
        assert!(matches(&document, &doc! { "address.city": "Oslo" }).unwrap());
        assert!(matches(&document, &doc! { "age": 30_i64 }).unwrap());
        assert!(!matches(&document, &doc! { "name": "Bob" }).unwrap());
        assert!(!matches(&document, &doc! { "missing": "x" }).unwrap());
    }

    #[test]
    fn test_operators() {
        let document = doc! { "age": 30, "tags": ["a"] };

        assert!(matches(&document, &doc! { "age": { "$gt": 18, "$lte": 30 } }).unwrap());
        assert!(!matches(&document, &doc! { "age": { "$lt": 30 } }).unwrap());
        assert!(matches(&document, &doc! { "age": { "$in": [10, 30] } }).unwrap());
        assert!(matches(&document, &doc! { "age": { "$nin": [10] } }).unwrap());
        assert!(matches(&document, &doc! { "name": { "$exists": false } }).unwrap());
        assert!(matches(&document, &doc! { "age": { "$ne": 31 } }).unwrap());
    }

    #[test]
    fn test_combinators() {
        let document = doc! { "age": 30, "name": "Alice" };

        assert!(
            matches(
                &document,
                &doc! { "$or": [ { "name": "Bob" }, { "age": { "$gte": 30 } } ] }
            )
            .unwrap()
        );
        assert!(
            !matches(
                &document,
                &doc! { "$and": [ { "name": "Alice" }, { "age": 31 } ] }
            )
            .unwrap()
        );
    }

    #[test]
    fn test_malformed_selector() {
        let document = doc! { "age": 30 };

        let err = matches(&document, &doc! { "age": { "$regex": "3" } }).unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(matches(&document, &doc! { "$or": 1 }).is_err());
    }
}
