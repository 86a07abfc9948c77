//! Per-call options passed through to backends.
//!
//! An option is anything that can apply itself onto a backend-specific target. The
//! stock targets are a JSON object ([`serde_json::Map`]) and a list of query
//! parameters ([`QueryParams`]); backends may define their own and options that do
//! not recognize a target leave it untouched.
//!
//! Several options are combined into one [`Options`] value. Options are applied in
//! order, so a later option overwrites an earlier one for the same key.
//!
//! ```ignore
//! use doclayer::options::{Options, include_docs, param};
//!
//! let opts = Options::new()
//!     .with(include_docs())
//!     .with(param("limit", 10));
//! assert_eq!(opts.get("limit"), Some(10.into()));
//! ```

use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

use serde_json::{Map, Value};

/// A single option value.
pub trait DocOption: fmt::Debug + fmt::Display + Send + Sync {
    /// Applies the option onto `target` if the target type is recognized.
    fn apply(&self, target: &mut dyn Any);
}

/// Query-string style key/value pairs, for backends that speak URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for `key`, keeping any existing values.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Returns the first value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value recorded for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A collection of backend-specific key/value options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl DocOption for Params {
    fn apply(&self, target: &mut dyn Any) {
        if let Some(map) = target.downcast_mut::<Map<String, Value>>() {
            for (key, value) in &self.0 {
                map.insert(key.clone(), value.clone());
            }
        } else if let Some(query) = target.downcast_mut::<QueryParams>() {
            for (key, value) in &self.0 {
                for value in query_values(value) {
                    query.add(key.clone(), value);
                }
            }
        }
    }
}

/// Strings, string arrays, booleans and integers become query values; anything else is skipped.
fn query_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Number(n) if n.is_i64() || n.is_u64() => vec![n.to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }

        let parts = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>();

        write!(f, "map[{}]", parts.join(" "))
    }
}

/// Sets a single key/value pair.
pub fn param(key: impl Into<String>, value: impl Into<Value>) -> Params {
    Params::new().insert(key, value)
}

/// Sets the revision, a less verbose alternative to `param("rev", rev)`.
pub fn rev(rev: impl Into<String>) -> Params {
    param("rev", rev.into())
}

/// Asks the backend to include documents in row results.
pub fn include_docs() -> Params {
    param("include_docs", true)
}

/// The merged, ordered set of options for one call.
#[derive(Debug, Clone, Default)]
pub struct Options(Vec<Arc<dyn DocOption>>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an option; it takes precedence over options added before it.
    pub fn with(mut self, option: impl DocOption + 'static) -> Self {
        self.0.push(Arc::new(option));
        self
    }

    /// Merges several option sets, preserving their order.
    pub fn merge(sets: impl IntoIterator<Item = Options>) -> Self {
        sets.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the options into a JSON object.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        self.apply(&mut map);
        map
    }

    /// Resolves the options into query parameters.
    pub fn to_query(&self) -> QueryParams {
        let mut query = QueryParams::new();
        self.apply(&mut query);
        query
    }

    /// Returns the effective value for `key` after all options are applied.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl DocOption for Options {
    fn apply(&self, target: &mut dyn Any) {
        for option in &self.0 {
            option.apply(target);
        }
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .0
            .iter()
            .map(|option| option.to_string())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();

        f.write_str(&parts.join(","))
    }
}

impl From<Params> for Options {
    fn from(params: Params) -> Self {
        Options::new().with(params)
    }
}

impl FromIterator<Options> for Options {
    fn from_iter<I: IntoIterator<Item = Options>>(iter: I) -> Self {
        Self(iter.into_iter().flat_map(|set| set.0).collect())
    }
}
