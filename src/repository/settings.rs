//! Configuration document
//!
//! A `Settings` value wraps the parsed tree of one stored configuration
//! document. Lookups use dotted paths and accept both nested documents and
//! documents written with flat dotted keys:
//!
//! ```
//! use authgate::repository::Settings;
//!
//! let nested = Settings::from_yaml("dynamic:\n  http:\n    anonymous_auth_enabled: true\n").unwrap();
//! let flat = Settings::from_yaml("dynamic.http.anonymous_auth_enabled: true\n").unwrap();
//!
//! assert!(nested.get_bool("dynamic.http.anonymous_auth_enabled", false));
//! assert!(flat.get_bool("dynamic.http.anonymous_auth_enabled", false));
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Immutable configuration tree for one configuration type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    root: Value,
}

impl Settings {
    /// A document with no keys ("no configuration")
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wrap an already parsed tree. Non-object roots become empty settings.
    pub fn from_value(root: Value) -> Self {
        match root {
            Value::Object(_) => Self { root },
            _ => Self::empty(),
        }
    }

    /// Parse a YAML (or JSON, which is a YAML subset) document.
    ///
    /// Blank input is a valid empty document.
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        if source.trim().is_empty() {
            return Ok(Self::empty());
        }
        let root: Value = serde_yaml::from_str(source)?;
        Ok(match root {
            Value::Null => Self::empty(),
            other => Self::from_value(other),
        })
    }

    /// Underlying tree
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// True when the document has no keys
    pub fn is_empty(&self) -> bool {
        self.root.as_object().map_or(true, Map::is_empty)
    }

    /// Raw value at a dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    /// String value at a path; numbers and booleans are rendered as strings
    pub fn get_str(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean at a path. Accepts `true`/`false` as booleans or strings.
    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Integer at a path. Accepts numbers or numeric strings.
    pub fn get_i64(&self, path: &str, default: i64) -> i64 {
        match self.get(path) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// List of strings at a path.
    ///
    /// A sequence yields its scalar members in order; a single string is
    /// split on commas. Missing keys yield an empty list.
    pub fn get_str_list(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Sub-document rooted at a path.
    ///
    /// Collects the nested node at `path` together with every flat key that
    /// starts with `path.`; the result is empty when neither exists.
    pub fn get_settings(&self, path: &str) -> Settings {
        Settings {
            root: Value::Object(self.subtree(path)),
        }
    }

    /// Named object children under a path (`""` is the root), ordered by name.
    ///
    /// An object-valued key is a group under its full key, so names may
    /// contain dots. A flat leaf key such as `hdr.order` belongs to the group
    /// named by its first segment.
    pub fn groups(&self, path: &str) -> BTreeMap<String, Settings> {
        let mut groups: BTreeMap<String, Map<String, Value>> = BTreeMap::new();

        for (key, value) in self.subtree(path) {
            match value {
                Value::Object(entries) => {
                    let group = groups.entry(key).or_default();
                    for (name, child) in entries {
                        insert_merged(group, name, child);
                    }
                }
                leaf => {
                    if let Some((name, rest)) = key.split_once('.') {
                        insert_merged(
                            groups.entry(name.to_string()).or_default(),
                            rest.to_string(),
                            leaf,
                        );
                    }
                }
            }
        }

        groups
            .into_iter()
            .map(|(name, entries)| {
                (
                    name,
                    Settings {
                        root: Value::Object(entries),
                    },
                )
            })
            .collect()
    }

    /// Top-level key names
    pub fn names(&self) -> Vec<String> {
        self.root
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Resolve a dotted path, preferring the longest literal key at each level.
///
/// With both `a.b: 1` and `a: {b: 2}` present, `a.b` resolves to 1.
fn lookup<'a>(node: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(node);
    }

    let map = node.as_object()?;
    if let Some(value) = map.get(path) {
        return Some(value);
    }

    let mut end = path.len();
    while let Some(dot) = path[..end].rfind('.') {
        if let Some(child) = map.get(&path[..dot]) {
            if let Some(found) = lookup(child, &path[dot + 1..]) {
                return Some(found);
            }
        }
        end = dot;
    }

    None
}

impl Settings {
    /// Entries below `path`, keyed relative to it
    fn subtree(&self, path: &str) -> Map<String, Value> {
        if path.is_empty() {
            return self.root.as_object().cloned().unwrap_or_default();
        }
        let mut entries = Map::new();
        collect(&self.root, "", path, &mut entries);
        entries
    }
}

fn collect(node: &Value, prefix: &str, path: &str, out: &mut Map<String, Value>) {
    let Some(map) = node.as_object() else {
        return;
    };

    for (key, value) in map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        if full == path {
            if let Some(children) = value.as_object() {
                for (name, child) in children {
                    insert_merged(out, name.clone(), child.clone());
                }
            }
        } else if let Some(rest) = full
            .strip_prefix(path)
            .and_then(|rest| rest.strip_prefix('.'))
        {
            insert_merged(out, rest.to_string(), value.clone());
        } else if path
            .strip_prefix(full.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
        {
            collect(value, &full, path, out);
        }
    }
}

/// Insert, merging objects key by key; any other value replaces
fn insert_merged(map: &mut Map<String, Value>, key: String, value: Value) {
    if let Value::Object(incoming) = value {
        if let Some(Value::Object(existing)) = map.get_mut(&key) {
            for (name, child) in incoming {
                insert_merged(existing, name, child);
            }
        } else {
            map.insert(key, Value::Object(incoming));
        }
    } else {
        map.insert(key, value);
    }
}
