//! value representation
//!
//! The value model is one closed variant family. Every node belongs to
//! [ValueKind] and carries an [Origin]:
//!
//! - primitives: null, boolean, integer (i64), decimal (f64), string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", string keys)
//!
//! plus three "value not yet known" placeholder kinds that only exist between
//! parsing and resolution:
//!
//! - reference: a `${path}` / `${?path}` substitution expression
//! - concat: adjacent pieces to be joined once all are known
//! - delayed merge: a stack of layers whose final shape depends on resolving
//!   at least one reference among them (with an object-shaped variant whose
//!   outcome is statically known to be an object, or an error)
//!
//! Values are immutable. Merging and resolving return new trees; the same
//! subtree may be shared structurally by several parents. Placeholder kinds
//! must not survive a successful full resolve.

use crate::error::{ConfigError, Result};
use crate::origin::Origin;
use crate::path::Path;
use serde::{
    ser::{Error as _, SerializeMap, SerializeSeq},
    Serializer,
};

/// Object field map, iteration follows insertion order
pub type Fields = indexmap::IndexMap<String, ConfigValue>;

/// Whether a tree still contains unresolved placeholder nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    Resolved,
    Unresolved,
}

/// A configuration tree node: provenance plus one of the closed variants
#[derive(Debug, Clone)]
pub struct ConfigValue {
    pub origin: Origin,
    pub kind: ValueKind,
}

/// All possible value types
#[derive(Debug, Clone)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    /// Integral numbers; magnitude beyond i64 falls back to [ValueKind::Decimal]
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<ConfigValue>),
    Object(Fields),
    /// A substitution expression, not yet evaluated
    ///
    /// `prefix_len` is non-zero for references relativized under an include
    /// prefix: lookup retries with the prefix stripped when the full path is
    /// absent. It does not participate in equality.
    Reference {
        path: Path,
        optional: bool,
        prefix_len: usize,
    },
    /// Adjacent pieces to be joined during resolution
    Concat(Vec<ConfigValue>),
    /// Merge layers, highest priority first
    DelayedMerge(Vec<ConfigValue>),
    /// Merge layers statically known to produce an object (or an error)
    DelayedMergeObject(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn new(origin: Origin, kind: ValueKind) -> Self {
        ConfigValue { origin, kind }
    }

    pub fn null(origin: Origin) -> Self {
        ConfigValue::new(origin, ValueKind::Null)
    }

    pub fn boolean(origin: Origin, value: bool) -> Self {
        ConfigValue::new(origin, ValueKind::Boolean(value))
    }

    pub fn integer(origin: Origin, value: i64) -> Self {
        ConfigValue::new(origin, ValueKind::Integer(value))
    }

    pub fn decimal(origin: Origin, value: f64) -> Self {
        ConfigValue::new(origin, ValueKind::Decimal(value))
    }

    pub fn string(origin: Origin, value: impl Into<String>) -> Self {
        ConfigValue::new(origin, ValueKind::String(value.into()))
    }

    pub fn array(origin: Origin, elements: Vec<ConfigValue>) -> Self {
        ConfigValue::new(origin, ValueKind::Array(elements))
    }

    pub fn object(origin: Origin, fields: Fields) -> Self {
        ConfigValue::new(origin, ValueKind::Object(fields))
    }

    pub fn reference(origin: Origin, path: Path, optional: bool) -> Self {
        ConfigValue::new(
            origin,
            ValueKind::Reference {
                path,
                optional,
                prefix_len: 0,
            },
        )
    }

    /// Human-readable kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Null => "null",
            ValueKind::Boolean(_) => "boolean",
            ValueKind::Integer(_) => "integer",
            ValueKind::Decimal(_) => "decimal",
            ValueKind::String(_) => "string",
            ValueKind::Array(_) => "list",
            ValueKind::Object(_) => "object",
            ValueKind::Reference { .. } => "substitution",
            ValueKind::Concat(_) => "concatenation",
            ValueKind::DelayedMerge(_) | ValueKind::DelayedMergeObject(_) => "delayed merge",
        }
    }

    /// Whether this node is a "value not yet known" placeholder
    pub(crate) fn is_placeholder(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Reference { .. }
                | ValueKind::Concat(_)
                | ValueKind::DelayedMerge(_)
                | ValueKind::DelayedMergeObject(_)
        )
    }

    /// Structural resolve status, never triggers evaluation
    pub fn resolve_status(&self) -> ResolveStatus {
        match &self.kind {
            ValueKind::Null
            | ValueKind::Boolean(_)
            | ValueKind::Integer(_)
            | ValueKind::Decimal(_)
            | ValueKind::String(_) => ResolveStatus::Resolved,
            ValueKind::Array(elements) => {
                if elements
                    .iter()
                    .any(|e| e.resolve_status() == ResolveStatus::Unresolved)
                {
                    ResolveStatus::Unresolved
                } else {
                    ResolveStatus::Resolved
                }
            }
            ValueKind::Object(fields) => {
                if fields
                    .values()
                    .any(|v| v.resolve_status() == ResolveStatus::Unresolved)
                {
                    ResolveStatus::Unresolved
                } else {
                    ResolveStatus::Resolved
                }
            }
            ValueKind::Reference { .. }
            | ValueKind::Concat(_)
            | ValueKind::DelayedMerge(_)
            | ValueKind::DelayedMergeObject(_) => ResolveStatus::Unresolved,
        }
    }

    /// Whether merging a lower-priority layer under this value can never
    /// contribute anything
    ///
    /// True for primitives (including null, which resets lower layers) and
    /// lists. Objects keep merging. A delayed merge answers with its last
    /// (lowest priority) layer, since everything above it is already pending.
    pub fn ignores_fallbacks(&self) -> bool {
        match &self.kind {
            ValueKind::Null
            | ValueKind::Boolean(_)
            | ValueKind::Integer(_)
            | ValueKind::Decimal(_)
            | ValueKind::String(_)
            | ValueKind::Array(_) => true,
            ValueKind::Object(_) => false,
            ValueKind::Reference { .. } | ValueKind::Concat(_) => false,
            ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) => stack
                .last()
                .expect("delayed merge stacks are non-empty")
                .ignores_fallbacks(),
        }
    }

    /// Wrap this value in a single-field object
    pub fn at_key(&self, key: impl Into<String>) -> ConfigValue {
        let mut fields = Fields::new();
        fields.insert(key.into(), self.clone());
        ConfigValue::object(self.origin.clone(), fields)
    }

    /// Wrap this value in nested single-field objects, outermost segment first
    pub fn at_path(&self, path: &Path) -> ConfigValue {
        let mut value = self.clone();
        for segment in path.segments().iter().rev() {
            value = value.at_key(segment.clone());
        }
        value
    }

    /// Copy with every reference path prefixed, remembering the prefix length
    ///
    /// Used for included trees: a substitution written relative to the
    /// included file's root first means the prefixed path, and falls back to
    /// the unprefixed one against the including document's root.
    pub(crate) fn relativized(&self, prefix: &Path) -> ConfigValue {
        let kind = match &self.kind {
            ValueKind::Reference {
                path,
                optional,
                prefix_len,
            } => ValueKind::Reference {
                path: path.prepend(prefix),
                optional: *optional,
                prefix_len: prefix_len + prefix.len(),
            },
            ValueKind::Array(elements) => {
                ValueKind::Array(elements.iter().map(|e| e.relativized(prefix)).collect())
            }
            ValueKind::Object(fields) => ValueKind::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.relativized(prefix)))
                    .collect(),
            ),
            ValueKind::Concat(pieces) => {
                ValueKind::Concat(pieces.iter().map(|p| p.relativized(prefix)).collect())
            }
            ValueKind::DelayedMerge(stack) => {
                ValueKind::DelayedMerge(stack.iter().map(|v| v.relativized(prefix)).collect())
            }
            ValueKind::DelayedMergeObject(stack) => {
                ValueKind::DelayedMergeObject(stack.iter().map(|v| v.relativized(prefix)).collect())
            }
            other => other.clone(),
        };
        ConfigValue::new(self.origin.clone(), kind)
    }

    fn check_resolved(&self) -> Result<()> {
        if self.is_placeholder() {
            return Err(ConfigError::not_resolved(format!(
                "tried to read a {} before resolving, at {}",
                self.kind_name(),
                self.origin
            )));
        }
        Ok(())
    }

    fn read_error(&self, wanted: &'static str) -> ConfigError {
        ConfigError::wrong_type(
            &self.origin,
            format!("expected {wanted}, got {}", self.kind_name()),
        )
    }

    pub fn as_bool(&self) -> Result<bool> {
        self.check_resolved()?;
        match &self.kind {
            ValueKind::Boolean(b) => Ok(*b),
            _ => Err(self.read_error("boolean")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        self.check_resolved()?;
        match &self.kind {
            ValueKind::Integer(n) => Ok(*n),
            _ => Err(self.read_error("integer")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.check_resolved()?;
        match &self.kind {
            ValueKind::Integer(n) => Ok(*n as f64),
            ValueKind::Decimal(d) => Ok(*d),
            _ => Err(self.read_error("decimal")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        self.check_resolved()?;
        match &self.kind {
            ValueKind::String(s) => Ok(s),
            _ => Err(self.read_error("string")),
        }
    }

    pub fn as_array(&self) -> Result<&[ConfigValue]> {
        self.check_resolved()?;
        match &self.kind {
            ValueKind::Array(elements) => Ok(elements),
            _ => Err(self.read_error("list")),
        }
    }

    pub fn as_object(&self) -> Result<&Fields> {
        self.check_resolved()?;
        match &self.kind {
            ValueKind::Object(fields) => Ok(fields),
            _ => Err(self.read_error("object")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    /// Descend by path through objects; Ok(None) when a key is missing
    ///
    /// Reading through a placeholder node is a [ConfigError::NotResolved].
    pub fn lookup(&self, path: &Path) -> Result<Option<&ConfigValue>> {
        let mut current = self;
        for (index, segment) in path.segments().iter().enumerate() {
            current.check_resolved()?;
            let ValueKind::Object(fields) = &current.kind else {
                return if index == 0 {
                    Err(self.read_error("object"))
                } else {
                    Ok(None)
                };
            };
            match fields.get(segment) {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Convenience for `lookup(Path::parse(text))`
    pub fn get(&self, path_text: &str) -> Result<Option<&ConfigValue>> {
        self.lookup(&Path::parse(path_text)?)
    }
}

// Origin never participates in equality
impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        use ValueKind::*;
        match (&self.kind, &other.kind) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Integer(a), Decimal(b)) | (Decimal(b), Integer(a)) => *a as f64 == *b,
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (
                Reference {
                    path: pa,
                    optional: oa,
                    ..
                },
                Reference {
                    path: pb,
                    optional: ob,
                    ..
                },
            ) => pa == pb && oa == ob,
            (Concat(a), Concat(b)) => a == b,
            (DelayedMerge(a), DelayedMerge(b)) => a == b,
            (DelayedMergeObject(a), DelayedMergeObject(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::boolean(Origin::new_simple("hardcoded value"), value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::integer(Origin::new_simple("hardcoded value"), value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::decimal(Origin::new_simple("hardcoded value"), value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::string(Origin::new_simple("hardcoded value"), value)
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::string(Origin::new_simple("hardcoded value"), value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(value: Vec<T>) -> Self {
        ConfigValue::array(
            Origin::new_simple("hardcoded value"),
            value.into_iter().map(Into::into).collect(),
        )
    }
}

impl serde::ser::Serialize for ConfigValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.kind {
            ValueKind::Null => serializer.serialize_unit(),
            ValueKind::Boolean(value) => serializer.serialize_bool(*value),
            ValueKind::Integer(value) => serializer.serialize_i64(*value),
            ValueKind::Decimal(value) => serializer.serialize_f64(*value),
            ValueKind::String(value) => serializer.serialize_str(value),
            ValueKind::Array(elements) => {
                let mut ser = serializer.serialize_seq(Some(elements.len()))?;
                for element in elements {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            ValueKind::Object(fields) => {
                let mut ser = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    ser.serialize_entry(key, value)?;
                }
                ser.end()
            }
            ValueKind::Reference { .. }
            | ValueKind::Concat(_)
            | ValueKind::DelayedMerge(_)
            | ValueKind::DelayedMergeObject(_) => Err(S::Error::custom(format!(
                "cannot serialize unresolved {} at {}",
                self.kind_name(),
                self.origin
            ))),
        }
    }
}

impl std::fmt::Display for ConfigValue {
    /// Concise single-line rendering in the native syntax
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let options = crate::render::RenderOptions::concise();
        match crate::render::render(self, &options) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<unrenderable {}>", self.kind_name()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn origin() -> Origin {
        Origin::new_simple("test")
    }

    #[test]
    fn resolve_status_is_structural() {
        let resolved: ConfigValue = vec![1i64, 2, 3].into();
        assert_eq!(resolved.resolve_status(), ResolveStatus::Resolved);

        let reference = ConfigValue::reference(origin(), Path::from_key("a"), false);
        assert_eq!(reference.resolve_status(), ResolveStatus::Unresolved);

        let nested = reference.at_path(&Path::parse("x.y").unwrap());
        assert_eq!(nested.resolve_status(), ResolveStatus::Unresolved);

        let array = ConfigValue::array(origin(), vec![1i64.into(), reference]);
        assert_eq!(array.resolve_status(), ResolveStatus::Unresolved);
    }

    #[test]
    fn ignores_fallbacks() {
        assert!(ConfigValue::from(1i64).ignores_fallbacks());
        assert!(ConfigValue::from("s").ignores_fallbacks());
        assert!(ConfigValue::null(origin()).ignores_fallbacks());
        assert!(ConfigValue::from(vec![1i64]).ignores_fallbacks());
        assert!(!ConfigValue::object(origin(), Fields::new()).ignores_fallbacks());
        assert!(
            !ConfigValue::reference(origin(), Path::from_key("a"), false).ignores_fallbacks()
        );
    }

    #[test]
    fn equality_ignores_origin() {
        let a = ConfigValue::integer(Origin::new_simple("one"), 42);
        let b = ConfigValue::integer(Origin::new_simple("two"), 42);
        assert_eq!(a, b);
    }

    #[test]
    fn at_path_nests_outermost_first() {
        let value = ConfigValue::from(1i64).at_path(&Path::parse("a.b").unwrap());
        let inner = value.get("a.b").unwrap().unwrap();
        assert_eq!(inner, &ConfigValue::from(1i64));
    }

    #[test]
    fn lookup_missing_key() {
        let value = ConfigValue::from(1i64).at_path(&Path::parse("a.b").unwrap());
        assert_eq!(value.get("a.c").unwrap(), None);
        assert_eq!(value.get("a.b.c").unwrap(), None);
    }

    #[test]
    fn reads_through_placeholder_raise_not_resolved() {
        let reference = ConfigValue::reference(origin(), Path::from_key("x"), false);
        let tree = reference.at_key("a");
        let err = tree.get("a.b").unwrap_err();
        assert!(matches!(err, ConfigError::NotResolved { .. }));
    }

    #[test]
    fn typed_read_wrong_type() {
        let value = ConfigValue::from("text");
        let err = value.as_i64().unwrap_err();
        assert!(matches!(err, ConfigError::WrongType { .. }));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn relativized_prefixes_references() {
        let reference = ConfigValue::reference(origin(), Path::parse("x.y").unwrap(), false);
        let tree = reference.at_key("a");
        let moved = tree.relativized(&Path::from_key("sub"));
        let inner = moved.get("a").unwrap().unwrap();
        match &inner.kind {
            ValueKind::Reference {
                path, prefix_len, ..
            } => {
                assert_eq!(path, &Path::parse("sub.x.y").unwrap());
                assert_eq!(*prefix_len, 1);
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }
}
