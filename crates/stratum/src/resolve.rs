//! substitution resolution
//!
//! Resolution rewrites a merged tree into one with no placeholder nodes.
//! References evaluate against the final merged root, so a substitution can
//! see values contributed by any layer. The interesting machinery:
//!
//! - a stack of in-progress reference paths detects cycles
//! - delayed merges resolve layer by layer; while a placeholder layer is
//!   being resolved, a reference to the merge's own path means "the merge of
//!   the layers below this one" (the look-back rule that makes
//!   `a = 1` + `a = ${a}` yield 1 instead of a cycle)
//! - absent results propagate: an unset `${?path}` field disappears from its
//!   object, vanishes from concatenations and lists
//! - paths that the tree cannot satisfy are offered to an external
//!   [PathResolver] chain before being declared unresolvable
//!
//! With [ResolveOptions::allow_unresolved] a tree may be resolved partially:
//! values blocked on an unknown path are kept verbatim and the rest of the
//! tree is rewritten as usual.

use std::collections::HashMap;

use crate::error::{ConfigError, Result};
use crate::merge::merge_all;
use crate::origin::Origin;
use crate::path::Path;
use crate::value::{ConfigValue, Fields, ValueKind};

/// Supplies values for paths the document tree cannot satisfy
///
/// Resolvers are consulted in order after the merged tree itself comes up
/// empty. Returned values are used as-is and must not contain placeholders.
pub trait PathResolver {
    fn lookup(&self, path: &Path) -> Option<ConfigValue>;
}

/// Resolves paths against process environment variables, by rendered name
pub struct EnvResolver;

impl PathResolver for EnvResolver {
    fn lookup(&self, path: &Path) -> Option<ConfigValue> {
        let name = path.render();
        std::env::var(&name).ok().map(|value| {
            ConfigValue::string(Origin::new_simple(format!("env variable {name}")), value)
        })
    }
}

#[derive(Default)]
pub struct ResolveOptions {
    /// Keep values blocked on unknown paths instead of failing
    pub allow_unresolved: bool,
    /// External fallbacks for paths absent from the tree, tried in order
    pub resolvers: Vec<Box<dyn PathResolver>>,
}

impl ResolveOptions {
    pub fn partial() -> Self {
        ResolveOptions {
            allow_unresolved: true,
            ..ResolveOptions::default()
        }
    }

    pub fn with_resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

/// Resolve every substitution in `root`, returning the rewritten tree
pub fn resolve(root: &ConfigValue, options: &ResolveOptions) -> Result<ConfigValue> {
    let mut context = ResolveContext {
        root,
        options,
        stack: Vec::new(),
        replacements: Vec::new(),
        memo: HashMap::new(),
    };
    match context.resolve_value(root, None)? {
        Some(resolved) => Ok(resolved),
        None => Err(ConfigError::bug("root value resolved to nothing")),
    }
}

struct ResolveContext<'a> {
    root: &'a ConfigValue,
    options: &'a ResolveOptions,
    /// reference paths currently being evaluated, for cycle detection
    stack: Vec<Path>,
    /// look-back substitutes: while a delayed merge at `path` works through a
    /// placeholder layer, a reference to `path` means the merge of the layers
    /// below it (None when no layers remain)
    replacements: Vec<(Path, Option<ConfigValue>)>,
    /// finished lookups; only valid for lookups done with no replacement in
    /// scope, since a replacement changes what a path means
    memo: HashMap<Path, Option<ConfigValue>>,
}

impl<'a> ResolveContext<'a> {
    /// Resolve one node; `at` is its path from the root, when it has one
    ///
    /// `Ok(None)` means the value is absent (an unset optional reference, or
    /// something built only from absent pieces) and should disappear from the
    /// enclosing container.
    fn resolve_value(
        &mut self,
        value: &ConfigValue,
        at: Option<&Path>,
    ) -> Result<Option<ConfigValue>> {
        match &value.kind {
            ValueKind::Null
            | ValueKind::Boolean(_)
            | ValueKind::Integer(_)
            | ValueKind::Decimal(_)
            | ValueKind::String(_) => Ok(Some(value.clone())),

            ValueKind::Array(elements) => {
                let mut resolved = Vec::with_capacity(elements.len());
                for element in elements {
                    // list elements have no path, so no look-back below here
                    if let Some(v) = self.resolve_or_keep(element, None)? {
                        resolved.push(v);
                    }
                }
                Ok(Some(ConfigValue::array(value.origin.clone(), resolved)))
            }

            ValueKind::Object(fields) => {
                let mut resolved = Fields::with_capacity(fields.len());
                for (key, child) in fields {
                    let child_at = match at {
                        Some(path) => path.join(key.clone()),
                        None => Path::from_key(key.clone()),
                    };
                    if let Some(v) = self.resolve_or_keep(child, Some(&child_at))? {
                        resolved.insert(key.clone(), v);
                    }
                }
                Ok(Some(ConfigValue::object(value.origin.clone(), resolved)))
            }

            ValueKind::Reference {
                path,
                optional,
                prefix_len,
            } => self.resolve_reference(&value.origin, path, *optional, *prefix_len),

            ValueKind::Concat(pieces) => {
                let mut resolved = Vec::with_capacity(pieces.len());
                for piece in pieces {
                    if let Some(v) = self.resolve_value(piece, None)? {
                        resolved.push(v);
                    }
                }
                if resolved.is_empty() {
                    return Ok(None);
                }
                let mut joined = consolidate_pieces(resolved)?;
                if joined.len() != 1 {
                    return Err(ConfigError::bug(
                        "concatenation of resolved pieces did not collapse",
                    ));
                }
                Ok(joined.pop())
            }

            ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) => {
                self.resolve_delayed(stack, at)
            }
        }
    }

    /// Partial mode keeps a value that only fails for being unresolvable
    fn resolve_or_keep(
        &mut self,
        value: &ConfigValue,
        at: Option<&Path>,
    ) -> Result<Option<ConfigValue>> {
        match self.resolve_value(value, at) {
            Err(ConfigError::UnresolvedSubstitution { .. }) if self.options.allow_unresolved => {
                Ok(Some(value.clone()))
            }
            other => other,
        }
    }

    fn resolve_reference(
        &mut self,
        origin: &Origin,
        path: &Path,
        optional: bool,
        prefix_len: usize,
    ) -> Result<Option<ConfigValue>> {
        if let Some(position) = self.stack.iter().position(|p| p == path) {
            if optional {
                return Ok(None);
            }
            let chain = self.stack[position..]
                .iter()
                .map(|p| format!("${{{p}}}"))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigError::unresolved(
                origin,
                format!("${{{path}}} is part of a cycle of substitutions: {chain} -> ${{{path}}}"),
            ));
        }

        self.stack.push(path.clone());
        let mut found = self.lookup_path(path);
        // a reference relativized under an include prefix retries against the
        // including document's root
        if matches!(found, Ok(None)) && prefix_len > 0 {
            if let Some(stripped) = path.sub_path(prefix_len) {
                found = self.lookup_path(&stripped);
            }
        }
        self.stack.pop();

        match found? {
            Some(value) => Ok(Some(value)),
            None => {
                for resolver in &self.options.resolvers {
                    if let Some(value) = resolver.lookup(path) {
                        tracing::debug!(%path, "substitution satisfied by external resolver");
                        return Ok(Some(value));
                    }
                }
                if optional {
                    Ok(None)
                } else {
                    Err(ConfigError::unresolved(
                        origin,
                        format!("could not resolve substitution to a value: ${{{path}}}"),
                    ))
                }
            }
        }
    }

    /// Find the value for a reference path: an active look-back replacement
    /// if one matches, otherwise a walk down the merged root
    fn lookup_path(&mut self, path: &Path) -> Result<Option<ConfigValue>> {
        if let Some(index) = self.replacements.iter().rposition(|(p, _)| p == path) {
            let replacement = self.replacements[index].1.clone();
            // the replacement must not see itself while it resolves; deeper
            // look-backs for the same path use entries below it
            let saved = self.replacements.split_off(index);
            let result = match &replacement {
                Some(value) => self.resolve_value(value, Some(path)),
                None => Ok(None),
            };
            self.replacements.extend(saved);
            return result;
        }

        if self.replacements.is_empty() {
            if let Some(cached) = self.memo.get(path) {
                return Ok(cached.clone());
            }
        }

        let root = self.root;
        let mut current = root.clone();
        for (index, segment) in path.segments().iter().enumerate() {
            if current.is_placeholder() {
                if index == 0 {
                    return Err(ConfigError::bug("root of the tree is not an object"));
                }
                // an unresolved container on the way down is evaluated at its
                // own path first
                let container_at = Path::new(path.segments()[..index].to_vec());
                current = match self.resolve_value(&current, Some(&container_at))? {
                    Some(value) => value,
                    None => return Ok(None),
                };
            }
            let ValueKind::Object(fields) = &current.kind else {
                return Ok(None);
            };
            current = match fields.get(segment) {
                Some(child) => child.clone(),
                None => return Ok(None),
            };
        }

        let resolved = self.resolve_value(&current, Some(path))?;
        if self.replacements.is_empty() {
            self.memo.insert(path.clone(), resolved.clone());
        }
        Ok(resolved)
    }

    /// Fold a delayed merge stack, resolving each layer at the merge's path
    ///
    /// Layers fold top down and stop early once the partial result ignores
    /// fallbacks. Layers that resolve to nothing are skipped; a stack of
    /// nothing but absences is itself absent.
    fn resolve_delayed(
        &mut self,
        stack: &[ConfigValue],
        at: Option<&Path>,
    ) -> Result<Option<ConfigValue>> {
        let mut merged: Option<ConfigValue> = None;

        for (index, layer) in stack.iter().enumerate() {
            let resolved_layer = match at {
                Some(path) if layer.is_placeholder() => {
                    let remainder = merge_all(stack[index + 1..].iter().cloned());
                    self.replacements.push((path.clone(), remainder));
                    let result = self.resolve_value(layer, at);
                    self.replacements.pop();
                    result?
                }
                _ => self.resolve_value(layer, at)?,
            };

            if let Some(value) = resolved_layer {
                let combined = match merged {
                    None => value,
                    Some(above) => above.with_fallback(&value),
                };
                let done = combined.ignores_fallbacks();
                merged = Some(combined);
                if done {
                    break;
                }
            }
        }

        Ok(merged)
    }
}

/// Join adjacent concatenation pieces that are already resolved
///
/// Placeholder pieces stay put and split the joining. Used at parse time (so
/// `a = foo bar` never produces a placeholder at all) and again on the fully
/// resolved pieces during resolution, where the result must collapse to a
/// single value.
pub(crate) fn consolidate_pieces(pieces: Vec<ConfigValue>) -> Result<Vec<ConfigValue>> {
    let mut out: Vec<ConfigValue> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match out.last() {
            Some(last) if !last.is_placeholder() && !piece.is_placeholder() => {
                let left = out.pop().expect("last checked above");
                out.push(join_pair(left, piece)?);
            }
            _ => out.push(piece),
        }
    }
    Ok(out)
}

/// Join two adjacent resolved pieces
///
/// Lists concatenate, objects merge with the right side winning, simple
/// values join as text. A whitespace-only string next to a list or object is
/// separator noise and is dropped. Anything else is a type error.
fn join_pair(left: ConfigValue, right: ConfigValue) -> Result<ConfigValue> {
    match (&left.kind, &right.kind) {
        (ValueKind::Array(a), ValueKind::Array(b)) => {
            let mut elements = a.clone();
            elements.extend(b.iter().cloned());
            Ok(ConfigValue::array(
                Origin::merged(&left.origin, &right.origin),
                elements,
            ))
        }
        (ValueKind::Object(_), ValueKind::Object(_)) => Ok(right.with_fallback(&left)),
        (ValueKind::String(s), ValueKind::Array(_) | ValueKind::Object(_))
            if s.trim().is_empty() =>
        {
            Ok(right)
        }
        (ValueKind::Array(_) | ValueKind::Object(_), ValueKind::String(s))
            if s.trim().is_empty() =>
        {
            Ok(left)
        }
        _ if is_textual(&left) && is_textual(&right) => {
            let origin = Origin::merged(&left.origin, &right.origin);
            let mut text = text_of(&left);
            text.push_str(&text_of(&right));
            Ok(ConfigValue::string(origin, text))
        }
        _ => Err(ConfigError::wrong_type(
            &left.origin,
            format!("Cannot concatenate {left} and {right}"),
        )),
    }
}

fn is_textual(value: &ConfigValue) -> bool {
    matches!(
        value.kind,
        ValueKind::Null
            | ValueKind::Boolean(_)
            | ValueKind::Integer(_)
            | ValueKind::Decimal(_)
            | ValueKind::String(_)
    )
}

/// Unquoted text form of a simple value, for joining into strings
fn text_of(value: &ConfigValue) -> String {
    match &value.kind {
        ValueKind::Null => "null".to_string(),
        ValueKind::Boolean(b) => b.to_string(),
        ValueKind::Integer(n) => n.to_string(),
        ValueKind::Decimal(d) => crate::util::render_decimal(*d),
        ValueKind::String(s) => s.clone(),
        other => unreachable!("not a simple value: {other:?}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse_str;
    use pretty_assertions::assert_eq;

    fn resolve_doc(text: &str) -> ConfigValue {
        resolve(&parse_str(text).unwrap(), &ResolveOptions::default()).unwrap()
    }

    fn resolve_docs(texts: &[&str]) -> Result<ConfigValue> {
        // later documents win over earlier ones
        let merged = texts
            .iter()
            .rev()
            .map(|t| parse_str(t).unwrap())
            .reduce(|higher, lower| higher.with_fallback(&lower))
            .unwrap();
        resolve(&merged, &ResolveOptions::default())
    }

    #[test]
    fn simple_reference() {
        let root = resolve_doc("a = 1\nb = ${a}");
        assert_eq!(root.get("b").unwrap().unwrap(), &ConfigValue::from(1i64));
    }

    #[test]
    fn reference_sees_final_merged_value() {
        let root = resolve_docs(&["a = 1\nb = ${a}", "a = 2"]).unwrap();
        assert_eq!(root.get("b").unwrap().unwrap(), &ConfigValue::from(2i64));
    }

    #[test]
    fn reference_through_unresolved_container() {
        let root = resolve_doc("a = ${b}\nb = { x = 1 }\nc = ${a.x}");
        assert_eq!(root.get("c").unwrap().unwrap(), &ConfigValue::from(1i64));
    }

    #[test]
    fn direct_cycle_fails() {
        let err = resolve_docs(&["a = ${a}"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedSubstitution { .. }));
        let message = err.to_string();
        assert!(message.contains("cycle"), "message: {message}");
        assert!(message.contains("${a}"), "message: {message}");
    }

    #[test]
    fn long_cycle_fails() {
        let err = resolve_docs(&["a = ${b}\nb = ${c}\nc = ${d}\nd = ${a}"]).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn self_reference_looks_back() {
        let root = resolve_docs(&["a = 1", "a = ${a}"]).unwrap();
        assert_eq!(root.get("a").unwrap().unwrap(), &ConfigValue::from(1i64));
    }

    #[test]
    fn self_reference_with_no_layer_below_is_a_cycle() {
        let err = resolve_docs(&["a = ${a}", "a = ${a}"]).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn optional_self_reference_vanishes() {
        let root = resolve_doc("a = ${?a}");
        assert_eq!(root.get("a").unwrap(), None);
    }

    #[test]
    fn optional_missing_field_vanishes() {
        let root = resolve_doc("foo = ${?bar}");
        assert_eq!(root.get("foo").unwrap(), None);
    }

    #[test]
    fn optional_missing_in_concat_vanishes() {
        let root = resolve_doc("foo = a${?bar}c");
        assert_eq!(root.get("foo").unwrap().unwrap().as_str().unwrap(), "ac");
    }

    #[test]
    fn object_concat_stacks_merge() {
        let root = resolve_doc("a = { b = 1 } { b = 2 } { b = 3 } { b = 4 }");
        assert_eq!(root.get("a.b").unwrap().unwrap(), &ConfigValue::from(4i64));
    }

    #[test]
    fn list_concat_through_substitution() {
        let root = resolve_doc("x = [1, 2]\na = ${x} [3]");
        assert_eq!(
            root.get("a").unwrap().unwrap(),
            &ConfigValue::from(vec![1i64, 2, 3])
        );
    }

    #[test]
    fn string_concat_through_substitution_keeps_spacing() {
        let root = resolve_doc("x = val\na = ${x} tail");
        assert_eq!(root.get("a").unwrap().unwrap().as_str().unwrap(), "val tail");
    }

    #[test]
    fn append_accumulates_across_layers() {
        let root = resolve_docs(&["a = [1]", "a += 2\na += 3"]).unwrap();
        assert_eq!(
            root.get("a").unwrap().unwrap(),
            &ConfigValue::from(vec![1i64, 2, 3])
        );
    }

    #[test]
    fn append_without_prior_value_starts_fresh() {
        let root = resolve_doc("a += 2");
        assert_eq!(root.get("a").unwrap().unwrap(), &ConfigValue::from(vec![2i64]));
    }

    #[test]
    fn delayed_merge_object_resolves_per_key() {
        let root = resolve_docs(&["a = ${b}\nb = { x = 1, y = 2 }", "a = { x = 10 }"]).unwrap();
        assert_eq!(root.get("a.x").unwrap().unwrap(), &ConfigValue::from(10i64));
        assert_eq!(root.get("a.y").unwrap().unwrap(), &ConfigValue::from(2i64));
    }

    #[test]
    fn primitive_layer_blocks_merge_below_substitution() {
        let root = resolve_docs(&["a = { x = 1 }", "a = ${b}\nb = 5"]).unwrap();
        assert_eq!(root.get("a").unwrap().unwrap(), &ConfigValue::from(5i64));
    }

    #[test]
    fn absent_optional_layer_falls_through() {
        let root = resolve_docs(&["a = { x = 1 }", "a = ${?nope}"]).unwrap();
        assert_eq!(root.get("a.x").unwrap().unwrap(), &ConfigValue::from(1i64));
    }

    #[test]
    fn missing_reference_names_the_path() {
        let err = resolve_docs(&["a = ${no.such.path}"]).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ConfigError::UnresolvedSubstitution { .. }));
        assert!(message.contains("${no.such.path}"), "message: {message}");
    }

    #[test]
    fn partial_resolution_keeps_blocked_values() {
        let parsed = parse_str("a = ${missing}\nb = ${a2}\na2 = 1").unwrap();
        let root = resolve(&parsed, &ResolveOptions::partial()).unwrap();
        assert_eq!(root.get("b").unwrap().unwrap(), &ConfigValue::from(1i64));
        let a = root.get("a").unwrap().unwrap();
        assert!(matches!(a.kind, ValueKind::Reference { .. }));
    }

    #[test]
    fn external_resolver_fills_missing_paths() {
        struct Fixed;
        impl PathResolver for Fixed {
            fn lookup(&self, path: &Path) -> Option<ConfigValue> {
                (path.render() == "external.answer").then(|| ConfigValue::from(42i64))
            }
        }

        let parsed = parse_str("a = ${external.answer}").unwrap();
        let options = ResolveOptions::default().with_resolver(Fixed);
        let root = resolve(&parsed, &options).unwrap();
        assert_eq!(root.get("a").unwrap().unwrap(), &ConfigValue::from(42i64));
    }

    #[test]
    fn tree_wins_over_external_resolver() {
        struct Always;
        impl PathResolver for Always {
            fn lookup(&self, _path: &Path) -> Option<ConfigValue> {
                Some(ConfigValue::from("external"))
            }
        }

        let parsed = parse_str("a = 1\nb = ${a}").unwrap();
        let options = ResolveOptions::default().with_resolver(Always);
        let root = resolve(&parsed, &options).unwrap();
        assert_eq!(root.get("b").unwrap().unwrap(), &ConfigValue::from(1i64));
    }

    #[test]
    fn resolved_tree_has_no_placeholders() {
        use crate::value::ResolveStatus;
        let root = resolve_doc("a = ${b}\nb = { c = ${d} }\nd = [${b.c2}, 2]\nb.c2 = 1");
        assert_eq!(root.resolve_status(), ResolveStatus::Resolved);
    }
}
