//! fallback merging
//!
//! `primary.with_fallback(fallback)` combines two trees, primary winning.
//! The operation is associative over any left-to-right grouping of a layer
//! stack, which is what lets callers fold a pile of documents in either
//! direction and get the same result.
//!
//! We want to merge the document stack first and evaluate substitutions
//! second, but two substitutions might both expand to objects that then need
//! merging. So a merge can never "override" an unresolved value; instead the
//! ordered layer list is kept as a delayed-merge node and finished during
//! resolution.

use crate::origin::Origin;
use crate::value::{ConfigValue, Fields, ValueKind};

impl ConfigValue {
    /// Merge `fallback` underneath this value, returning the combined tree
    pub fn with_fallback(&self, fallback: &ConfigValue) -> ConfigValue {
        if self.ignores_fallbacks() {
            // further layers are dead code under this value
            return self.clone();
        }

        if self.is_placeholder() || fallback.is_placeholder() {
            let mut stack = Vec::new();
            flatten_into(self, &mut stack);
            flatten_into(fallback, &mut stack);
            return make_delayed(Origin::merged(&self.origin, &fallback.origin), stack);
        }

        match (&self.kind, &fallback.kind) {
            (ValueKind::Object(primary), ValueKind::Object(secondary)) => {
                merge_objects(&self.origin, primary, &fallback.origin, secondary)
            }
            // resolved non-object fallback contributes nothing under an object
            (ValueKind::Object(_), _) => self.clone(),
            _ => self.clone(),
        }
    }
}

/// Recursive per-key merge of two objects
fn merge_objects(
    primary_origin: &Origin,
    primary: &Fields,
    fallback_origin: &Origin,
    fallback: &Fields,
) -> ConfigValue {
    let mut merged = Fields::with_capacity(primary.len().max(fallback.len()));

    for (key, value) in primary {
        match fallback.get(key) {
            Some(under) => merged.insert(key.clone(), value.with_fallback(under)),
            None => merged.insert(key.clone(), value.clone()),
        };
    }
    for (key, value) in fallback {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    ConfigValue::object(Origin::merged(primary_origin, fallback_origin), merged)
}

/// Append a value to a merge stack, splicing open existing delayed merges
///
/// Delayed merge stacks never nest; nesting would hide layers from the
/// look-back rule during resolution.
fn flatten_into(value: &ConfigValue, out: &mut Vec<ConfigValue>) {
    match &value.kind {
        ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) => {
            out.extend(stack.iter().cloned())
        }
        _ => out.push(value.clone()),
    }
}

/// Build a delayed merge from an ordered layer stack, highest priority first
///
/// A one-layer stack is just that layer. The object-shaped variant is chosen
/// when the top layer is already known to be an object, since then the merge
/// can only produce an object or fail.
pub(crate) fn make_delayed(origin: Origin, mut stack: Vec<ConfigValue>) -> ConfigValue {
    assert!(!stack.is_empty(), "delayed merge stacks are non-empty");

    if stack.len() == 1 {
        return stack.pop().expect("len checked above");
    }

    let statically_object = matches!(
        stack[0].kind,
        ValueKind::Object(_) | ValueKind::DelayedMergeObject(_)
    );
    if statically_object {
        ConfigValue::new(origin, ValueKind::DelayedMergeObject(stack))
    } else {
        ConfigValue::new(origin, ValueKind::DelayedMerge(stack))
    }
}

/// Fold an ordered iterator of layers (highest priority first) into one tree
pub fn merge_all<I>(layers: I) -> Option<ConfigValue>
where
    I: IntoIterator<Item = ConfigValue>,
{
    layers
        .into_iter()
        .reduce(|merged, next| merged.with_fallback(&next))
}
