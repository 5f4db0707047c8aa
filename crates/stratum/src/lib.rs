//! # stratum - layered configuration
//!
//! Loads declarative configuration documents, stacks any number of them into
//! one tree, and evaluates cross-references between values.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `stratum` works internally.
//!
//! ### Terms
//!
//! - a *document* is one source of configuration (a file, a string, an
//!   include); it parses to an object-shaped [value::ConfigValue]
//! - a *layer stack* is an ordered pile of documents, highest priority first;
//!   stacking is just [value::ConfigValue::with_fallback] folded over it
//! - a *path* ([path::Path]) addresses a value inside the tree, `a.b.c`
//!   style, where a quoted segment may itself contain dots
//! - a *substitution* is a `${path}` expression referring to another value in
//!   the final stacked tree
//!
//! This is a valid document:
//! ```text
//! # single line comments work like this
//! // ...or like this
//!
//! an_unquoted_key = and an unquoted value
//!
//! server {
//!     port = 8080
//!     url = "http://localhost:"${server.port}
//! }
//!
//! retries = [1, 2]
//! retries += 3
//! ```
//!
//! ### Pipeline
//!
//! Text runs through [tokens::tokenize] and [parser::parse], producing a tree
//! of [value::ConfigValue] nodes. Three node kinds are placeholders standing
//! for values that are not known yet: references, concatenations and delayed
//! merges. Everything a document can express, including those placeholders,
//! survives a round trip through [render::render].
//!
//! Stacking happens before evaluation, so [value::ConfigValue::with_fallback]
//! cannot assume it knows the shape of an unresolved value; merges touching a
//! placeholder are recorded as ordered layer lists (delayed merges) instead
//! of being computed. See [merge] for why this keeps stacking associative.
//!
//! [resolve::resolve] then rewrites the tree in place of every placeholder,
//! evaluating references against the final merged root, detecting cycles, and
//! applying the look-back rule that lets `a = ${a}` refer to a lower layer's
//! value of `a`. Paths the tree cannot satisfy can be delegated to external
//! [resolve::PathResolver]s such as [resolve::EnvResolver].
//!
//! Reads on the resolved tree are plain typed accessors on
//! [value::ConfigValue]; reading through a leftover placeholder is an error
//! rather than a silent wrong answer.

pub mod error;
pub mod loader;
pub mod merge;
pub mod origin;
pub mod parser;
pub mod path;
pub mod render;
pub mod resolve;
pub mod tokens;
mod util;
pub mod value;

pub use error::{ConfigError, Result};
pub use loader::{load_file, ConfigCache, FileLoader, IncludeLoader, IncludeSpec, NullLoader};
pub use origin::Origin;
pub use parser::{parse, parse_str, ParseOptions, Syntax};
pub use path::Path;
pub use render::{render, RenderOptions};
pub use resolve::{resolve, EnvResolver, PathResolver, ResolveOptions};
pub use value::{ConfigValue, Fields, ResolveStatus, ValueKind};

/// Parse native-syntax documents into one merged tree, panicking on bad input
///
/// With several documents the first is the highest priority layer. Intended
/// for tests and fixtures; real callers parse and merge explicitly.
#[macro_export]
macro_rules! conf {
    { $text:expr } => {
        $crate::parser::parse_str($text).expect("document must parse")
    };
    { $first:expr, $($rest:expr),+ $(,)? } => {{
        let mut merged = $crate::parser::parse_str($first).expect("document must parse");
        $(
            merged = merged
                .with_fallback(&$crate::parser::parse_str($rest).expect("document must parse"));
        )+
        merged
    }};
}
