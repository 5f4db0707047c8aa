//! loading documents and includes
//!
//! The parser is file-system agnostic; it hands every include directive to an
//! [IncludeLoader] and merges whatever comes back. [FileLoader] is the
//! standard implementation: it resolves names against a base directory,
//! picks the syntax from the file extension, and for an extension-less
//! heuristic include stacks every sibling format it finds. A missing file is
//! simply an absent include; the parser decides whether that is fatal
//! (`required(...)`) or not.

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};

use crate::error::Result;
use crate::origin::Origin;
use crate::parser::{parse, ParseOptions, Syntax};
use crate::value::ConfigValue;

/// An include directive as written in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeSpec {
    /// `include "name"`: location left to the loader; a name without an
    /// extension means "every format you can find"
    Heuristic(String),
    /// `include file("name")`
    File(String),
    /// `include url("name")`
    Url(String),
    /// `include classpath("name")`
    Classpath(String),
}

/// Supplies parsed trees for include directives
pub trait IncludeLoader {
    /// `Ok(None)` when the included document does not exist
    fn load(&self, spec: &IncludeSpec, origin: &Origin) -> Result<Option<ConfigValue>>;
}

/// Loader that finds nothing, for documents that must not touch the
/// file system
pub struct NullLoader;

impl IncludeLoader for NullLoader {
    fn load(&self, spec: &IncludeSpec, _origin: &Origin) -> Result<Option<ConfigValue>> {
        tracing::debug!(?spec, "includes disabled, treating as absent");
        Ok(None)
    }
}

/// Loads includes from disk, relative to a base directory
#[derive(derive_new::new)]
pub struct FileLoader {
    #[new(into)]
    base_dir: PathBuf,
}

impl FileLoader {
    fn load_single(&self, path: &FsPath) -> Result<Option<ConfigValue>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // nested includes resolve relative to the included file
        let nested = FileLoader::new(path.parent().unwrap_or(FsPath::new(".")));
        let options = ParseOptions {
            syntax: Syntax::from_extension(path),
            loader: &nested,
        };
        parse(&text, &Origin::new_file(path), &options).map(Some)
    }
}

impl IncludeLoader for FileLoader {
    fn load(&self, spec: &IncludeSpec, _origin: &Origin) -> Result<Option<ConfigValue>> {
        let name = match spec {
            IncludeSpec::File(name) => name,
            IncludeSpec::Heuristic(name) => name,
            IncludeSpec::Url(_) | IncludeSpec::Classpath(_) => {
                tracing::debug!(?spec, "include location type not supported, skipping");
                return Ok(None);
            }
        };

        let base = self.base_dir.join(name);
        let is_heuristic = matches!(spec, IncludeSpec::Heuristic(_));
        if !is_heuristic || base.extension().is_some() {
            return self.load_single(&base);
        }

        // extension-less heuristic include: stack whatever formats exist,
        // native syntax winning over json winning over properties
        let mut merged: Option<ConfigValue> = None;
        for extension in ["conf", "json", "properties"] {
            if let Some(tree) = self.load_single(&base.with_extension(extension))? {
                merged = Some(match merged {
                    None => tree,
                    Some(higher) => higher.with_fallback(&tree),
                });
            }
        }
        Ok(merged)
    }
}

/// Parse the document at `path`, includes resolved relative to it
pub fn load_file(path: impl AsRef<FsPath>) -> Result<ConfigValue> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let loader = FileLoader::new(path.parent().unwrap_or(FsPath::new(".")));
    let options = ParseOptions {
        syntax: Syntax::from_extension(path),
        loader: &loader,
    };
    parse(&text, &Origin::new_file(path), &options)
}

/// Caches parsed (unresolved) trees by file path
///
/// Trees cache pre-resolution so one file can participate in several stacks
/// with different override layers.
#[derive(Default)]
pub struct ConfigCache {
    entries: HashMap<PathBuf, ConfigValue>,
}

impl ConfigCache {
    pub fn new() -> Self {
        ConfigCache::default()
    }

    pub fn load(&mut self, path: impl AsRef<FsPath>) -> Result<ConfigValue> {
        let path = path.as_ref();
        if let Some(cached) = self.entries.get(path) {
            return Ok(cached.clone());
        }
        let tree = load_file(path)?;
        self.entries.insert(path.to_path_buf(), tree.clone());
        Ok(tree)
    }

    pub fn invalidate(&mut self, path: impl AsRef<FsPath>) {
        self.entries.remove(path.as_ref());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Workspace {
        dir: PathBuf,
    }

    impl Workspace {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("stratum-{}-{name}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            Workspace { dir }
        }

        fn write(&self, name: &str, text: &str) -> PathBuf {
            let path = self.dir.join(name);
            std::fs::write(&path, text).unwrap();
            path
        }
    }

    impl Drop for Workspace {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn load_file_with_include() {
        let ws = Workspace::new("include");
        ws.write("base.conf", "a = 1\nb = 2");
        let main = ws.write("main.conf", "include \"base.conf\"\nb = 3");

        let root = load_file(&main).unwrap();
        assert_eq!(root.get("a").unwrap().unwrap(), &ConfigValue::from(1i64));
        assert_eq!(root.get("b").unwrap().unwrap(), &ConfigValue::from(3i64));
    }

    #[test]
    fn heuristic_include_stacks_formats() {
        let ws = Workspace::new("heuristic");
        ws.write("app.conf", "x = from-conf");
        ws.write("app.json", "{ \"x\": \"from-json\", \"y\": \"json-only\" }");
        let main = ws.write("main.conf", "include \"app\"");

        let root = load_file(&main).unwrap();
        assert_eq!(
            root.get("x").unwrap().unwrap().as_str().unwrap(),
            "from-conf"
        );
        assert_eq!(
            root.get("y").unwrap().unwrap().as_str().unwrap(),
            "json-only"
        );
    }

    #[test]
    fn missing_include_is_absent() {
        let ws = Workspace::new("missing");
        let main = ws.write("main.conf", "include \"nope\"\na = 1");
        let root = load_file(&main).unwrap();
        assert_eq!(root.get("a").unwrap().unwrap(), &ConfigValue::from(1i64));
    }

    #[test]
    fn syntax_follows_extension() {
        let ws = Workspace::new("syntax");
        let props = ws.write("app.properties", "server.port = 8080\n# comment\n");
        let root = load_file(&props).unwrap();
        assert_eq!(
            root.get("server.port").unwrap().unwrap().as_str().unwrap(),
            "8080"
        );
    }

    #[test]
    fn origin_records_the_file() {
        let ws = Workspace::new("origin");
        let main = ws.write("main.conf", "a = 1");
        let root = load_file(&main).unwrap();
        let a = root.get("a").unwrap().unwrap();
        assert!(a.origin.description().contains("main.conf"));
        assert_eq!(a.origin.line(), Some(1));
    }

    #[test]
    fn cache_returns_same_tree_until_invalidated() {
        let ws = Workspace::new("cache");
        let main = ws.write("main.conf", "a = 1");

        let mut cache = ConfigCache::new();
        let first = cache.load(&main).unwrap();

        ws.write("main.conf", "a = 2");
        let second = cache.load(&main).unwrap();
        assert_eq!(first, second);

        cache.invalidate(&main);
        let third = cache.load(&main).unwrap();
        assert_eq!(third.get("a").unwrap().unwrap(), &ConfigValue::from(2i64));
    }
}
