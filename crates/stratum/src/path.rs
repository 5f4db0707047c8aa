//! dotted-key paths
//!
//! A [Path] is a non-empty ordered sequence of string key segments. Segment
//! text is arbitrary; a literal key containing a dot (written quoted in a
//! document, e.g. `"a.b"`) stays one segment and is distinguished from the
//! two-segment path `a.b` all the way through parsing, resolution and
//! rendering.

use crate::error::{ConfigError, Result};
use crate::util::{is_safe_unquoted, render_json_string};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Build a path from segments
    ///
    /// # Panic
    /// Panics when `segments` is empty. Paths are non-empty by construction.
    pub fn new(segments: Vec<String>) -> Self {
        assert!(!segments.is_empty(), "a path must have at least one segment");
        Path { segments }
    }

    /// Single-segment path from a literal key, no dot splitting
    pub fn from_key(key: impl Into<String>) -> Self {
        Path {
            segments: vec![key.into()],
        }
    }

    /// Parse dotted path text
    ///
    /// Accepts dot-separated unquoted tokens (letters, digits, `-`, `_`) and
    /// quoted segments (arbitrary text, including embedded dots and the empty
    /// string). Leading, trailing or doubled separators are a
    /// [ConfigError::BadPath].
    pub fn parse(text: &str) -> Result<Self> {
        let bad = |message: &str| ConfigError::BadPath {
            path: text.to_string(),
            message: message.to_string(),
        };

        if text.is_empty() {
            return Err(bad("path text is empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        // quoted empty segments count as content, so track this separately
        let mut has_content = false;

        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !has_content {
                        return Err(bad("leading or doubled '.' separator"));
                    }
                    segments.push(std::mem::take(&mut current));
                    has_content = false;
                }
                '"' => {
                    let mut closed = false;
                    while let Some(q) = chars.next() {
                        match q {
                            '"' => {
                                closed = true;
                                break;
                            }
                            '\\' => match chars.next() {
                                Some('"') => current.push('"'),
                                Some('\\') => current.push('\\'),
                                Some('n') => current.push('\n'),
                                Some('t') => current.push('\t'),
                                Some('r') => current.push('\r'),
                                Some(other) => {
                                    return Err(bad(&format!(
                                        "unknown escape '\\{other}' in quoted segment"
                                    )))
                                }
                                None => return Err(bad("unterminated quoted segment")),
                            },
                            q => current.push(q),
                        }
                    }
                    if !closed {
                        return Err(bad("unterminated quoted segment"));
                    }
                    has_content = true;
                }
                c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => {
                    current.push(c);
                    has_content = true;
                }
                c => {
                    return Err(bad(&format!(
                        "invalid character '{c}' in unquoted path segment (use quotes)"
                    )))
                }
            }
        }

        if !has_content {
            return Err(bad("trailing '.' separator"));
        }
        segments.push(current);

        Ok(Path::new(segments))
    }

    /// Render with minimal quoting
    ///
    /// A segment is re-quoted only if it is empty, contains a dot or is
    /// otherwise not a safe unquoted token.
    pub fn render(&self) -> String {
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|segment| {
                if is_safe_unquoted(segment) {
                    segment.clone()
                } else {
                    render_json_string(segment)
                }
            })
            .collect();
        rendered.join(".")
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    pub fn last(&self) -> &str {
        self.segments.last().expect("paths are non-empty")
    }

    /// Everything but the last segment, or None for a 1-segment path
    pub fn parent(&self) -> Option<Path> {
        if self.segments.len() == 1 {
            return None;
        }
        Some(Path::new(
            self.segments[..self.segments.len() - 1].to_vec(),
        ))
    }

    /// New path with `prefix` segments in front
    pub fn prepend(&self, prefix: &Path) -> Path {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        Path::new(segments)
    }

    /// New path with `key` appended
    pub fn join(&self, key: impl Into<String>) -> Path {
        let mut segments = self.segments.clone();
        segments.push(key.into());
        Path::new(segments)
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Path without the first `from` segments, or None if too short
    pub fn sub_path(&self, from: usize) -> Option<Path> {
        if from >= self.segments.len() {
            return None;
        }
        Some(Path::new(self.segments[from..].to_vec()))
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Path {
    /// Single-segment path; use [Path::parse] for dotted text
    fn from(key: &str) -> Self {
        Path::from_key(key)
    }
}
