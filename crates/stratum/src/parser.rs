//! document parsing
//!
//! Consumes the token stream from [crate::tokens] and produces a single root
//! [ConfigValue]. The rules that feed merge semantics live here:
//!
//! - duplicate keys at one nesting level are merged as they are seen, later
//!   definitions over earlier ones (`with_fallback` applied during parse)
//! - path-valued keys (`a.b.c = 1`) expand into nested single-key objects
//! - `key += v` desugars to `key = ${?key} [v]`, an implicitly-optional
//!   self-referential list concatenation
//! - adjacent values on one line become concatenation pieces; pieces that are
//!   already resolved are joined eagerly, so only pieces blocked on a
//!   substitution survive as placeholder nodes
//! - include directives are forwarded to the [IncludeLoader] collaborator and
//!   the returned tree is merged at the inclusion point, before sibling keys
//!   that follow it textually
//!
//! JSON mode rejects every native-only construct with an error naming it.

use crate::error::{ConfigError, Result};
use crate::loader::{IncludeLoader, IncludeSpec, NullLoader};
use crate::origin::Origin;
use crate::path::Path;
use crate::resolve::consolidate_pieces;
use crate::tokens::{tokenize, Token, TokenWithOrigin};
use crate::value::{ConfigValue, Fields, ValueKind};

/// Declared syntax of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Native declarative format: comments, optional quoting, substitutions,
    /// concatenation, `+=`, includes
    Conf,
    /// JSON-compatible subset
    Json,
    /// Flat `key = value` lines; dotted keys imply nesting, all-numeric keys
    /// imply list construction
    Properties,
}

impl Syntax {
    /// Guess from a file extension, defaulting to the native format
    pub fn from_extension(path: &std::path::Path) -> Syntax {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Syntax::Json,
            Some("properties") => Syntax::Properties,
            _ => Syntax::Conf,
        }
    }
}

pub struct ParseOptions<'a> {
    pub syntax: Syntax,
    pub loader: &'a dyn IncludeLoader,
}

impl Default for ParseOptions<'static> {
    fn default() -> Self {
        ParseOptions {
            syntax: Syntax::Conf,
            loader: &NullLoader,
        }
    }
}

/// Parse a document into its root value
pub fn parse(text: &str, origin: &Origin, options: &ParseOptions) -> Result<ConfigValue> {
    if options.syntax == Syntax::Properties {
        return parse_properties(text, origin);
    }

    let tokens = tokenize(text, origin, options.syntax)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        syntax: options.syntax,
        loader: options.loader,
        prefix: Vec::new(),
        pending_comments: Vec::new(),
        base_origin: origin.clone(),
    };
    parser.parse_document()
}

/// Parse a native-syntax string with defaults, for programmatic use
pub fn parse_str(text: &str) -> Result<ConfigValue> {
    parse(text, &Origin::new_simple("string"), &ParseOptions::default())
}

struct Parser<'a> {
    tokens: Vec<TokenWithOrigin>,
    pos: usize,
    syntax: Syntax,
    loader: &'a dyn IncludeLoader,
    /// path from the document root to the value being parsed, for include
    /// relativization and `+=` self-references
    prefix: Vec<String>,
    pending_comments: Vec<String>,
    base_origin: Origin,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn origin(&self) -> Origin {
        self.tokens[self.pos].origin.clone()
    }

    fn advance(&mut self) -> TokenWithOrigin {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::parse(&self.origin(), message.into())
    }

    /// Skip newlines and comments; comments accumulate for the next field
    fn skip_newlines(&mut self) {
        loop {
            match self.peek() {
                Token::Newline => {
                    self.advance();
                }
                Token::Comment(_) => {
                    let t = self.advance();
                    if let Token::Comment(text) = t.token {
                        self.pending_comments.push(text);
                    }
                }
                _ => break,
            }
        }
    }

    fn parse_document(&mut self) -> Result<ConfigValue> {
        self.skip_newlines();
        let root = match self.peek() {
            Token::OpenCurly => {
                let origin = self.origin();
                self.advance();
                self.parse_object(origin)?
            }
            Token::OpenSquare => {
                let origin = self.origin();
                self.advance();
                self.parse_array(origin)?
            }
            Token::End => ConfigValue::object(self.base_origin.clone(), Fields::new()),
            _ => {
                if self.syntax == Syntax::Json {
                    return Err(self.error("JSON document must start with '{' or '['"));
                }
                // native syntax allows omitting the root braces
                let origin = self.base_origin.clone();
                let fields = self.parse_object_fields(false)?;
                ConfigValue::object(origin, fields)
            }
        };

        self.skip_newlines();
        if self.peek() != &Token::End {
            return Err(self.error("unexpected text after the root value"));
        }
        Ok(root)
    }

    fn parse_object(&mut self, origin: Origin) -> Result<ConfigValue> {
        let fields = self.parse_object_fields(true)?;
        Ok(ConfigValue::object(origin, fields))
    }

    fn parse_object_fields(&mut self, braced: bool) -> Result<Fields> {
        let mut fields = Fields::new();
        let mut after_field = false;

        loop {
            if self.syntax == Syntax::Json && after_field {
                self.skip_newlines();
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                        self.skip_newlines();
                        if self.peek() == &Token::CloseCurly {
                            return Err(self.error("trailing comma is not allowed in JSON"));
                        }
                    }
                    Token::CloseCurly => {}
                    _ => return Err(self.error("expected ',' or '}' in JSON object")),
                }
            } else if self.syntax == Syntax::Json {
                self.skip_newlines();
            } else {
                // native: newlines and commas both separate fields
                loop {
                    self.skip_newlines();
                    if self.peek() == &Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }

            match self.peek() {
                Token::CloseCurly => {
                    if !braced {
                        return Err(self.error("'}' without matching '{'"));
                    }
                    self.advance();
                    return Ok(fields);
                }
                Token::End => {
                    if braced {
                        return Err(self.error("object is missing its closing '}'"));
                    }
                    return Ok(fields);
                }
                _ => {}
            }

            self.parse_field(&mut fields)?;
            after_field = true;
        }
    }

    fn parse_field(&mut self, fields: &mut Fields) -> Result<()> {
        let field_origin = self.origin();

        // `include` at field position, unless it turns out to be a plain key
        if self.syntax == Syntax::Conf {
            if let Token::UnquotedText(t) = self.peek() {
                if t == "include" && self.looks_like_include() {
                    self.advance();
                    self.skip_value_whitespace();
                    return self.parse_include(fields, field_origin);
                }
            }
        }

        let key_tokens = self.collect_key_tokens()?;
        let segments = key_path_from_tokens(&key_tokens)?;

        let (value, append) = match self.peek().clone() {
            Token::Colon => {
                self.advance();
                self.skip_newlines(); // the value may sit on the next line
                (self.parse_value_at(&segments)?, false)
            }
            Token::Equals => {
                if self.syntax == Syntax::Json {
                    return Err(self.error("'=' is not allowed in JSON, use ':'"));
                }
                self.advance();
                self.skip_newlines();
                (self.parse_value_at(&segments)?, false)
            }
            Token::PlusEquals => {
                if self.syntax == Syntax::Json {
                    return Err(self.error("'+=' is not allowed in JSON"));
                }
                self.advance();
                self.skip_newlines();
                (self.parse_value_at(&segments)?, true)
            }
            Token::OpenCurly => {
                // `key { ... }` without a separator
                if self.syntax == Syntax::Json {
                    return Err(self.error("expected ':' after key in JSON"));
                }
                (self.parse_value_at(&segments)?, false)
            }
            _ => {
                return Err(self.error(format!(
                    "expected ':', '=' or '{{' after key '{}'",
                    segments.join(".")
                )))
            }
        };

        let value = if append {
            // key += v  desugars to  key = ${?key} [v]
            let mut full = self.prefix.clone();
            full.extend(segments.iter().cloned());
            let origin = value.origin.clone();
            let reference = ConfigValue::reference(origin.clone(), Path::new(full), true);
            let element = ConfigValue::array(origin.clone(), vec![value]);
            ConfigValue::new(origin, ValueKind::Concat(vec![reference, element]))
        } else {
            value
        };

        let value = if self.pending_comments.is_empty() {
            value
        } else {
            let comments = std::mem::take(&mut self.pending_comments);
            ConfigValue::new(value.origin.with_comments(comments), value.kind)
        };

        // path-valued keys expand into nested single-key objects
        let value = if segments.len() > 1 {
            value.at_path(&Path::new(segments[1..].to_vec()))
        } else {
            value
        };
        let key = segments[0].clone();

        match fields.get(&key) {
            Some(existing) => {
                if self.syntax == Syntax::Json {
                    return Err(ConfigError::parse(
                        &field_origin,
                        format!("duplicate key '{key}' is not allowed in JSON"),
                    ));
                }
                let merged = value.with_fallback(existing);
                fields.insert(key, merged);
            }
            None => {
                fields.insert(key, value);
            }
        }
        Ok(())
    }

    /// Lookahead: `include` followed by a quoted name or a specifier call
    fn looks_like_include(&self) -> bool {
        let mut pos = self.pos + 1;
        // one whitespace token may sit between `include` and the specifier
        if let Some(t) = self.tokens.get(pos) {
            if matches!(&t.token, Token::UnquotedText(w) if w.trim().is_empty()) {
                pos += 1;
            }
        }
        match self.tokens.get(pos).map(|t| &t.token) {
            Some(Token::QuotedString(_)) => true,
            Some(Token::UnquotedText(t)) => {
                t.starts_with("file(")
                    || t.starts_with("url(")
                    || t.starts_with("classpath(")
                    || t.starts_with("required(")
            }
            _ => false,
        }
    }

    fn skip_value_whitespace(&mut self) {
        if matches!(self.peek(), Token::UnquotedText(t) if t.trim().is_empty()) {
            self.advance();
        }
    }

    fn parse_include(&mut self, fields: &mut Fields, origin: Origin) -> Result<()> {
        let mut required = false;

        let spec = match self.peek().clone() {
            Token::QuotedString(name) => {
                self.advance();
                IncludeSpec::Heuristic(name)
            }
            Token::UnquotedText(call) => {
                self.advance();
                let mut call = call.as_str();
                if let Some(rest) = call.strip_prefix("required(") {
                    required = true;
                    call = rest;
                }
                let spec = match call {
                    "" => None,
                    "file(" => Some(IncludeSpec::File as fn(String) -> IncludeSpec),
                    "url(" => Some(IncludeSpec::Url as fn(String) -> IncludeSpec),
                    "classpath(" => Some(IncludeSpec::Classpath as fn(String) -> IncludeSpec),
                    _ => {
                        return Err(self.error(format!("invalid include specifier '{call}'")));
                    }
                };
                let Token::QuotedString(name) = self.peek().clone() else {
                    return Err(self.error("include specifier needs a quoted name"));
                };
                self.advance();
                let result = match spec {
                    Some(make) => make(name),
                    None => IncludeSpec::Heuristic(name),
                };
                // closing parens of specifier (and required()) wrappers
                if let Token::UnquotedText(close) = self.peek() {
                    if close.chars().all(|c| c == ')') && !close.is_empty() {
                        self.advance();
                    } else {
                        return Err(self.error("invalid include syntax, expected ')'"));
                    }
                } else if spec.is_some() || required {
                    return Err(self.error("include specifier is missing its ')'"));
                }
                result
            }
            _ => return Err(self.error("include needs a quoted name or specifier")),
        };

        match self.loader.load(&spec, &origin)? {
            None => {
                if required {
                    return Err(ConfigError::parse(
                        &origin,
                        format!("required include {spec:?} was not found"),
                    ));
                }
                tracing::debug!(?spec, "optional include not found, skipping");
            }
            Some(included) => {
                let ValueKind::Object(included_fields) = &included.kind else {
                    return Err(ConfigError::parse(
                        &origin,
                        format!("included document must be an object, got {}", included.kind_name()),
                    ));
                };

                // references inside an included tree first mean "relative to
                // the included file's root", then fall back to our root
                let relativized;
                let merged_fields = if self.prefix.is_empty() {
                    included_fields
                } else {
                    relativized = included.relativized(&Path::new(self.prefix.clone()));
                    match &relativized.kind {
                        ValueKind::Object(f) => f,
                        _ => unreachable!("relativized preserves the object shape"),
                    }
                };

                for (key, value) in merged_fields {
                    match fields.get(key) {
                        Some(existing) => {
                            let merged = value.with_fallback(existing);
                            fields.insert(key.clone(), merged);
                        }
                        None => {
                            fields.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn collect_key_tokens(&mut self) -> Result<Vec<TokenWithOrigin>> {
        let mut key_tokens = Vec::new();
        loop {
            match self.peek() {
                Token::QuotedString(_)
                | Token::UnquotedText(_)
                | Token::Integer(_)
                | Token::Decimal(_)
                | Token::Boolean(_)
                | Token::Null => {
                    if self.syntax == Syntax::Json && !matches!(self.peek(), Token::QuotedString(_))
                    {
                        return Err(self.error("object keys must be quoted strings in JSON"));
                    }
                    key_tokens.push(self.advance());
                }
                Token::Substitution { .. } => {
                    return Err(self.error("substitutions are not allowed in keys"));
                }
                _ => break,
            }
        }
        if key_tokens.is_empty() {
            return Err(self.error(format!("expected a key, got {:?}", self.peek())));
        }
        if self.syntax == Syntax::Json && key_tokens.len() > 1 {
            return Err(self.error("concatenated keys are not allowed in JSON"));
        }
        Ok(key_tokens)
    }

    fn parse_value_at(&mut self, key_segments: &[String]) -> Result<ConfigValue> {
        self.prefix.extend(key_segments.iter().cloned());
        let result = self.parse_value();
        self.prefix.truncate(self.prefix.len() - key_segments.len());
        result
    }

    fn parse_value(&mut self) -> Result<ConfigValue> {
        let value_origin = self.origin();
        let mut pieces: Vec<ConfigValue> = Vec::new();

        loop {
            let origin = self.origin();
            let piece = match self.peek().clone() {
                Token::QuotedString(s) => {
                    self.advance();
                    ConfigValue::string(origin, s)
                }
                Token::UnquotedText(t) => {
                    if self.syntax == Syntax::Json {
                        return Err(self.error(format!("unquoted value '{t}' is not allowed in JSON")));
                    }
                    self.advance();
                    ConfigValue::string(origin, t)
                }
                Token::Integer(n) => {
                    self.advance();
                    ConfigValue::integer(origin, n)
                }
                Token::Decimal(d) => {
                    self.advance();
                    ConfigValue::decimal(origin, d)
                }
                Token::Boolean(b) => {
                    self.advance();
                    ConfigValue::boolean(origin, b)
                }
                Token::Null => {
                    self.advance();
                    ConfigValue::null(origin)
                }
                Token::Substitution {
                    path_text,
                    optional,
                } => {
                    self.advance();
                    let path = Path::parse(&path_text).map_err(|e| {
                        ConfigError::parse(&origin, format!("bad substitution path: {e}"))
                    })?;
                    ConfigValue::reference(origin, path, optional)
                }
                Token::OpenCurly => {
                    self.advance();
                    self.parse_object(origin)?
                }
                Token::OpenSquare => {
                    self.advance();
                    self.parse_array(origin)?
                }
                _ => break,
            };
            pieces.push(piece);

            if self.syntax == Syntax::Json {
                break;
            }
        }

        if pieces.is_empty() {
            return Err(self.error(format!("expected a value, got {:?}", self.peek())));
        }

        // already-known pieces join now; substitutions keep the field pending
        let mut pieces = consolidate_pieces(pieces)?;
        if pieces.len() == 1 {
            Ok(pieces.pop().expect("len checked above"))
        } else {
            Ok(ConfigValue::new(value_origin, ValueKind::Concat(pieces)))
        }
    }

    fn parse_array(&mut self, origin: Origin) -> Result<ConfigValue> {
        let mut elements = Vec::new();
        let mut after_element = false;

        loop {
            if self.syntax == Syntax::Json && after_element {
                self.skip_newlines();
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                        self.skip_newlines();
                        if self.peek() == &Token::CloseSquare {
                            return Err(self.error("trailing comma is not allowed in JSON"));
                        }
                    }
                    Token::CloseSquare => {}
                    _ => return Err(self.error("expected ',' or ']' in JSON array")),
                }
            } else if self.syntax == Syntax::Json {
                self.skip_newlines();
            } else {
                loop {
                    self.skip_newlines();
                    if self.peek() == &Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }

            match self.peek() {
                Token::CloseSquare => {
                    self.advance();
                    return Ok(ConfigValue::array(origin, elements));
                }
                Token::End => {
                    return Err(self.error("array is missing its closing ']'"));
                }
                _ => {}
            }

            elements.push(self.parse_value()?);
            after_element = true;
        }
    }
}

/// Build path segments from the raw tokens of one key expression
///
/// Unquoted text splits on dots and is trimmed at segment boundaries; quoted
/// strings are glued into the current segment verbatim, dots included.
fn key_path_from_tokens(tokens: &[TokenWithOrigin]) -> Result<Vec<String>> {
    let origin = &tokens[0].origin;
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut has_content = false;
    let mut has_quoted = false;

    let mut finish_segment =
        |current: &mut String, has_content: &mut bool, has_quoted: &mut bool| -> Result<()> {
            if !*has_content {
                return Err(ConfigError::parse(
                    origin,
                    "path key has an empty segment (leading, trailing or doubled '.')",
                ));
            }
            let segment = if *has_quoted {
                std::mem::take(current)
            } else {
                std::mem::take(current).trim().to_string()
            };
            segments.push(segment);
            *has_content = false;
            *has_quoted = false;
            Ok(())
        };

    for token in tokens {
        match &token.token {
            Token::QuotedString(s) => {
                current.push_str(s);
                has_content = true;
                has_quoted = true;
            }
            Token::UnquotedText(t) => {
                let mut parts = t.split('.');
                if let Some(first) = parts.next() {
                    if !first.is_empty() {
                        current.push_str(first);
                        if !first.trim().is_empty() {
                            has_content = true;
                        }
                    }
                }
                for part in parts {
                    finish_segment(&mut current, &mut has_content, &mut has_quoted)?;
                    if !part.is_empty() {
                        current.push_str(part);
                        if !part.trim().is_empty() {
                            has_content = true;
                        }
                    }
                }
            }
            Token::Integer(n) => {
                current.push_str(&n.to_string());
                has_content = true;
            }
            Token::Decimal(d) => {
                current.push_str(&d.to_string());
                has_content = true;
            }
            Token::Boolean(b) => {
                current.push_str(if *b { "true" } else { "false" });
                has_content = true;
            }
            Token::Null => {
                current.push_str("null");
                has_content = true;
            }
            other => {
                return Err(ConfigError::bug(format!(
                    "token {other:?} cannot be part of a key"
                )));
            }
        }
    }

    finish_segment(&mut current, &mut has_content, &mut has_quoted)?;
    Ok(segments)
}

/// Flat key=value format: dotted keys nest, all-numeric keys become lists
fn parse_properties(text: &str, origin: &Origin) -> Result<ConfigValue> {
    let mut root: Option<ConfigValue> = None;

    for (index, line) in text.lines().enumerate() {
        let line_origin = origin.with_line(index + 1);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let split = trimmed
            .find('=')
            .or_else(|| trimmed.find(':'))
            .ok_or_else(|| {
                ConfigError::parse(&line_origin, "expected 'key = value' or 'key: value'")
            })?;
        let (key, rest) = trimmed.split_at(split);
        let value_text = rest[1..].trim();

        let path = Path::parse(key.trim())
            .map_err(|e| ConfigError::parse(&line_origin, format!("bad key: {e}")))?;
        let value = ConfigValue::string(line_origin, value_text);
        let tree = value.at_path(&path);

        root = Some(match root {
            None => tree,
            Some(existing) => tree.with_fallback(&existing),
        });
    }

    let root = root.unwrap_or_else(|| ConfigValue::object(origin.clone(), Fields::new()));
    Ok(listify(&root))
}

/// Convert objects whose keys are all decimal integers into arrays
fn listify(value: &ConfigValue) -> ConfigValue {
    let ValueKind::Object(fields) = &value.kind else {
        return value.clone();
    };

    let mut indexed: Vec<(usize, ConfigValue)> = Vec::with_capacity(fields.len());
    let all_numeric = !fields.is_empty()
        && fields.iter().all(|(key, child)| match key.parse::<usize>() {
            Ok(n) => {
                indexed.push((n, listify(child)));
                true
            }
            Err(_) => false,
        });

    if all_numeric {
        indexed.sort_by_key(|(n, _)| *n);
        ConfigValue::array(
            value.origin.clone(),
            indexed.into_iter().map(|(_, v)| v).collect(),
        )
    } else {
        ConfigValue::object(
            value.origin.clone(),
            fields
                .iter()
                .map(|(k, v)| (k.clone(), listify(v)))
                .collect(),
        )
    }
}
