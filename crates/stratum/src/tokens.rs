//! lexical tokenizer
//!
//! Turns document text into a flat token stream for [crate::parser]. Each
//! token carries an [Origin] with the line it started on.
//!
//! Two lexical rules feed the parser's concatenation handling:
//! - a line break is its own token, because line breaks act as implied
//!   separators where no comma is present
//! - a run of inline whitespace is kept (as unquoted text) only when it sits
//!   between two simple values on the same line; next to punctuation or
//!   brackets it is insignificant and dropped

use crate::error::{ConfigError, Result};
use crate::origin::Origin;
use crate::parser::Syntax;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    OpenCurly,
    CloseCurly,
    OpenSquare,
    CloseSquare,
    Comma,
    /// `:` key-value separator
    Colon,
    /// `=` key-value separator (native syntax only)
    Equals,
    /// `+=` append (native syntax only)
    PlusEquals,
    Newline,
    QuotedString(String),
    UnquotedText(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Null,
    /// `${path}` or `${?path}`; the inner text is parsed as a path later
    Substitution { path_text: String, optional: bool },
    Comment(String),
    End,
}

impl Token {
    /// Simple values can participate in concatenation
    fn is_simple_value(&self) -> bool {
        matches!(
            self,
            Token::QuotedString(_)
                | Token::UnquotedText(_)
                | Token::Integer(_)
                | Token::Decimal(_)
                | Token::Boolean(_)
                | Token::Null
                | Token::Substitution { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithOrigin {
    pub token: Token,
    pub origin: Origin,
}

/// Characters that terminate unquoted text
fn is_unquoted_delimiter(c: char) -> bool {
    matches!(
        c,
        '$' | '"' | '{' | '}' | '[' | ']' | ':' | '=' | ',' | '+' | '#' | '`' | '^' | '?' | '!'
            | '@' | '*' | '&' | '\\'
    )
}

pub fn tokenize(text: &str, base_origin: &Origin, syntax: Syntax) -> Result<Vec<TokenWithOrigin>> {
    Tokenizer {
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
        base_origin: base_origin.clone(),
        syntax,
    }
    .run()
}

struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    base_origin: Origin,
    syntax: Syntax,
}

// raw stream entry before the whitespace post-pass
enum Raw {
    Token(TokenWithOrigin),
    Whitespace(String, Origin),
}

impl Tokenizer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn origin_here(&self) -> Origin {
        self.base_origin.with_line(self.line)
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::parse(&self.origin_here(), message.into())
    }

    fn run(mut self) -> Result<Vec<TokenWithOrigin>> {
        let mut raw = Vec::new();

        while let Some(c) = self.peek() {
            let origin = self.origin_here();
            match c {
                '\n' => {
                    self.bump();
                    raw.push(Raw::Token(TokenWithOrigin {
                        token: Token::Newline,
                        origin,
                    }));
                }
                c if c.is_whitespace() => {
                    let mut ws = String::new();
                    while let Some(w) = self.peek() {
                        if w == '\n' || !w.is_whitespace() {
                            break;
                        }
                        ws.push(w);
                        self.bump();
                    }
                    raw.push(Raw::Whitespace(ws, origin));
                }
                '{' => self.push_single(&mut raw, Token::OpenCurly),
                '}' => self.push_single(&mut raw, Token::CloseCurly),
                '[' => self.push_single(&mut raw, Token::OpenSquare),
                ']' => self.push_single(&mut raw, Token::CloseSquare),
                ',' => self.push_single(&mut raw, Token::Comma),
                ':' => self.push_single(&mut raw, Token::Colon),
                '=' => self.push_single(&mut raw, Token::Equals),
                '+' => {
                    if self.peek_at(1) == Some('=') {
                        self.bump();
                        self.bump();
                        raw.push(Raw::Token(TokenWithOrigin {
                            token: Token::PlusEquals,
                            origin,
                        }));
                    } else {
                        return Err(self.error("reserved character '+' (only '+=' is valid)"));
                    }
                }
                '#' => self.pull_comment(&mut raw)?,
                '/' if self.peek_at(1) == Some('/') => self.pull_comment(&mut raw)?,
                '"' => {
                    let token = self.pull_string()?;
                    raw.push(Raw::Token(TokenWithOrigin { token, origin }));
                }
                '$' => {
                    let token = self.pull_substitution()?;
                    raw.push(Raw::Token(TokenWithOrigin { token, origin }));
                }
                c if c.is_ascii_digit() || (c == '-' && self.next_is_number_start()) => {
                    let token = self.pull_number()?;
                    raw.push(Raw::Token(TokenWithOrigin { token, origin }));
                }
                c if is_unquoted_delimiter(c) => {
                    return Err(self.error(format!("reserved character '{c}'")));
                }
                _ => {
                    let token = self.pull_unquoted(String::new())?;
                    raw.push(Raw::Token(TokenWithOrigin { token, origin }));
                }
            }
        }

        let end_origin = self.origin_here();
        Ok(finish(raw, end_origin))
    }

    fn push_single(&mut self, raw: &mut Vec<Raw>, token: Token) {
        let origin = self.origin_here();
        self.bump();
        raw.push(Raw::Token(TokenWithOrigin { token, origin }));
    }

    fn next_is_number_start(&self) -> bool {
        matches!(self.peek_at(1), Some(c) if c.is_ascii_digit())
    }

    fn pull_comment(&mut self, raw: &mut Vec<Raw>) -> Result<()> {
        if self.syntax == Syntax::Json {
            return Err(self.error("comments are not allowed in JSON"));
        }
        let origin = self.origin_here();
        if self.peek() == Some('#') {
            self.bump();
        } else {
            self.bump();
            self.bump();
        }
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.bump();
        }
        raw.push(Raw::Token(TokenWithOrigin {
            token: Token::Comment(text.trim().to_string()),
            origin,
        }));
        Ok(())
    }

    fn pull_string(&mut self) -> Result<Token> {
        // triple-quoted strings are raw multi-line text
        if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
            return self.pull_triple_quoted();
        }

        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error("unterminated quoted string"));
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('/') => value.push('/'),
                    Some('b') => value.push('\u{8}'),
                    Some('f') => value.push('\u{c}'),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('u') => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            match self.bump() {
                                Some(h) if h.is_ascii_hexdigit() => code.push(h),
                                _ => {
                                    return Err(self.error("malformed \\u escape in string"));
                                }
                            }
                        }
                        let n = u32::from_str_radix(&code, 16).expect("hex digits checked");
                        match char::from_u32(n) {
                            Some(c) => value.push(c),
                            None => {
                                return Err(self.error("invalid unicode escape in string"));
                            }
                        }
                    }
                    Some(other) => {
                        return Err(self.error(format!("unknown escape '\\{other}' in string")));
                    }
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(c) => value.push(c),
            }
        }
        Ok(Token::QuotedString(value))
    }

    fn pull_triple_quoted(&mut self) -> Result<Token> {
        self.bump();
        self.bump();
        self.bump();
        let mut value = String::new();
        loop {
            if self.peek() == Some('"') && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"')
            {
                self.bump();
                self.bump();
                self.bump();
                // quotes beyond the closing three belong to the string
                while self.peek() == Some('"') {
                    value.push('"');
                    self.bump();
                }
                return Ok(Token::QuotedString(value));
            }
            match self.bump() {
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated triple-quoted string")),
            }
        }
    }

    fn pull_substitution(&mut self) -> Result<Token> {
        if self.syntax == Syntax::Json {
            return Err(self.error("substitutions (${}) are not allowed in JSON"));
        }
        if self.peek_at(1) != Some('{') {
            return Err(self.error("'$' not followed by '{'"));
        }
        self.bump();
        self.bump();
        let optional = if self.peek() == Some('?') {
            self.bump();
            true
        } else {
            false
        };
        let mut inner = String::new();
        loop {
            match self.bump() {
                Some('}') => break,
                Some(c) => inner.push(c),
                None => return Err(self.error("substitution ${ is missing a closing '}'")),
            }
        }
        Ok(Token::Substitution {
            path_text: inner.trim().to_string(),
            optional,
        })
    }

    fn pull_number(&mut self) -> Result<Token> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        // a trailing letter means this was unquoted text all along, e.g. 10foo
        if matches!(self.peek(), Some(c) if !c.is_whitespace() && c != '\n' && !is_unquoted_delimiter(c) && c != '/')
        {
            return self.pull_unquoted(text);
        }

        if text.contains('.') || text.contains('e') || text.contains('E') {
            if let Ok(d) = text.parse::<f64>() {
                return Ok(Token::Decimal(d));
            }
        } else {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Token::Integer(n));
            }
            // numeric subtype is chosen by magnitude, not lexical form
            if let Ok(d) = text.parse::<f64>() {
                return Ok(Token::Decimal(d));
            }
        }

        // not a number after all, e.g. 1.0.0; loosen up to unquoted text
        // unless the scan swallowed a reserved character
        if let Some(c) = text.chars().find(|c| is_unquoted_delimiter(*c)) {
            return Err(self.error(format!(
                "reserved character '{c}' in what looks like a number: '{text}'"
            )));
        }
        self.pull_unquoted(text)
    }

    fn pull_unquoted(&mut self, prefix: String) -> Result<Token> {
        let mut text = prefix;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '\n' || is_unquoted_delimiter(c) {
                break;
            }
            if c == '/' && self.peek_at(1) == Some('/') {
                break;
            }
            text.push(c);
            self.bump();
        }

        Ok(match text.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            _ => Token::UnquotedText(text),
        })
    }
}

/// Whitespace post-pass: keep a run only between two simple values
fn finish(raw: Vec<Raw>, end_origin: Origin) -> Vec<TokenWithOrigin> {
    let mut out: Vec<TokenWithOrigin> = Vec::with_capacity(raw.len() + 1);
    let mut pending_ws: Option<(String, Origin)> = None;

    for entry in raw {
        match entry {
            Raw::Whitespace(ws, origin) => {
                let after_simple = out
                    .last()
                    .map(|t| t.token.is_simple_value())
                    .unwrap_or(false);
                if after_simple {
                    pending_ws = Some((ws, origin));
                }
            }
            Raw::Token(token) => {
                if let Some((ws, origin)) = pending_ws.take() {
                    if token.token.is_simple_value() {
                        out.push(TokenWithOrigin {
                            token: Token::UnquotedText(ws),
                            origin,
                        });
                    }
                }
                out.push(token);
            }
        }
    }

    out.push(TokenWithOrigin {
        token: Token::End,
        origin: end_origin,
    });
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(text: &str) -> Vec<Token> {
        tokenize(text, &Origin::new_simple("test"), Syntax::Conf)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn basic_object_tokens() {
        assert_eq!(
            tokens("a : 1"),
            vec![
                Token::UnquotedText("a".to_string()),
                Token::Colon,
                Token::Integer(1),
                Token::End
            ]
        );
    }

    #[test]
    fn newline_is_a_token() {
        assert_eq!(
            tokens("a = 1\nb = 2"),
            vec![
                Token::UnquotedText("a".to_string()),
                Token::Equals,
                Token::Integer(1),
                Token::Newline,
                Token::UnquotedText("b".to_string()),
                Token::Equals,
                Token::Integer(2),
                Token::End
            ]
        );
    }

    #[test]
    fn whitespace_kept_between_simple_values() {
        assert_eq!(
            tokens("a = foo  bar"),
            vec![
                Token::UnquotedText("a".to_string()),
                Token::Equals,
                Token::UnquotedText("foo".to_string()),
                Token::UnquotedText("  ".to_string()),
                Token::UnquotedText("bar".to_string()),
                Token::End
            ]
        );
    }

    #[test]
    fn whitespace_dropped_next_to_brackets() {
        assert_eq!(
            tokens("a = [1] [2]"),
            vec![
                Token::UnquotedText("a".to_string()),
                Token::Equals,
                Token::OpenSquare,
                Token::Integer(1),
                Token::CloseSquare,
                Token::OpenSquare,
                Token::Integer(2),
                Token::CloseSquare,
                Token::End
            ]
        );
    }

    #[test]
    fn whitespace_kept_between_substitutions() {
        assert_eq!(
            tokens("${a} ${b}"),
            vec![
                Token::Substitution {
                    path_text: "a".to_string(),
                    optional: false
                },
                Token::UnquotedText(" ".to_string()),
                Token::Substitution {
                    path_text: "b".to_string(),
                    optional: false
                },
                Token::End
            ]
        );
    }

    #[test]
    fn optional_substitution() {
        assert_eq!(
            tokens("${?a.b}"),
            vec![
                Token::Substitution {
                    path_text: "a.b".to_string(),
                    optional: true
                },
                Token::End
            ]
        );
    }

    #[test]
    fn keywords_and_numbers() {
        assert_eq!(
            tokens("true false null 1.5 -3 10foo"),
            vec![
                Token::Boolean(true),
                Token::UnquotedText(" ".to_string()),
                Token::Boolean(false),
                Token::UnquotedText(" ".to_string()),
                Token::Null,
                Token::UnquotedText(" ".to_string()),
                Token::Decimal(1.5),
                Token::UnquotedText(" ".to_string()),
                Token::Integer(-3),
                Token::UnquotedText(" ".to_string()),
                Token::UnquotedText("10foo".to_string()),
                Token::End
            ]
        );
    }

    #[test]
    fn almost_a_number_is_unquoted_text() {
        assert_eq!(
            tokens("1.0.0"),
            vec![Token::UnquotedText("1.0.0".to_string()), Token::End]
        );
    }

    #[test]
    fn huge_integer_becomes_decimal() {
        assert_eq!(
            tokens("92233720368547758070"),
            vec![Token::Decimal(92233720368547758070.0), Token::End]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(
            tokens("a = 1 // one\n# two\nb = 2"),
            vec![
                Token::UnquotedText("a".to_string()),
                Token::Equals,
                Token::Integer(1),
                Token::Comment("one".to_string()),
                Token::Newline,
                Token::Comment("two".to_string()),
                Token::Newline,
                Token::UnquotedText("b".to_string()),
                Token::Equals,
                Token::Integer(2),
                Token::End
            ]
        );
    }

    #[test]
    fn plus_equals() {
        assert_eq!(
            tokens("a += 1"),
            vec![
                Token::UnquotedText("a".to_string()),
                Token::PlusEquals,
                Token::Integer(1),
                Token::End
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#""a\nbA""#),
            vec![Token::QuotedString("a\nbA".to_string()), Token::End]
        );
    }

    #[test]
    fn triple_quoted_string() {
        assert_eq!(
            tokens("\"\"\"line1\nline2\"\"\""),
            vec![
                Token::QuotedString("line1\nline2".to_string()),
                Token::End
            ]
        );
    }

    #[test]
    fn json_mode_rejects_comments_and_substitutions() {
        let origin = Origin::new_simple("test");
        let err = tokenize("// nope", &origin, Syntax::Json).unwrap_err();
        assert!(err.to_string().contains("comments"));

        let err = tokenize("${a}", &origin, Syntax::Json).unwrap_err();
        assert!(err.to_string().contains("substitutions"));
    }

    #[test]
    fn unterminated_string_reports_line() {
        let origin = Origin::new_simple("test");
        let err = tokenize("a = 1\nb = \"oops", &origin, Syntax::Conf).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
        assert!(err.to_string().contains("2"));
    }
}
