//! rendering values back to document text
//!
//! Native-syntax output is a faithful inverse of parsing: for any value
//! `parse(render(v))` equals `v`, placeholders included. References render as
//! `${path}` expressions, concatenations as adjacent pieces, and a delayed
//! merge at a field renders as that key repeated once per layer, lowest
//! priority first, so the later-definition-wins rule rebuilds the same stack
//! on reparse.
//!
//! JSON output is only defined for fully resolved trees; any placeholder is a
//! [crate::error::ConfigError::NotResolved].

use crate::error::{ConfigError, Result};
use crate::util::{is_safe_unquoted, render_decimal, render_json_string};
use crate::value::{ConfigValue, Fields, ValueKind};

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Emit the JSON subset instead of the native syntax
    pub json: bool,
    /// Indent over multiple lines instead of one compact line
    pub formatted: bool,
    /// Emit comments recorded on value origins
    pub comments: bool,
    /// Emit a comment naming each value's origin
    pub origin_comments: bool,
}

impl RenderOptions {
    /// Formatted native syntax with recorded comments
    pub fn defaults() -> Self {
        RenderOptions {
            json: false,
            formatted: true,
            comments: true,
            origin_comments: false,
        }
    }

    /// Single-line native syntax, for error messages and logs
    pub fn concise() -> Self {
        RenderOptions {
            json: false,
            formatted: false,
            comments: false,
            origin_comments: false,
        }
    }

    /// Formatted JSON
    pub fn json() -> Self {
        RenderOptions {
            json: true,
            formatted: true,
            comments: false,
            origin_comments: false,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions::defaults()
    }
}

/// Render a value to document text
pub fn render(value: &ConfigValue, options: &RenderOptions) -> Result<String> {
    let mut renderer = Renderer {
        out: String::new(),
        options: *options,
    };

    // a root object in the native syntax goes braceless, like a document
    if !options.json && options.formatted {
        if let ValueKind::Object(fields) = &value.kind {
            renderer.render_fields(fields, 0)?;
            return Ok(renderer.out);
        }
    }

    renderer.render_value(value, 0)?;
    if options.formatted {
        renderer.out.push('\n');
    }
    Ok(renderer.out)
}

struct Renderer {
    out: String,
    options: RenderOptions,
}

impl Renderer {
    fn indent(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str("    ");
        }
    }

    fn render_value(&mut self, value: &ConfigValue, indent: usize) -> Result<()> {
        match &value.kind {
            ValueKind::Null => self.out.push_str("null"),
            ValueKind::Boolean(b) => self.out.push_str(if *b { "true" } else { "false" }),
            ValueKind::Integer(n) => self.out.push_str(&n.to_string()),
            ValueKind::Decimal(d) => self.out.push_str(&render_decimal(*d)),
            ValueKind::String(s) => self.out.push_str(&render_json_string(s)),

            ValueKind::Array(elements) => {
                if elements.is_empty() {
                    self.out.push_str("[]");
                } else if self.options.formatted {
                    self.out.push_str("[\n");
                    for (index, element) in elements.iter().enumerate() {
                        self.indent(indent + 1);
                        self.render_value(element, indent + 1)?;
                        if index + 1 < elements.len() {
                            self.out.push(',');
                        }
                        self.out.push('\n');
                    }
                    self.indent(indent);
                    self.out.push(']');
                } else {
                    self.out.push('[');
                    for (index, element) in elements.iter().enumerate() {
                        if index > 0 {
                            self.out.push(',');
                        }
                        self.render_value(element, indent)?;
                    }
                    self.out.push(']');
                }
            }

            ValueKind::Object(fields) => {
                if fields.is_empty() {
                    self.out.push_str("{}");
                } else if self.options.formatted {
                    self.out.push_str("{\n");
                    self.render_fields(fields, indent + 1)?;
                    self.indent(indent);
                    self.out.push('}');
                } else {
                    self.out.push('{');
                    self.render_fields(fields, indent)?;
                    self.out.push('}');
                }
            }

            ValueKind::Reference { path, optional, .. } => {
                if self.options.json {
                    return Err(ConfigError::not_resolved(format!(
                        "cannot render substitution ${{{path}}} as JSON"
                    )));
                }
                self.out.push_str("${");
                if *optional {
                    self.out.push('?');
                }
                self.out.push_str(&path.render());
                self.out.push('}');
            }

            ValueKind::Concat(pieces) => {
                if self.options.json {
                    return Err(ConfigError::not_resolved(
                        "cannot render an unresolved concatenation as JSON",
                    ));
                }
                for piece in pieces {
                    self.render_value(piece, indent)?;
                }
            }

            ValueKind::DelayedMerge(_) | ValueKind::DelayedMergeObject(_) => {
                // only expressible as a repeated field, which render_field does
                return Err(ConfigError::not_resolved(format!(
                    "cannot render a delayed merge outside an object, at {}",
                    value.origin
                )));
            }
        }
        Ok(())
    }

    fn render_fields(&mut self, fields: &Fields, indent: usize) -> Result<()> {
        let count = fields.len();
        for (index, (key, value)) in fields.iter().enumerate() {
            self.render_field(key, value, indent, index + 1 == count)?;
        }
        Ok(())
    }

    fn render_field(
        &mut self,
        key: &str,
        value: &ConfigValue,
        indent: usize,
        last: bool,
    ) -> Result<()> {
        if !self.options.json {
            if let ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) =
                &value.kind
            {
                // repeated keys, lowest priority first, rebuild this stack
                let count = stack.len();
                for (index, layer) in stack.iter().rev().enumerate() {
                    self.render_field(key, layer, indent, last && index + 1 == count)?;
                }
                return Ok(());
            }

            if self.options.formatted {
                if self.options.comments {
                    for comment in value.origin.comments() {
                        self.indent(indent);
                        self.out.push_str("# ");
                        self.out.push_str(comment);
                        self.out.push('\n');
                    }
                }
                if self.options.origin_comments {
                    self.indent(indent);
                    self.out.push_str("# ");
                    self.out.push_str(&value.origin.to_string());
                    self.out.push('\n');
                }
            }
        }

        if self.options.formatted {
            self.indent(indent);
        }

        if self.options.json {
            self.out.push_str(&render_json_string(key));
            self.out.push_str(": ");
            self.render_value(value, indent)?;
            if !last {
                self.out.push(',');
            }
            if self.options.formatted {
                self.out.push('\n');
            }
            return Ok(());
        }

        if is_safe_unquoted(key) {
            self.out.push_str(key);
        } else {
            self.out.push_str(&render_json_string(key));
        }

        if matches!(value.kind, ValueKind::Object(_)) {
            self.out.push(' ');
        } else {
            self.out.push_str(" = ");
        }
        self.render_value(value, indent)?;

        if self.options.formatted {
            self.out.push('\n');
        } else if !last {
            self.out.push(',');
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse_str;
    use pretty_assertions::assert_eq;

    fn rendered(text: &str) -> String {
        render(&parse_str(text).unwrap(), &RenderOptions::defaults()).unwrap()
    }

    #[test]
    fn formatted_document() {
        let out = rendered("a = 1\nb = { c = \"x y\", d = [1, 2.5] }\ne = hello");
        insta::assert_snapshot!(out, @r###"
        a = 1
        b {
            c = "x y"
            d = [
                1,
                2.5
            ]
        }
        e = "hello"
        "###);
    }

    #[test]
    fn placeholders_render_in_native_syntax() {
        let out = rendered("a = ${x}\nb = ${?y.z}\nc = ${x} [1]");
        insta::assert_snapshot!(out, @r###"
        a = ${x}
        b = ${?y.z}
        c = ${x}[
            1
        ]
        "###);
    }

    #[test]
    fn comments_render_before_their_field() {
        let out = rendered("# says hello\na = hello");
        insta::assert_snapshot!(out, @r###"
        # says hello
        a = "hello"
        "###);
    }

    #[test]
    fn concise_is_single_line() {
        let root = parse_str("a = 1\nb = [1, 2]\nc = { d = x }").unwrap();
        let out = render(&root, &RenderOptions::concise()).unwrap();
        assert_eq!(out, r#"{a = 1,b = [1,2],c {d = "x"}}"#);
    }

    #[test]
    fn decimals_survive_reparse_as_decimals() {
        let out = rendered("a = 2.0");
        assert_eq!(out, "a = 2.0\n");
        let back = parse_str(&out).unwrap();
        assert!(matches!(
            back.get("a").unwrap().unwrap().kind,
            ValueKind::Decimal(_)
        ));
    }

    #[test]
    fn keys_quote_only_when_needed() {
        let out = rendered(r#""a.b" = 1, "x y" = 2, plain = 3"#);
        insta::assert_snapshot!(out, @r###"
        "a.b" = 1
        "x y" = 2
        plain = 3
        "###);
    }

    #[test]
    fn delayed_merge_renders_as_repeated_keys() {
        let higher = parse_str("a = ${z}").unwrap();
        let lower = parse_str("a = { x = 1 }").unwrap();
        let merged = higher.with_fallback(&lower);

        let out = render(&merged, &RenderOptions::defaults()).unwrap();
        insta::assert_snapshot!(out, @r###"
        a {
            x = 1
        }
        a = ${z}
        "###);
    }

    #[test]
    fn json_output() {
        let root = parse_str(r#"a = 1, b { c = true, d = [1, "x"] }"#).unwrap();
        let out = render(&root, &RenderOptions::json()).unwrap();
        insta::assert_snapshot!(out, @r###"
        {
            "a": 1,
            "b": {
                "c": true,
                "d": [
                    1,
                    "x"
                ]
            }
        }
        "###);
    }

    #[test]
    fn json_refuses_placeholders() {
        let root = parse_str("a = ${x}").unwrap();
        let err = render(&root, &RenderOptions::json()).unwrap_err();
        assert!(matches!(err, ConfigError::NotResolved { .. }));
    }

    #[test]
    fn round_trip_preserves_values() {
        for text in [
            "a = 1\nb = 2.5\nc = true\nd = null\ne = \"x\"",
            "a = [1, [2, 3], { b = x }]",
            "a = ${x.y}\nb = ${?opt}",
            "a = ${x} [1]\nb = \"l\"${x}\"r\"",
            "\"a.b\" = 1\n\"\" = 2",
            "empty {}\nlist = []",
        ] {
            let parsed = parse_str(text).unwrap();
            let out = render(&parsed, &RenderOptions::defaults()).unwrap();
            let back = parse_str(&out).unwrap();
            assert_eq!(back, parsed, "round trip failed for:\n{text}\nrendered:\n{out}");
        }
    }

    #[test]
    fn round_trip_preserves_delayed_merges() {
        let higher = parse_str("a = ${z}\nb = { n = 1 }").unwrap();
        let lower = parse_str("a = { x = 1 }\na = 7\nb = ${w}").unwrap();
        let merged = higher.with_fallback(&lower);

        let out = render(&merged, &RenderOptions::defaults()).unwrap();
        let back = parse_str(&out).unwrap();
        assert_eq!(back, merged, "rendered:\n{out}");
    }
}
