//! A Liquid subset for sample-data templating.
//!
//! Supports `{{ expr | filter: args }}` output, `if`/`elsif`/`else`,
//! `unless`, `for` (with `limit`, `offset`, `reversed`, `forloop.*` and an
//! `else` branch), `assign`, `capture`, `comment`, `raw`, `break` and
//! `continue`, plus whitespace control on every delimiter. Missing variables
//! render as empty strings.

mod filters;
mod lexer;
mod parser;
mod render;

use serde_json::Value;
use thiserror::Error;

pub use parser::MAX_TEMPLATE_DEPTH;
pub use render::MAX_LOOP_ITERATIONS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Liquid syntax error (line {line}): {message}")]
    Syntax { message: String, line: usize },

    #[error("Liquid error (line {line}): {message}")]
    Render { message: String, line: usize },
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>, line: usize) -> Self {
        TemplateError::Syntax {
            message: message.into(),
            line,
        }
    }

    pub(crate) fn render(message: impl Into<String>, line: usize) -> Self {
        TemplateError::Render {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            TemplateError::Syntax { line, .. } | TemplateError::Render { line, .. } => *line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TemplateError::Syntax { message, .. } | TemplateError::Render { message, .. } => message,
        }
    }

    /// Offset the line number by the line the template starts on in a larger
    /// document.
    pub fn shifted(self, first_line: usize) -> Self {
        let offset = first_line.saturating_sub(1);
        match self {
            TemplateError::Syntax { message, line } => TemplateError::Syntax {
                message,
                line: line + offset,
            },
            TemplateError::Render { message, line } => TemplateError::Render {
                message,
                line: line + offset,
            },
        }
    }
}

/// A parsed template, reusable across renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<parser::Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = lexer::tokenize(source)?;
        Ok(Self {
            nodes: parser::parse(tokens)?,
        })
    }

    /// Render against `data`. Top-level keys of a JSON object become variables.
    pub fn render(&self, data: &Value) -> Result<String, TemplateError> {
        let mut ctx = render::Context::new(data);
        let mut out = String::new();
        render::render_nodes(&self.nodes, &mut ctx, &mut out)?;
        Ok(out)
    }

    /// Render with every `{{ }}` output passed through `escape`. Template
    /// text outside the delimiters is kept as written.
    pub fn render_escaped(&self, data: &Value, escape: fn(&str) -> String) -> Result<String, TemplateError> {
        let mut ctx = render::Context::new(data).escaping(escape);
        let mut out = String::new();
        render::render_nodes(&self.nodes, &mut ctx, &mut out)?;
        Ok(out)
    }
}

/// Parse and render in one step.
pub fn render(source: &str, data: &Value) -> Result<String, TemplateError> {
    Template::parse(source)?.render(data)
}

/// Parse and render in one step, escaping every output.
pub fn render_escaped(source: &str, data: &Value, escape: fn(&str) -> String) -> Result<String, TemplateError> {
    Template::parse(source)?.render_escaped(data, escape)
}

/// True when `s` contains output or tag delimiters.
pub fn has_template_syntax(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_filter_fallback() {
        let src = r#"Hello {{ user.first_name | default:"there" }}"#;
        assert_eq!(render(src, &json!({})).unwrap(), "Hello there");
        assert_eq!(
            render(src, &json!({"user": {"first_name": "Ada"}})).unwrap(),
            "Hello Ada"
        );
    }

    #[test]
    fn missing_variables_render_empty() {
        assert_eq!(render("[{{ nope.deeper[3] }}]", &json!({})).unwrap(), "[]");
    }

    #[test]
    fn conditionals() {
        let src = "{% if plan == 'pro' and seats > 5 %}big{% elsif plan == 'pro' %}pro{% else %}free{% endif %}";
        assert_eq!(render(src, &json!({"plan": "pro", "seats": 10})).unwrap(), "big");
        assert_eq!(render(src, &json!({"plan": "pro", "seats": 2})).unwrap(), "pro");
        assert_eq!(render(src, &json!({})).unwrap(), "free");
        assert_eq!(
            render("{% unless vip %}regular{% else %}vip{% endunless %}", &json!({"vip": true})).unwrap(),
            "vip"
        );
    }

    #[test]
    fn empty_and_contains() {
        let data = json!({"tags": ["a", "b"], "none": [], "name": "Ada Lovelace"});
        assert_eq!(render("{% if none == empty %}y{% endif %}", &data).unwrap(), "y");
        assert_eq!(render("{% if tags contains 'b' %}y{% endif %}", &data).unwrap(), "y");
        assert_eq!(render("{% if name contains 'Love' %}y{% endif %}", &data).unwrap(), "y");
    }

    #[test]
    fn for_loops() {
        let data = json!({"items": [{"n": "a"}, {"n": "b"}, {"n": "c"}]});
        assert_eq!(
            render("{% for i in items %}{{ forloop.index }}{{ i.n }}{% unless forloop.last %},{% endunless %}{% endfor %}", &data).unwrap(),
            "1a,2b,3c"
        );
        assert_eq!(
            render("{% for i in items limit:2 offset:1 reversed %}{{ i.n }}{% endfor %}", &data).unwrap(),
            "cb"
        );
        assert_eq!(render("{% for i in missing %}x{% else %}none{% endfor %}", &data).unwrap(), "none");
        assert_eq!(render("{% for i in (1..4) %}{% if i == 3 %}{% break %}{% endif %}{{ i }}{% endfor %}", &data).unwrap(), "12");
    }

    #[test]
    fn huge_ranges_are_capped() {
        let src = "{% for i in (0..9223372036854775807) %}{{ i }}{% break %}{% endfor %}";
        let err = render(src, &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }), "{err}");
        let src = "{% for i in (-9223372036854775807..9223372036854775807) %}{% break %}{% endfor %}";
        assert!(render(src, &json!({})).is_err());
        assert_eq!(render("{% for i in (5..1) %}x{% endfor %}", &json!({})).unwrap(), "");
        assert!(render("{{ n | divided_by: -1 }}", &json!({"n": i64::MIN})).is_ok());
    }

    #[test]
    fn assign_and_capture() {
        let src = "{% assign who = name | upcase %}{% capture greeting %}Hi {{ who }}{% endcapture %}{{ greeting }}!";
        assert_eq!(render(src, &json!({"name": "ada"})).unwrap(), "Hi ADA!");
    }

    #[test]
    fn raw_and_comment() {
        assert_eq!(
            render("{% raw %}{{ x }}{% endraw %}{% comment %}hidden{% endcomment %}", &json!({"x": 1})).unwrap(),
            "{{ x }}"
        );
    }

    #[test]
    fn whitespace_control() {
        let src = "<ul>\n  {%- for i in (1..2) %}\n  <li>{{ i }}</li>\n  {%- endfor %}\n</ul>";
        assert_eq!(render(src, &json!({})).unwrap(), "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>");
    }

    #[test]
    fn syntax_error_has_line() {
        let err = Template::parse("a\nb\n{% if %}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 3, .. }));
        assert_eq!(err.shifted(10).line(), 12);
    }

    #[test]
    fn output_is_not_escaped() {
        assert_eq!(render("{{ html }}", &json!({"html": "<b>"})).unwrap(), "<b>");
        assert_eq!(render("{{ html | escape }}", &json!({"html": "<b>"})).unwrap(), "&lt;b&gt;");
    }

    #[test]
    fn escaped_outputs_leave_markup_alone() {
        fn upper(s: &str) -> String {
            s.to_uppercase()
        }
        let src = "<b>{{ a }}</b>{% capture c %}{{ a }}!{% endcapture %}[{{ c }}]";
        assert_eq!(render_escaped(src, &json!({"a": "x"}), upper).unwrap(), "<b>X</b>[X!]");
    }

    #[test]
    fn template_detection() {
        assert!(has_template_syntax("Hi {{ x }}"));
        assert!(has_template_syntax("{% if %}"));
        assert!(!has_template_syntax("plain { braces }"));
    }
}
