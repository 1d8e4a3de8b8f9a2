//! Splits template source into text, `{{ output }}` and `{% tag %}` tokens.
//!
//! Whitespace control (`{{-`, `-}}`, `{%-`, `-%}`) is applied here, and the
//! bodies of `raw` and `comment` blocks never reach the parser.

use regex::Regex;
use std::sync::OnceLock;

use super::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    /// Inner source of `{{ ... }}`, delimiters and trim markers removed.
    Output(String),
    /// Inner source of `{% ... %}`.
    Tag(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line of the token's first character.
    pub line: usize,
}

fn end_raw_re() -> &'static Regex {
    static END_RAW_REGEX: OnceLock<Regex> = OnceLock::new();
    END_RAW_REGEX.get_or_init(|| Regex::new(r"\{%-?\s*endraw\s*-?%\}").unwrap())
}

fn end_comment_re() -> &'static Regex {
    static END_COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    END_COMMENT_REGEX.get_or_init(|| Regex::new(r"\{%-?\s*endcomment\s*-?%\}").unwrap())
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0;
    let mut line = 1;
    let mut trim_next = false;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some(open) = find_open(rest) else {
            push_text(&mut tokens, rest, line, trim_next, false);
            break;
        };

        let is_output = rest[open..].starts_with("{{");
        let trim_prev = rest[open + 2..].starts_with('-');
        push_text(&mut tokens, &rest[..open], line, trim_next, trim_prev);
        line += count_lines(&rest[..open]);

        let inner_start = open + 2 + usize::from(trim_prev);
        let close_delim = if is_output { "}}" } else { "%}" };
        let Some(close) = find_close(&rest[inner_start..], close_delim) else {
            let what = if is_output { "output" } else { "tag" };
            return Err(TemplateError::syntax(
                format!("{what} was not terminated with '{close_delim}'"),
                line,
            ));
        };
        let mut inner = &rest[inner_start..inner_start + close];
        trim_next = inner.ends_with('-');
        if trim_next {
            inner = &inner[..inner.len() - 1];
        }
        let token_end = inner_start + close + 2;
        let token_line = line;
        line += count_lines(&rest[open..token_end]);
        pos += token_end;

        if is_output {
            tokens.push(Token {
                kind: TokenKind::Output(inner.trim().to_string()),
                line: token_line,
            });
            continue;
        }

        let markup = inner.trim();
        let name = markup.split_whitespace().next().unwrap_or("");
        match name {
            "raw" | "comment" => {
                let body = &source[pos..];
                let end_re = if name == "raw" { end_raw_re() } else { end_comment_re() };
                let Some(end) = end_re.find(body) else {
                    return Err(TemplateError::syntax(
                        format!("'{name}' tag was never closed"),
                        token_line,
                    ));
                };
                if name == "raw" {
                    tokens.push(Token {
                        kind: TokenKind::Text(body[..end.start()].to_string()),
                        line,
                    });
                }
                line += count_lines(&body[..end.end()]);
                trim_next = end.as_str().ends_with("-%}");
                pos += end.end();
            }
            _ => tokens.push(Token {
                kind: TokenKind::Tag(markup.to_string()),
                line: token_line,
            }),
        }
    }
    Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, text: &str, line: usize, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        tokens.push(Token {
            kind: TokenKind::Text(text.to_string()),
            line,
        });
    }
}

fn find_open(s: &str) -> Option<usize> {
    match (s.find("{{"), s.find("{%")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Position of `delim` in `s`, skipping over quoted strings.
fn find_close(s: &str, delim: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(delim.as_bytes()) => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn count_lines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn splits_text_output_and_tags() {
        assert_eq!(
            kinds("Hi {{ name }}!{% if x %}y{% endif %}"),
            vec![
                TokenKind::Text("Hi ".into()),
                TokenKind::Output("name".into()),
                TokenKind::Text("!".into()),
                TokenKind::Tag("if x".into()),
                TokenKind::Text("y".into()),
                TokenKind::Tag("endif".into()),
            ]
        );
    }

    #[test]
    fn whitespace_control_trims_neighbours() {
        assert_eq!(
            kinds("a  \n {{- b -}} \n c"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::Output("b".into()),
                TokenKind::Text("c".into()),
            ]
        );
    }

    #[test]
    fn raw_and_comment_bodies_are_opaque() {
        assert_eq!(
            kinds("{% raw %}{{ x }}{% endraw %}{% comment %}{% bogus {% endcomment %}z"),
            vec![TokenKind::Text("{{ x }}".into()), TokenKind::Text("z".into())]
        );
    }

    #[test]
    fn quoted_delimiters_do_not_close() {
        assert_eq!(
            kinds(r#"{{ "}}" | append: x }}"#),
            vec![TokenKind::Output(r#""}}" | append: x"#.into())]
        );
    }

    #[test]
    fn unterminated_output_reports_line() {
        let err = tokenize("line1\nline2 {{ oops").unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn token_lines_are_tracked() {
        let tokens = tokenize("a\n{{ b }}\n\n{% if c %}{% endif %}").unwrap();
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[3].line, 4);
    }
}
