//! Builds the template AST from lexer tokens.

use serde_json::Value;

use super::filters::is_known_filter;
use super::lexer::{Token, TokenKind};
use super::TemplateError;

/// Deepest allowed nesting of block tags.
pub const MAX_TEMPLATE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Filtered),
    If {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Unless {
        condition: Condition,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    For(ForLoop),
    Assign {
        name: String,
        value: Filtered,
    },
    Capture {
        name: String,
        body: Vec<Node>,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub variable: String,
    pub collection: Expr,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub reversed: bool,
    pub body: Vec<Node>,
    pub otherwise: Option<Vec<Node>>,
    pub line: usize,
}

/// An expression followed by its filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub base: Expr,
    pub filters: Vec<FilterCall>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `a.b[0]["c"]`; the first segment is always a key.
    Path(Vec<Segment>),
    Range(Box<Expr>, Box<Expr>),
    Empty,
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
}

/// `and`/`or` chains associate to the right without precedence, as Liquid does.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Test(Expr),
    Compare(Expr, CompareOp, Expr),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Node>, TemplateError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let (nodes, end) = parser.parse_block(&[])?;
    match end {
        Some(tag) => Err(TemplateError::syntax(
            format!("Unexpected tag '{}'", tag.name),
            tag.line,
        )),
        None => Ok(nodes),
    }
}

struct EndTag {
    name: String,
    markup: String,
    line: usize,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Parse nodes until one of `terminators` (or end of input when empty).
    fn parse_block(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, Option<EndTag>), TemplateError> {
        let mut nodes = Vec::new();
        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            match token.kind {
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::Output(src) => nodes.push(Node::Output(parse_filtered(&src, token.line)?)),
                TokenKind::Tag(markup) => {
                    let (name, rest) = split_tag(&markup);
                    if terminators.contains(&name) {
                        return Ok((
                            nodes,
                            Some(EndTag {
                                name: name.to_string(),
                                markup: rest.to_string(),
                                line: token.line,
                            }),
                        ));
                    }
                    nodes.push(self.parse_tag(name, rest, token.line)?);
                }
            }
        }
        Ok((nodes, None))
    }

    fn enter(&mut self, line: usize) -> Result<(), TemplateError> {
        self.depth += 1;
        if self.depth > MAX_TEMPLATE_DEPTH {
            return Err(TemplateError::syntax(
                format!("Nesting too deep (limit {MAX_TEMPLATE_DEPTH})"),
                line,
            ));
        }
        Ok(())
    }

    fn parse_tag(&mut self, name: &str, rest: &str, line: usize) -> Result<Node, TemplateError> {
        match name {
            "if" => {
                self.enter(line)?;
                let mut branches = Vec::new();
                let mut condition = parse_condition(rest, line)?;
                let mut otherwise = None;
                loop {
                    let (body, end) = self.parse_block(&["elsif", "else", "endif"])?;
                    let end = end.ok_or_else(|| unclosed("if", line))?;
                    branches.push((condition, body));
                    match end.name.as_str() {
                        "elsif" => condition = parse_condition(&end.markup, end.line)?,
                        "else" => {
                            let (body, end) = self.parse_block(&["endif"])?;
                            end.ok_or_else(|| unclosed("if", line))?;
                            otherwise = Some(body);
                            break;
                        }
                        _ => break,
                    }
                }
                self.depth -= 1;
                Ok(Node::If { branches, otherwise })
            }
            "unless" => {
                self.enter(line)?;
                let condition = parse_condition(rest, line)?;
                let (body, end) = self.parse_block(&["else", "endunless"])?;
                let end = end.ok_or_else(|| unclosed("unless", line))?;
                let otherwise = if end.name == "else" {
                    let (body, end) = self.parse_block(&["endunless"])?;
                    end.ok_or_else(|| unclosed("unless", line))?;
                    Some(body)
                } else {
                    None
                };
                self.depth -= 1;
                Ok(Node::Unless {
                    condition,
                    body,
                    otherwise,
                })
            }
            "for" => {
                self.enter(line)?;
                let mut for_loop = parse_for_header(rest, line)?;
                let (body, end) = self.parse_block(&["else", "endfor"])?;
                let end = end.ok_or_else(|| unclosed("for", line))?;
                for_loop.body = body;
                if end.name == "else" {
                    let (body, end) = self.parse_block(&["endfor"])?;
                    end.ok_or_else(|| unclosed("for", line))?;
                    for_loop.otherwise = Some(body);
                }
                self.depth -= 1;
                Ok(Node::For(for_loop))
            }
            "capture" => {
                self.enter(line)?;
                let name = parse_variable_name(rest, "capture", line)?;
                let (body, end) = self.parse_block(&["endcapture"])?;
                end.ok_or_else(|| unclosed("capture", line))?;
                self.depth -= 1;
                Ok(Node::Capture { name, body })
            }
            "assign" => {
                let (target, value) = rest.split_once('=').ok_or_else(|| {
                    TemplateError::syntax("Expected 'assign name = value'", line)
                })?;
                let name = parse_variable_name(target, "assign", line)?;
                Ok(Node::Assign {
                    name,
                    value: parse_filtered(value, line)?,
                })
            }
            "break" => Ok(Node::Break),
            "continue" => Ok(Node::Continue),
            "" => Err(TemplateError::syntax("Empty tag", line)),
            other => Err(TemplateError::syntax(format!("Unknown tag '{other}'"), line)),
        }
    }
}

fn unclosed(tag: &str, line: usize) -> TemplateError {
    TemplateError::syntax(format!("'{tag}' tag was never closed"), line)
}

fn split_tag(markup: &str) -> (&str, &str) {
    let markup = markup.trim();
    match markup.find(char::is_whitespace) {
        Some(i) => (&markup[..i], markup[i..].trim()),
        None => (markup, ""),
    }
}

fn parse_variable_name(src: &str, tag: &str, line: usize) -> Result<String, TemplateError> {
    let name = src.trim();
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name.to_string())
    } else {
        Err(TemplateError::syntax(
            format!("Invalid variable name '{name}' in '{tag}'"),
            line,
        ))
    }
}

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(Value),
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Colon,
    Comma,
    Op(CompareOp),
}

fn lex_expr(src: &str, line: usize) -> Result<Vec<Tok>, TemplateError> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '"' | '\'' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|p| start + p)
                    .ok_or_else(|| TemplateError::syntax("Unterminated string literal", line))?;
                toks.push(Tok::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                toks.push(Tok::DotDot);
                i += 2;
            }
            '.' => {
                toks.push(Tok::Dot);
                i += 1;
            }
            '[' => {
                toks.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                toks.push(Tok::RBracket);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            ':' => {
                toks.push(Tok::Colon);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::Ne, 2),
                    ('<', Some('>')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => {
                        return Err(TemplateError::syntax(
                            format!("Unexpected character '{c}'"),
                            line,
                        ))
                    }
                };
                toks.push(Tok::Op(op));
                i += len;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                toks.push(Tok::Num(parse_number(&text, line)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-' || chars[i] == '?')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word == "contains" {
                    toks.push(Tok::Op(CompareOp::Contains));
                } else {
                    toks.push(Tok::Ident(word));
                }
            }
            other => {
                return Err(TemplateError::syntax(
                    format!("Unexpected character '{other}'"),
                    line,
                ))
            }
        }
    }
    Ok(toks)
}

fn parse_number(text: &str, line: usize) -> Result<Value, TemplateError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| TemplateError::syntax(format!("Invalid number '{text}'"), line))
}

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
    line: usize,
}

impl ExprParser {
    fn new(src: &str, line: usize) -> Result<Self, TemplateError> {
        Ok(Self {
            toks: lex_expr(src, line)?,
            pos: 0,
            line,
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), TemplateError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {what}")))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(message, self.line)
    }

    fn expr(&mut self) -> Result<Expr, TemplateError> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Num(n)) => Ok(Expr::Literal(n)),
            Some(Tok::LParen) => {
                let start = self.expr()?;
                self.expect(Tok::DotDot, "'..' in range")?;
                let end = self.expr()?;
                self.expect(Tok::RParen, "')' to close range")?;
                Ok(Expr::Range(Box::new(start), Box::new(end)))
            }
            Some(Tok::LBracket) => {
                let key = self.expr()?;
                self.expect(Tok::RBracket, "']'")?;
                self.path(vec![Segment::Index(key)])
            }
            Some(Tok::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" | "null" => Ok(Expr::Literal(Value::Null)),
                "empty" => Ok(Expr::Empty),
                "blank" => Ok(Expr::Blank),
                _ => self.path(vec![Segment::Key(word)]),
            },
            Some(other) => Err(self.error(format!("Unexpected {other:?} in expression"))),
            None => Err(self.error("Expected an expression")),
        }
    }

    fn path(&mut self, mut segments: Vec<Segment>) -> Result<Expr, TemplateError> {
        loop {
            if self.eat(&Tok::Dot) {
                match self.next() {
                    Some(Tok::Ident(key)) => segments.push(Segment::Key(key)),
                    Some(Tok::Num(Value::Number(n))) if n.is_u64() => {
                        segments.push(Segment::Index(Expr::Literal(Value::Number(n))))
                    }
                    _ => return Err(self.error("Expected a name after '.'")),
                }
            } else if self.eat(&Tok::LBracket) {
                let key = self.expr()?;
                self.expect(Tok::RBracket, "']'")?;
                segments.push(Segment::Index(key));
            } else {
                return Ok(Expr::Path(segments));
            }
        }
    }

    fn filtered(&mut self) -> Result<Filtered, TemplateError> {
        let base = self.expr()?;
        let mut filters = Vec::new();
        while self.eat(&Tok::Pipe) {
            let name = match self.next() {
                Some(Tok::Ident(name)) => name,
                _ => return Err(self.error("Expected a filter name after '|'")),
            };
            if !is_known_filter(&name) {
                return Err(self.error(format!("Unknown filter '{name}'")));
            }
            let mut args = Vec::new();
            if self.eat(&Tok::Colon) {
                args.push(self.expr()?);
                while self.eat(&Tok::Comma) {
                    args.push(self.expr()?);
                }
            }
            filters.push(FilterCall { name, args });
        }
        if !self.at_end() {
            return Err(self.error(format!("Unexpected {:?} after expression", self.toks[self.pos])));
        }
        Ok(Filtered {
            base,
            filters,
            line: self.line,
        })
    }

    fn condition(&mut self) -> Result<Condition, TemplateError> {
        let left = self.comparison()?;
        match self.peek() {
            Some(Tok::Ident(w)) if w == "and" => {
                self.pos += 1;
                Ok(Condition::And(Box::new(left), Box::new(self.condition()?)))
            }
            Some(Tok::Ident(w)) if w == "or" => {
                self.pos += 1;
                Ok(Condition::Or(Box::new(left), Box::new(self.condition()?)))
            }
            None => Ok(left),
            Some(other) => Err(self.error(format!("Unexpected {other:?} in condition"))),
        }
    }

    fn comparison(&mut self) -> Result<Condition, TemplateError> {
        let left = self.expr()?;
        if let Some(Tok::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.expr()?;
            return Ok(Condition::Compare(left, op, right));
        }
        Ok(Condition::Test(left))
    }
}

pub fn parse_filtered(src: &str, line: usize) -> Result<Filtered, TemplateError> {
    if src.trim().is_empty() {
        return Err(TemplateError::syntax("Empty output tag", line));
    }
    ExprParser::new(src, line)?.filtered()
}

fn parse_condition(src: &str, line: usize) -> Result<Condition, TemplateError> {
    if src.trim().is_empty() {
        return Err(TemplateError::syntax("Missing condition", line));
    }
    ExprParser::new(src, line)?.condition()
}

/// `item in collection [limit: n] [offset: n] [reversed]`
fn parse_for_header(src: &str, line: usize) -> Result<ForLoop, TemplateError> {
    let mut p = ExprParser::new(src, line)?;
    let variable = match p.next() {
        Some(Tok::Ident(name)) => name,
        _ => return Err(p.error("Expected a loop variable after 'for'")),
    };
    match p.next() {
        Some(Tok::Ident(w)) if w == "in" => {}
        _ => return Err(p.error("Expected 'in' in 'for' tag")),
    }
    let collection = p.expr()?;
    let mut for_loop = ForLoop {
        variable,
        collection,
        limit: None,
        offset: None,
        reversed: false,
        body: Vec::new(),
        otherwise: None,
        line,
    };
    while let Some(tok) = p.next() {
        match tok {
            Tok::Ident(w) if w == "reversed" => for_loop.reversed = true,
            Tok::Ident(w) if w == "limit" || w == "offset" => {
                p.expect(Tok::Colon, "':'")?;
                let value = p.expr()?;
                if w == "limit" {
                    for_loop.limit = Some(value);
                } else {
                    for_loop.offset = Some(value);
                }
            }
            Tok::Comma => {}
            other => return Err(p.error(format!("Unexpected {other:?} in 'for' tag"))),
        }
    }
    Ok(for_loop)
}
