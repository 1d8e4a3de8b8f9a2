use serde_json::{Map, Value};

use super::filters::{apply as apply_filter, to_number};
use super::parser::{CompareOp, Condition, Expr, Filtered, ForLoop, Node, Segment};
use super::TemplateError;

/// Most iterations a single `for` loop may run.
pub const MAX_LOOP_ITERATIONS: usize = 10_000;

enum Flow {
    Normal,
    Break,
    Continue,
}

/// Variable scopes: the data object at the bottom, `assign`/`capture` and
/// loop variables stacked above it.
pub struct Context<'a> {
    data: &'a Value,
    scopes: Vec<Map<String, Value>>,
    escape: Option<fn(&str) -> String>,
    capturing: usize,
}

impl<'a> Context<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self {
            data,
            scopes: vec![Map::new()],
            escape: None,
            capturing: 0,
        }
    }

    /// Pass every `{{ }}` output through `escape`. Captured text is escaped
    /// when it is output, not when it is captured.
    pub fn escaping(mut self, escape: fn(&str) -> String) -> Self {
        self.escape = Some(escape);
        self
    }

    fn output(&self, text: String) -> String {
        match self.escape {
            Some(escape) if self.capturing == 0 => escape(&text),
            _ => text,
        }
    }

    fn lookup(&self, name: &str) -> Value {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return v.clone();
            }
        }
        self.data.get(name).cloned().unwrap_or(Value::Null)
    }

    /// `assign` and `capture` write to the outermost scope so the value
    /// outlives the block it was set in.
    fn set_global(&mut self, name: String, value: Value) {
        self.scopes[0].insert(name, value);
    }

    fn push(&mut self) {
        self.scopes.push(Map::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn set_local(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }
}

pub fn render_nodes(nodes: &[Node], ctx: &mut Context<'_>, out: &mut String) -> Result<(), TemplateError> {
    render_block(nodes, ctx, out).map(|_| ())
}

fn render_block(nodes: &[Node], ctx: &mut Context<'_>, out: &mut String) -> Result<Flow, TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(filtered) => {
                let text = to_output(&eval_filtered(filtered, ctx)?);
                out.push_str(&ctx.output(text));
            }
            Node::If { branches, otherwise } => {
                let mut taken = None;
                for (condition, body) in branches {
                    if eval_condition(condition, ctx) {
                        taken = Some(body);
                        break;
                    }
                }
                if let Some(body) = taken.or(otherwise.as_ref()) {
                    let flow = render_block(body, ctx, out)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
            }
            Node::Unless {
                condition,
                body,
                otherwise,
            } => {
                let chosen = if !eval_condition(condition, ctx) {
                    Some(body)
                } else {
                    otherwise.as_ref()
                };
                if let Some(body) = chosen {
                    let flow = render_block(body, ctx, out)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
            }
            Node::For(for_loop) => render_for(for_loop, ctx, out)?,
            Node::Assign { name, value } => {
                let value = eval_filtered(value, ctx)?;
                ctx.set_global(name.clone(), value);
            }
            Node::Capture { name, body } => {
                let mut captured = String::new();
                ctx.capturing += 1;
                let flow = render_block(body, ctx, &mut captured);
                ctx.capturing -= 1;
                flow?;
                ctx.set_global(name.clone(), Value::String(captured));
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
    }
    Ok(Flow::Normal)
}

fn render_for(for_loop: &ForLoop, ctx: &mut Context<'_>, out: &mut String) -> Result<(), TemplateError> {
    let mut items = match eval_expr(&for_loop.collection, ctx) {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let offset = for_loop
        .offset
        .as_ref()
        .and_then(|e| to_number(&eval_expr(e, ctx)).as_u64())
        .unwrap_or(0) as usize;
    items = items.into_iter().skip(offset).collect();
    if let Some(limit) = for_loop
        .limit
        .as_ref()
        .and_then(|e| to_number(&eval_expr(e, ctx)).as_u64())
    {
        items.truncate(limit as usize);
    }
    if for_loop.reversed {
        items.reverse();
    }

    if items.is_empty() {
        if let Some(otherwise) = &for_loop.otherwise {
            render_block(otherwise, ctx, out)?;
        }
        return Ok(());
    }
    if items.len() > MAX_LOOP_ITERATIONS {
        return Err(TemplateError::render(
            format!("for loop exceeds {MAX_LOOP_ITERATIONS} iterations"),
            for_loop.line,
        ));
    }

    let length = items.len();
    ctx.push();
    let mut result = Ok(());
    for (i, item) in items.into_iter().enumerate() {
        ctx.set_local(&for_loop.variable, item);
        ctx.set_local(
            "forloop",
            serde_json::json!({
                "index": i + 1,
                "index0": i,
                "rindex": length - i,
                "rindex0": length - i - 1,
                "first": i == 0,
                "last": i + 1 == length,
                "length": length,
            }),
        );
        match render_block(&for_loop.body, ctx, out) {
            Ok(Flow::Break) => break,
            Ok(_) => {}
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    ctx.pop();
    result
}

fn eval_filtered(filtered: &Filtered, ctx: &Context<'_>) -> Result<Value, TemplateError> {
    let mut value = eval_expr(&filtered.base, ctx);
    for filter in &filtered.filters {
        let args: Vec<Value> = filter.args.iter().map(|a| eval_expr(a, ctx)).collect();
        value = apply_filter(&filter.name, value, &args, filtered.line)?;
    }
    Ok(value)
}

fn eval_expr(expr: &Expr, ctx: &Context<'_>) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Empty | Expr::Blank => Value::String(String::new()),
        Expr::Range(start, end) => {
            let start = to_number(&eval_expr(start, ctx)).as_i64().unwrap_or(0);
            let end = to_number(&eval_expr(end, ctx)).as_i64().unwrap_or(0);
            let count = end
                .saturating_sub(start)
                .saturating_add(1)
                .clamp(0, MAX_LOOP_ITERATIONS as i64 + 1);
            Value::Array((0..count).map(|i| Value::from(start + i)).collect())
        }
        Expr::Path(segments) => {
            let mut current = match segments.first() {
                Some(Segment::Key(name)) => ctx.lookup(name),
                Some(Segment::Index(key)) => ctx.lookup(&to_output(&eval_expr(key, ctx))),
                None => Value::Null,
            };
            for segment in &segments[1..] {
                let key = match segment {
                    Segment::Key(k) => Value::String(k.clone()),
                    Segment::Index(e) => eval_expr(e, ctx),
                };
                current = index_into(&current, &key);
            }
            current
        }
    }
}

fn index_into(value: &Value, key: &Value) -> Value {
    match (value, key) {
        (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
        (Value::Array(items), Value::Number(n)) => {
            let len = items.len() as i64;
            let i = n.as_i64().unwrap_or(0);
            let i = if i < 0 { len + i } else { i };
            if (0..len).contains(&i) {
                items[i as usize].clone()
            } else {
                Value::Null
            }
        }
        (Value::Array(items), Value::String(k)) => match k.as_str() {
            "size" => Value::from(items.len()),
            "first" => items.first().cloned().unwrap_or(Value::Null),
            "last" => items.last().cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        (Value::String(s), Value::String(k)) if k == "size" => Value::from(s.chars().count()),
        (Value::Object(map), Value::String(k)) if k == "size" => Value::from(map.len()),
        _ => Value::Null,
    }
}

fn eval_condition(condition: &Condition, ctx: &Context<'_>) -> bool {
    match condition {
        Condition::Test(expr) => is_truthy(&eval_expr(expr, ctx)),
        Condition::And(a, b) => eval_condition(a, ctx) && eval_condition(b, ctx),
        Condition::Or(a, b) => eval_condition(a, ctx) || eval_condition(b, ctx),
        Condition::Compare(left, op, right) => {
            // `empty` and `blank` compare by shape rather than by value.
            match (left, right) {
                (_, Expr::Empty) | (Expr::Empty, _) => {
                    let other = if matches!(right, Expr::Empty) { left } else { right };
                    let result = is_empty_value(&eval_expr(other, ctx));
                    return match op {
                        CompareOp::Eq => result,
                        CompareOp::Ne => !result,
                        _ => false,
                    };
                }
                (_, Expr::Blank) | (Expr::Blank, _) => {
                    let other = if matches!(right, Expr::Blank) { left } else { right };
                    let result = is_blank(&eval_expr(other, ctx));
                    return match op {
                        CompareOp::Eq => result,
                        CompareOp::Ne => !result,
                        _ => false,
                    };
                }
                _ => {}
            }
            compare(&eval_expr(left, ctx), *op, &eval_expr(right, ctx))
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Contains => match (left, right) {
            (Value::String(s), needle) => s.contains(to_output(needle).as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            (Value::Object(map), Value::String(k)) => map.contains_key(k),
            _ => false,
        },
        CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    a.as_f64().partial_cmp(&b.as_f64())
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Only `nil` and `false` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        other => is_empty_value(other),
    }
}

/// Text form of a value as written into template output.
pub fn to_output(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(to_output).collect(),
        Value::Object(_) => value.to_string(),
    }
}
