use serde_json::{Number, Value};

use super::render::{is_empty_value, to_output};
use crate::compiler::text::escape_attr;
use super::TemplateError;

const FILTERS: &[&str] = &[
    "default", "upcase", "downcase", "capitalize", "strip", "lstrip", "rstrip", "escape",
    "append", "prepend", "replace", "remove", "size", "truncate", "join", "split", "first",
    "last", "plus", "minus", "times", "divided_by", "modulo", "url_encode",
];

pub fn is_known_filter(name: &str) -> bool {
    FILTERS.contains(&name)
}

pub fn apply(name: &str, input: Value, args: &[Value], line: usize) -> Result<Value, TemplateError> {
    let arg_str = |i: usize| args.get(i).map(to_output).unwrap_or_default();
    let need = |n: usize| -> Result<(), TemplateError> {
        if args.len() < n {
            Err(TemplateError::render(
                format!("filter '{name}' expects {n} argument(s), got {}", args.len()),
                line,
            ))
        } else {
            Ok(())
        }
    };

    Ok(match name {
        "default" => {
            let fallback = args.first().cloned().unwrap_or(Value::Null);
            if is_empty_value(&input) || input == Value::Bool(false) {
                fallback
            } else {
                input
            }
        }
        "upcase" => Value::String(to_output(&input).to_uppercase()),
        "downcase" => Value::String(to_output(&input).to_lowercase()),
        "capitalize" => {
            let s = to_output(&input);
            let mut chars = s.chars();
            Value::String(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            })
        }
        "strip" => Value::String(to_output(&input).trim().to_string()),
        "lstrip" => Value::String(to_output(&input).trim_start().to_string()),
        "rstrip" => Value::String(to_output(&input).trim_end().to_string()),
        "escape" => Value::String(escape_attr(&to_output(&input))),
        "append" => {
            need(1)?;
            Value::String(to_output(&input) + &arg_str(0))
        }
        "prepend" => {
            need(1)?;
            Value::String(arg_str(0) + &to_output(&input))
        }
        "replace" => {
            need(2)?;
            Value::String(to_output(&input).replace(&arg_str(0), &arg_str(1)))
        }
        "remove" => {
            need(1)?;
            Value::String(to_output(&input).replace(&arg_str(0), ""))
        }
        "size" => Value::from(size_of(&input)),
        "truncate" => {
            let length = args.first().map(to_number).and_then(|n| n.as_u64()).unwrap_or(50) as usize;
            let ellipsis = if args.len() > 1 { arg_str(1) } else { "...".to_string() };
            Value::String(truncate(&to_output(&input), length, &ellipsis))
        }
        "join" => {
            let sep = if args.is_empty() { " ".to_string() } else { arg_str(0) };
            match input {
                Value::Array(items) => Value::String(
                    items.iter().map(to_output).collect::<Vec<_>>().join(&sep),
                ),
                other => Value::String(to_output(&other)),
            }
        }
        "split" => {
            need(1)?;
            let sep = arg_str(0);
            let s = to_output(&input);
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
            };
            Value::Array(parts)
        }
        "first" => match input {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            Value::String(s) => s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "last" => match input {
            Value::Array(items) => items.into_iter().last().unwrap_or(Value::Null),
            Value::String(s) => s.chars().last().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "plus" | "minus" | "times" | "divided_by" | "modulo" => {
            need(1)?;
            arithmetic(name, &to_number(&input), &to_number(&args[0]), line)?
        }
        "url_encode" => Value::String(url::form_urlencoded::byte_serialize(to_output(&input).as_bytes()).collect()),
        other => {
            return Err(TemplateError::render(format!("Unknown filter '{other}'"), line));
        }
    })
}

fn size_of(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

fn truncate(s: &str, length: usize, ellipsis: &str) -> String {
    if s.chars().count() <= length {
        return s.to_string();
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    s.chars().take(keep).collect::<String>() + ellipsis
}

/// Numeric view of a value: numbers as-is, numeric strings parsed, else 0.
pub fn to_number(value: &Value) -> Number {
    match value {
        Value::Number(n) => n.clone(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Number::from(i)
            } else {
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .unwrap_or_else(|| Number::from(0))
            }
        }
        _ => Number::from(0),
    }
}

fn arithmetic(op: &str, a: &Number, b: &Number, line: usize) -> Result<Value, TemplateError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            "plus" => x.checked_add(y),
            "minus" => x.checked_sub(y),
            "times" => x.checked_mul(y),
            "divided_by" | "modulo" if y == 0 => {
                return Err(TemplateError::render("divided by 0", line));
            }
            "divided_by" => x.checked_div_euclid(y),
            _ => x.checked_rem_euclid(y),
        };
        if let Some(n) = result {
            return Ok(Value::from(n));
        }
    }

    let x = a.as_f64().unwrap_or(0.0);
    let y = b.as_f64().unwrap_or(0.0);
    let result = match op {
        "plus" => x + y,
        "minus" => x - y,
        "times" => x * y,
        _ if y == 0.0 => return Err(TemplateError::render("divided by 0", line)),
        "divided_by" => x / y,
        _ => x % y,
    };
    Ok(Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, input: Value, args: &[Value]) -> Value {
        apply(name, input, args, 1).unwrap()
    }

    #[test]
    fn default_replaces_nil_false_and_empty() {
        for input in [Value::Null, json!(false), json!(""), json!([])] {
            assert_eq!(run("default", input, &[json!("x")]), json!("x"));
        }
        assert_eq!(run("default", json!(0), &[json!("x")]), json!(0));
    }

    #[test]
    fn string_filters() {
        assert_eq!(run("capitalize", json!("ada lovelace"), &[]), json!("Ada lovelace"));
        assert_eq!(run("replace", json!("a-b-c"), &[json!("-"), json!("+")]), json!("a+b+c"));
        assert_eq!(run("truncate", json!("Hello world"), &[json!(8)]), json!("Hello..."));
        assert_eq!(run("escape", json!("<a href='x'>"), &[]), json!("&lt;a href=&#39;x&#39;&gt;"));
        assert_eq!(run("url_encode", json!("a b&c"), &[]), json!("a+b%26c"));
    }

    #[test]
    fn integer_and_float_math() {
        assert_eq!(run("plus", json!(2), &[json!("3")]), json!(5));
        assert_eq!(run("divided_by", json!(7), &[json!(2)]), json!(3));
        assert_eq!(run("times", json!(1.5), &[json!(2)]), json!(3.0));
        assert!(apply("divided_by", json!(1), &[json!(0)], 4).is_err());
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        assert_eq!(
            run("divided_by", json!(i64::MIN), &[json!(-1)]),
            json!(9_223_372_036_854_775_808.0)
        );
        assert!(apply("modulo", json!(i64::MIN), &[json!(-1)], 1).is_ok());
        assert!(apply("times", json!(i64::MAX), &[json!(2)], 1).is_ok());
    }

    #[test]
    fn collection_filters() {
        let list = json!(["a", "b", "c"]);
        assert_eq!(run("join", list.clone(), &[json!(", ")]), json!("a, b, c"));
        assert_eq!(run("first", list.clone(), &[]), json!("a"));
        assert_eq!(run("last", list.clone(), &[]), json!("c"));
        assert_eq!(run("size", list, &[]), json!(3));
        assert_eq!(run("split", json!("a,b"), &[json!(",")]), json!(["a", "b"]));
    }

    #[test]
    fn missing_required_argument() {
        let err = apply("append", json!("a"), &[], 3).unwrap_err();
        assert_eq!(err.line(), 3);
    }
}
