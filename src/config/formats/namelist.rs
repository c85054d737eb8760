//! Fortran namelist files.
//!
//! Each `&group ... /` block becomes a mapping keyed by the lowercased group
//! name. Supported values are logicals (`.true.`, `T`), integers, reals
//! (including `d` exponents), quoted strings, comma-separated lists,
//! repeat counts (`3*0.0`) and empty list slots. Indexed assignments such as
//! `levs(2) = 5` set a single 1-based element.

use super::ConfigFormat;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Number, Value};
use std::path::Path;

/// Largest array a repeat count or element index may produce.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

#[derive(Debug, Default, Clone, Copy)]
pub struct NamelistFormat;

impl ConfigFormat for NamelistFormat {
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        parse_str(&text).map_err(|message| ConfigError::parse(path, message))
    }

    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String> {
        to_namelist_string(map).map_err(|message| ConfigError::parse("<namelist>", message))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Group(String),
    End,
    Word(String),
    Str(String),
    Eq,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '!' => {
                while let Some(&ch) = chars.peek() {
                    if ch == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '&' | '$' => {
                chars.next();
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.eq_ignore_ascii_case("end") {
                    tokens.push(Token::End);
                } else if name.is_empty() {
                    return Err(format!("group marker '{}' without a name", c));
                } else {
                    tokens.push(Token::Group(name.to_ascii_lowercase()));
                }
            }
            '/' => {
                chars.next();
                tokens.push(Token::End);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => {
                            // Doubled quote is an escaped quote.
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                s.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, ',' | '=' | '/' | '!' | '\'' | '"') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

/// Parse namelist text into a mapping of groups.
pub fn parse_str(text: &str) -> Result<Map<String, Value>, String> {
    let tokens = tokenize(text)?;
    let mut groups = Map::new();
    let mut i = 0;

    while i < tokens.len() {
        let Token::Group(name) = &tokens[i] else {
            return Err(format!("expected '&group', found {:?}", tokens[i]));
        };
        i += 1;
        let mut group = Map::new();

        loop {
            match tokens.get(i) {
                None => return Err(format!("group '{}' is not terminated", name)),
                Some(Token::End) => {
                    i += 1;
                    break;
                }
                Some(Token::Comma) => i += 1,
                Some(Token::Word(key)) if tokens.get(i + 1) == Some(&Token::Eq) => {
                    i += 2;
                    let mut values = Vec::new();
                    let mut expecting = true;
                    loop {
                        match tokens.get(i) {
                            Some(Token::Word(_)) if tokens.get(i + 1) == Some(&Token::Eq) => break,
                            Some(Token::Word(w)) => {
                                push_value(&mut values, parse_word(w), tokens.get(i + 1))?;
                                if let Some(Token::Str(_)) = tokens.get(i + 1) {
                                    if w.ends_with('*') {
                                        i += 1;
                                    }
                                }
                                expecting = false;
                            }
                            Some(Token::Str(s)) => {
                                values.push(Value::String(s.clone()));
                                expecting = false;
                            }
                            Some(Token::Comma) => {
                                if expecting {
                                    values.push(Value::Null);
                                }
                                expecting = true;
                            }
                            _ => break,
                        }
                        i += 1;
                    }
                    assign(&mut group, key, values)?;
                }
                Some(other) => return Err(format!("unexpected {:?} in group '{}'", other, name)),
            }
        }

        match groups.remove(name) {
            // A repeated group becomes a list of groups.
            Some(Value::Array(mut list)) => {
                list.push(Value::Object(group));
                groups.insert(name.clone(), Value::Array(list));
            }
            Some(existing) => {
                groups.insert(name.clone(), Value::Array(vec![existing, Value::Object(group)]));
            }
            None => {
                groups.insert(name.clone(), Value::Object(group));
            }
        }
    }
    Ok(groups)
}

/// Push a parsed word, expanding `n*value` repeats. `n*` directly before a
/// string repeats that string.
fn push_value(values: &mut Vec<Value>, parsed: Parsed, next: Option<&Token>) -> Result<(), String> {
    let (n, v) = match parsed {
        Parsed::Value(v) => {
            values.push(v);
            return Ok(());
        }
        Parsed::Repeat(n, Some(v)) => (n, v),
        Parsed::Repeat(n, None) => match next {
            Some(Token::Str(s)) => (n, Value::String(s.clone())),
            _ => (n, Value::Null),
        },
    };
    if values.len().saturating_add(n) > MAX_ARRAY_LEN {
        return Err(format!("repeat count {} exceeds {} elements", n, MAX_ARRAY_LEN));
    }
    values.extend(std::iter::repeat_n(v, n));
    Ok(())
}

enum Parsed {
    Value(Value),
    Repeat(usize, Option<Value>),
}

fn parse_word(word: &str) -> Parsed {
    if let Some((count, rest)) = word.split_once('*') {
        if let Ok(n) = count.parse::<usize>() {
            return Parsed::Repeat(n, if rest.is_empty() { None } else { Some(scalar(rest)) });
        }
    }
    Parsed::Value(scalar(word))
}

fn scalar(word: &str) -> Value {
    let lower = word.to_ascii_lowercase();
    let logical = lower.trim_start_matches('.');
    if logical.starts_with('t') && (lower.starts_with('.') || lower == "t" || lower == "true") {
        return Value::Bool(true);
    }
    if logical.starts_with('f') && (lower.starts_with('.') || lower == "f" || lower == "false") {
        return Value::Bool(false);
    }
    if let Ok(i) = word.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = lower.replace('d', "e").parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(word.to_string())
}

/// Store `values` under `key`, honoring `key(i)` element assignment.
fn assign(group: &mut Map<String, Value>, key: &str, values: Vec<Value>) -> Result<(), String> {
    let key = key.to_ascii_lowercase();
    if let Some((name, index)) = key.strip_suffix(')').and_then(|k| k.split_once('(')) {
        let start: usize = index
            .split(':')
            .next()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&n: &usize| n >= 1)
            .ok_or_else(|| format!("bad index in '{}'", key))?;
        if (start - 1).saturating_add(values.len()) > MAX_ARRAY_LEN {
            return Err(format!("index in '{}' exceeds {} elements", key, MAX_ARRAY_LEN));
        }
        let slot = group
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(vec![slot.take()]);
        }
        if let Value::Array(items) = slot {
            for (offset, v) in values.into_iter().enumerate() {
                let pos = start - 1 + offset;
                if items.len() <= pos {
                    items.resize(pos + 1, Value::Null);
                }
                items[pos] = v;
            }
        }
        return Ok(());
    }
    let value = match values.len() {
        0 => Value::Null,
        1 => values.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(values),
    };
    group.insert(key, value);
    Ok(())
}

/// Write groups back out as namelist text.
pub fn to_namelist_string(map: &Map<String, Value>) -> Result<String, String> {
    let mut out = String::new();
    for (name, group) in map {
        match group {
            Value::Object(items) => write_group(&mut out, name, items),
            Value::Array(list) if list.iter().all(Value::is_object) => {
                for item in list {
                    if let Value::Object(items) = item {
                        write_group(&mut out, name, items);
                    }
                }
            }
            _ => return Err(format!("top-level entry '{}' is not a namelist group", name)),
        }
    }
    Ok(out)
}

fn write_group(out: &mut String, name: &str, items: &Map<String, Value>) {
    out.push_str(&format!("&{}\n", name));
    for (key, value) in items {
        match value {
            Value::Null => {}
            Value::Array(list) => {
                let parts: Vec<String> = list.iter().map(format_value).collect();
                out.push_str(&format!("    {} = {}\n", key, parts.join(", ")));
            }
            other => out.push_str(&format!("    {} = {}\n", key, format_value(other))),
        }
    }
    out.push_str("/\n\n");
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => ".true.".to_string(),
        Value::Bool(false) => ".false.".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format!("{:?}", f),
            _ => n.to_string(),
        },
        Value::Null => String::new(),
        other => format!("'{}'", other),
    }
}
