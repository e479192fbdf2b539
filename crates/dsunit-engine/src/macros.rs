//! `$` macro expansion against scenario state
//!
//! Tokens are `$name` or `${name}` where `name` is `[A-Za-z_][A-Za-z0-9_.]*`.
//! A name is looked up as a flat key first, then as a dotted path through
//! nested objects. Unknown tokens are left in place.

use dsunit_core::{Record, Value};
use serde_json::{Map, Value as JsonValue};

type Lookup = Map<String, JsonValue>;

/// Replace every resolvable token in `text`
pub fn expand(text: &str, state: &Lookup) -> String {
    if !text.contains('$') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match parse_token(after) {
            Some((name, consumed)) => match lookup(state, name) {
                Some(value) => {
                    out.push_str(&render(value));
                    rest = &after[consumed..];
                }
                None => {
                    out.push_str(&rest[pos..pos + 1 + consumed]);
                    rest = &after[consumed..];
                }
            },
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expand a field value.
///
/// A text value made of exactly one token resolving to a scalar takes that
/// scalar's type; other text values are expanded as strings.
pub fn expand_value(value: &Value, state: &Lookup) -> Value {
    let text = match value {
        Value::Text(text) if text.contains('$') => text,
        other => return other.clone(),
    };

    if let Some(rest) = text.strip_prefix('$') {
        if let Some((name, consumed)) = parse_token(rest) {
            if consumed == rest.len() {
                if let Some(found) = lookup(state, name) {
                    if !found.is_object() && !found.is_array() {
                        return Value::from_json(found);
                    }
                }
            }
        }
    }
    Value::Text(expand(text, state))
}

pub fn expand_record(record: &Record, state: &Lookup) -> Record {
    record
        .iter()
        .map(|(k, v)| (k.clone(), expand_value(v, state)))
        .collect()
}

/// Parse a token name after `$`, returning the name and bytes consumed
fn parse_token(s: &str) -> Option<(&str, usize)> {
    if let Some(braced) = s.strip_prefix('{') {
        let end = braced.find('}')?;
        let name = &braced[..end];
        return is_name(name).then_some((name, end + 2));
    }

    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    let end = chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let name = s[..end].trim_end_matches('.');
    Some((name, name.len()))
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn lookup<'a>(state: &'a Lookup, name: &str) -> Option<&'a JsonValue> {
    if let Some(value) = state.get(name) {
        return Some(value);
    }
    let mut parts = name.split('.');
    let mut current = state.get(parts.next()?)?;
    for part in parts {
        current = match current {
            JsonValue::Object(map) => map.get(part)?,
            JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
