//! Minimal `{{ name | filter(args) }}` templates used by import rules, inbox
//! configs and forms

use std::{collections::HashMap, sync::LazyLock};

use anyhow::{anyhow, bail, Result};
use regex::Regex;

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("Invalid expression regex"));
static FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\((.*)\))?\s*$").expect("Invalid filter regex")
});

pub type Variables = HashMap<String, String>;

/// Renders every `{{ ... }}` expression.
///
/// Supported filters: `default(value[, true])`, `lower`, `upper`, `trim`.
/// With `true` as the second argument `default` also replaces empty values.
pub fn render(template: &str, variables: &Variables) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    for captures in EXPRESSION.captures_iter(template) {
        let (Some(whole), Some(expression)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.push_str(&template[last..whole.start()]);
        output.push_str(&evaluate(expression.as_str(), variables)?);
        last = whole.end();
    }
    output.push_str(&template[last..]);
    Ok(output)
}

fn evaluate(expression: &str, variables: &Variables) -> Result<String> {
    let mut parts = split_outside_quotes(expression, '|').into_iter();
    let name = parts.next().unwrap_or_default().trim().to_string();
    let mut value = if let Some(literal) = parse_literal(&name) {
        Some(literal)
    } else {
        variables.get(&name).cloned()
    };
    for filter in parts {
        let captures = FILTER
            .captures(&filter)
            .ok_or_else(|| anyhow!("Invalid template filter {:?}", filter.trim()))?;
        let args: Vec<String> = captures
            .get(2)
            .map(|args| split_outside_quotes(args.as_str(), ','))
            .unwrap_or_default()
            .iter()
            .map(|arg| arg.trim().to_string())
            .collect();
        value = match &captures[1] {
            "default" => {
                let fallback = args
                    .first()
                    .and_then(|arg| parse_literal(arg))
                    .ok_or_else(|| anyhow!("default filter expects a literal argument"))?;
                let replace_empty = args.get(1).is_some_and(|arg| arg == "true");
                match value {
                    Some(value) if !(replace_empty && value.is_empty()) => Some(value),
                    _ => Some(fallback),
                }
            }
            "lower" => value.map(|value| value.to_lowercase()),
            "upper" => value.map(|value| value.to_uppercase()),
            "trim" => value.map(|value| value.trim().to_string()),
            other => bail!("Unknown template filter {other}"),
        };
    }
    value.ok_or_else(|| anyhow!("Undefined template variable {name}"))
}

/// String literals in single or double quotes and plain numbers
fn parse_literal(text: &str) -> Option<String> {
    let text = text.trim();
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(text[1..text.len() - 1].to_string());
        }
    }
    let is_number = !text.is_empty()
        && text
            .trim_start_matches('-')
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.');
    is_number.then(|| text.to_string())
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut quote = None;
    for c in text.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == separator => {
                parts.push(String::new());
                continue;
            }
            _ => {}
        }
        if let Some(last) = parts.last_mut() {
            last.push(c);
        }
    }
    parts
}
