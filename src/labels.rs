//! Parsing label selectors in their textual form, as passed in
//! `ListParams::label_selector`, into kube's [`Selector`].
use kube::core::{Expression, Selector};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid label selector {selector:?}: {reason}")]
pub struct ParseError {
    pub selector: String,
    pub reason: String,
}

/// Parses `s` into its expressions. The empty string yields no expressions.
pub fn parse_expressions(s: &str) -> Result<Vec<Expression>, ParseError> {
    let fail = |reason: &str| ParseError {
        selector: s.to_string(),
        reason: reason.to_string(),
    };
    let mut expressions = Vec::new();
    for term in split_terms(s).map_err(|r| fail(r))? {
        let term = term.trim();
        if term.is_empty() {
            if s.trim().is_empty() {
                continue;
            }
            return Err(fail("empty requirement"));
        }
        expressions.push(parse_expression(term).map_err(|r| fail(&r))?);
    }
    Ok(expressions)
}

/// Parses `s` into a selector. The empty selector matches everything.
pub fn parse(s: &str) -> Result<Selector, ParseError> {
    parse_expressions(s).map(Selector::from_iter)
}

/// Splits on commas that are not inside a parenthesized value list.
fn split_terms(s: &str) -> Result<Vec<&str>, &'static str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or("unbalanced parenthesis")?,
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced parenthesis");
    }
    terms.push(&s[start..]);
    Ok(terms)
}

fn validate_key(key: &str) -> Result<String, String> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(key.to_string())
    } else {
        Err(format!("invalid label key {:?}", key))
    }
}

fn validate_value(value: &str) -> Result<String, String> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(value.to_string())
    } else {
        Err(format!("invalid label value {:?}", value))
    }
}

fn parse_set(key: &str, rest: &str) -> Result<(String, BTreeSet<String>), String> {
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| format!("expected parenthesized values for {:?}", key))?;
    let values = inner
        .split(',')
        .map(|v| validate_value(v.trim()))
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok((validate_key(key.trim())?, values))
}

fn parse_expression(term: &str) -> Result<Expression, String> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Expression::DoesNotExist(validate_key(key.trim())?));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Expression::NotEqual(
            validate_key(key.trim())?,
            validate_value(value.trim())?,
        ));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Expression::Equal(
            validate_key(key.trim())?,
            validate_value(value.trim())?,
        ));
    }
    let mut words = term.splitn(2, char::is_whitespace);
    let key = words.next().unwrap_or_default();
    match words.next().map(str::trim_start) {
        None => Ok(Expression::Exists(validate_key(key)?)),
        Some(rest) => {
            if let Some(values) = rest.strip_prefix("notin") {
                let (key, values) = parse_set(key, values)?;
                Ok(Expression::NotIn(key, values))
            } else if let Some(values) = rest.strip_prefix("in") {
                let (key, values) = parse_set(key, values)?;
                Ok(Expression::In(key, values))
            } else {
                Err(format!("unknown operator in {:?}", term))
            }
        }
    }
}
