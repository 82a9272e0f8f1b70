//! Label and field selector parsing.
//!
//! Selectors are normalized on the way through so that equivalent selectors
//! written differently by clients map to the same cache key.

use std::fmt;
use std::str::FromStr;

use crate::extract::DecodeError;

/// Operator of a single label requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    GreaterThan,
    LessThan,
}

/// One `key op values` clause of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals => write!(f, "{}={}", self.key, self.values[0]),
            Operator::NotEquals => write!(f, "{}!={}", self.key, self.values[0]),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::GreaterThan => write!(f, "{}>{}", self.key, self.values[0]),
            Operator::LessThan => write!(f, "{}<{}", self.key, self.values[0]),
        }
    }
}

/// A parsed label selector. Requirements are kept sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl FromStr for LabelSelector {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = Vec::new();
        if s.trim().is_empty() {
            return Ok(Self { requirements });
        }

        for term in split_top_level(s)? {
            requirements.push(parse_requirement(term.trim(), s)?);
        }
        requirements.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", req)?;
        }
        Ok(())
    }
}

/// Split on commas that are not inside a parenthesized value set.
fn split_top_level(s: &str) -> Result<Vec<&str>, DecodeError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid_label(s, "unbalanced parentheses"))?;
            }
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid_label(s, "unbalanced parentheses"));
    }
    terms.push(&s[start..]);
    Ok(terms)
}

fn parse_requirement(term: &str, whole: &str) -> Result<Requirement, DecodeError> {
    if term.is_empty() {
        return Err(invalid_label(whole, "empty requirement"));
    }

    if let Some(key) = term.strip_prefix('!') {
        let key = key.trim();
        validate_key(key, whole)?;
        return Ok(Requirement { key: key.to_string(), operator: Operator::DoesNotExist, values: Vec::new() });
    }

    if let Some(open) = term.find('(') {
        let close = term
            .rfind(')')
            .filter(|close| *close > open && term[close + 1..].trim().is_empty())
            .ok_or_else(|| invalid_label(whole, "malformed value set"))?;

        let mut head = term[..open].split_whitespace();
        let (key, op) = match (head.next(), head.next(), head.next()) {
            (Some(key), Some(op), None) => (key, op),
            _ => return Err(invalid_label(whole, "expected `key in (...)` or `key notin (...)`")),
        };
        let operator = match op {
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            _ => return Err(invalid_label(whole, "unknown set operator")),
        };
        validate_key(key, whole)?;

        let mut values = Vec::new();
        for value in term[open + 1..close].split(',') {
            let value = value.trim();
            validate_value(value, whole)?;
            values.push(value.to_string());
        }
        if values.iter().all(String::is_empty) {
            return Err(invalid_label(whole, "empty value set"));
        }
        values.sort();
        values.dedup();

        return Ok(Requirement { key: key.to_string(), operator, values });
    }

    let (key, operator, value) = if let Some((k, v)) = term.split_once("!=") {
        (k, Operator::NotEquals, v)
    } else if let Some((k, v)) = term.split_once("==") {
        (k, Operator::Equals, v)
    } else if let Some((k, v)) = term.split_once('=') {
        (k, Operator::Equals, v)
    } else if let Some((k, v)) = term.split_once('>') {
        (k, Operator::GreaterThan, v)
    } else if let Some((k, v)) = term.split_once('<') {
        (k, Operator::LessThan, v)
    } else {
        validate_key(term, whole)?;
        return Ok(Requirement { key: term.to_string(), operator: Operator::Exists, values: Vec::new() });
    };

    let (key, value) = (key.trim(), value.trim());
    validate_key(key, whole)?;
    validate_value(value, whole)?;
    let numeric = matches!(operator, Operator::GreaterThan | Operator::LessThan);
    if numeric && value.parse::<i64>().is_err() {
        return Err(invalid_label(whole, "gt/lt value must be an integer"));
    }
    Ok(Requirement { key: key.to_string(), operator, values: vec![value.to_string()] })
}

fn validate_key(key: &str, whole: &str) -> Result<(), DecodeError> {
    let valid = !key.is_empty()
        && key.len() <= 316
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(())
    } else {
        Err(invalid_label(whole, "invalid label key"))
    }
}

fn validate_value(value: &str, whole: &str) -> Result<(), DecodeError> {
    let valid = value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(invalid_label(whole, "invalid label value"))
    }
}

fn invalid_label(selector: &str, reason: &str) -> DecodeError {
    DecodeError::LabelSelector {
        selector: selector.to_string(),
        reason: reason.to_string(),
    }
}

/// One `field op value` clause of a field selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTerm {
    pub field: String,
    pub negated: bool,
    pub value: String,
}

/// A parsed field selector. Terms keep their input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    terms: Vec<FieldTerm>,
}

impl FieldSelector {
    /// Value the selector pins `field` to, if it has an exact-match term for it.
    pub fn requires_exact_match(&self, field: &str) -> Option<&str> {
        self.terms
            .iter()
            .find(|t| t.field == field && !t.negated)
            .map(|t| t.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl FromStr for FieldSelector {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut terms = Vec::new();
        if s.trim().is_empty() {
            return Ok(Self { terms });
        }

        for term in s.split(',') {
            let term = term.trim();
            let (field, negated, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, true, v)
            } else if let Some((f, v)) = term.split_once("==") {
                (f, false, v)
            } else if let Some((f, v)) = term.split_once('=') {
                (f, false, v)
            } else {
                return Err(DecodeError::FieldSelector {
                    selector: s.to_string(),
                    reason: format!("{term:?} has no operator"),
                });
            };

            let field = field.trim();
            if field.is_empty() {
                return Err(DecodeError::FieldSelector {
                    selector: s.to_string(),
                    reason: "empty field name".to_string(),
                });
            }
            terms.push(FieldTerm {
                field: field.to_string(),
                negated,
                value: value.trim().to_string(),
            });
        }

        Ok(Self { terms })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let op = if term.negated { "!=" } else { "=" };
            write!(f, "{}{}{}", term.field, op, term.value)?;
        }
        Ok(())
    }
}

/// Join label and field selector strings into a single cache key.
///
/// Label part comes first; either side may be absent.
pub fn selector_string(labels: Option<&LabelSelector>, fields: Option<&FieldSelector>) -> String {
    let ls = labels.map(ToString::to_string).unwrap_or_default();
    let fs = fields.map(ToString::to_string).unwrap_or_default();

    match (ls.is_empty(), fs.is_empty()) {
        (false, false) => format!("{ls}&{fs}"),
        (false, true) => ls,
        (true, false) => fs,
        (true, true) => String::new(),
    }
}
