// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource URI Templates
//!
//! A template resource is registered under a URI containing `{variable}`
//! placeholders, such as `greeting://{name}` or `file://{file_path}`. A
//! `resources/read` for a concrete URI that matches the template invokes the
//! template's handler with the extracted variables as string arguments.
//!
//! ## Matching
//!
//! Literal text must match exactly. A variable captures one or more
//! characters: up to the first occurrence of the literal that follows it, or
//! the rest of the URI when it is the last segment. Two variables may not be
//! adjacent, since nothing would separate their values.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriTemplateError {
    #[error("unterminated '{{' at offset {0}")]
    Unterminated(usize),

    #[error("unexpected '}}' at offset {0}")]
    UnexpectedClose(usize),

    #[error("invalid variable name '{0}'")]
    InvalidVariable(String),

    #[error("variable '{0}' appears more than once")]
    DuplicateVariable(String),

    #[error("variables '{0}' and '{1}' are not separated by literal text")]
    AdjacentVariables(String, String),

    #[error("template has no variables")]
    NoVariables,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Whether `uri` is written as a template rather than a concrete URI.
    pub fn is_template(uri: &str) -> bool {
        uri.contains('{')
    }

    pub fn parse(raw: &str) -> Result<Self, UriTemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(UriTemplateError::Unterminated(offset));
                    }
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(UriTemplateError::InvalidVariable(name));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    if let Some(Segment::Variable(previous)) = segments.last() {
                        return Err(UriTemplateError::AdjacentVariables(previous.clone(), name));
                    }
                    if segments.contains(&Segment::Variable(name.clone())) {
                        return Err(UriTemplateError::DuplicateVariable(name));
                    }
                    segments.push(Segment::Variable(name));
                }
                '}' => return Err(UriTemplateError::UnexpectedClose(offset)),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = Self {
            raw: raw.to_string(),
            segments,
        };
        if template.variables().next().is_none() {
            return Err(UriTemplateError::NoVariables);
        }
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Variable names in template order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Schema requiring every variable as a string. Used when a template
    /// resource is registered without a schema of its own.
    pub fn arguments_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .variables()
            .map(|name| (name.to_string(), json!({ "type": "string" })))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.variables().collect::<Vec<_>>(),
        })
    }

    /// Extract variable values from a concrete URI, or `None` if it does not
    /// match.
    pub fn match_uri(&self, uri: &str) -> Option<Map<String, Value>> {
        let mut rest = uri;
        let mut variables = Map::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    rest = rest.strip_prefix(text.as_str())?;
                }
                Segment::Variable(name) => {
                    let end = match self.segments.get(i + 1) {
                        Some(Segment::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    if end == 0 {
                        return None;
                    }
                    variables.insert(name.clone(), Value::String(rest[..end].to_string()));
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(variables)
    }
}
