//! Filter expressions for population reads.
//!
//! A recursive descent parser for SCIM-style filters such as
//! `department eq "eng" and not (title sw "intern")`, and an evaluator that
//! matches the parsed [`Filter`] against native records.
//!
//! Operators: `eq`, `ne`, `co`, `sw`, `ew`, `gt`, `ge`, `lt`, `le`, `pr`.
//! Logical: `and`, `or`, `not (...)`, and parentheses. `and` binds tighter
//! than `or`. Substring operators compare case-insensitively; equality and
//! ordering are exact. Multi-valued attributes match when any element does.

use std::cmp::Ordering;
use std::str::FromStr;

use idsync_core::record::NativeRecord;
use serde_json::Value;
use thiserror::Error;

/// Filter syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid filter at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),
}

/// A parsed filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Attribute equals value.
    Equals { attribute: String, value: Value },

    /// Attribute does not equal value (also true when absent).
    NotEquals { attribute: String, value: Value },

    /// Attribute contains value (substring).
    Contains { attribute: String, value: String },

    /// Attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Attribute ends with value.
    EndsWith { attribute: String, value: String },

    GreaterThan { attribute: String, value: Value },
    GreaterThanOrEquals { attribute: String, value: Value },
    LessThan { attribute: String, value: Value },
    LessThanOrEquals { attribute: String, value: Value },

    /// Attribute exists and is neither null nor empty.
    Present { attribute: String },

    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create a NOT filter.
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Combine this filter with another using OR.
    pub fn or_with(self, other: Filter) -> Self {
        match self {
            Filter::Or { mut filters } => {
                filters.push(other);
                Filter::Or { filters }
            }
            _ => Filter::Or {
                filters: vec![self, other],
            },
        }
    }

    /// Check if a record matches.
    pub fn matches(&self, record: &NativeRecord) -> bool {
        match self {
            Filter::Equals { attribute, value } => {
                any_value(record, attribute, |v| values_equal(v, value))
            }
            Filter::NotEquals { attribute, value } => {
                !any_value(record, attribute, |v| values_equal(v, value))
            }
            Filter::Contains { attribute, value } => {
                let needle = value.to_lowercase();
                any_str(record, attribute, |s| s.to_lowercase().contains(&needle))
            }
            Filter::StartsWith { attribute, value } => {
                let needle = value.to_lowercase();
                any_str(record, attribute, |s| s.to_lowercase().starts_with(&needle))
            }
            Filter::EndsWith { attribute, value } => {
                let needle = value.to_lowercase();
                any_str(record, attribute, |s| s.to_lowercase().ends_with(&needle))
            }
            Filter::GreaterThan { attribute, value } => {
                any_value(record, attribute, |v| compare(v, value) == Some(Ordering::Greater))
            }
            Filter::GreaterThanOrEquals { attribute, value } => any_value(record, attribute, |v| {
                matches!(compare(v, value), Some(Ordering::Greater | Ordering::Equal))
            }),
            Filter::LessThan { attribute, value } => {
                any_value(record, attribute, |v| compare(v, value) == Some(Ordering::Less))
            }
            Filter::LessThanOrEquals { attribute, value } => any_value(record, attribute, |v| {
                matches!(compare(v, value), Some(Ordering::Less | Ordering::Equal))
            }),
            Filter::Present { attribute } => match lookup(record, attribute) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            },
            Filter::And { filters } => filters.iter().all(|f| f.matches(record)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(record)),
            Filter::Not { filter } => !filter.matches(record),
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterParser::new(s).parse()
    }
}

/// Resolve an attribute by exact name, then as a dotted path into objects.
fn lookup<'a>(record: &'a NativeRecord, attribute: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(attribute) {
        return Some(value);
    }
    let mut parts = attribute.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn any_value(record: &NativeRecord, attribute: &str, test: impl Fn(&Value) -> bool) -> bool {
    match lookup(record, attribute) {
        Some(Value::Array(items)) => items.iter().any(test),
        Some(value) => test(value),
        None => false,
    }
}

fn any_str(record: &NativeRecord, attribute: &str, test: impl Fn(&str) -> bool) -> bool {
    any_value(record, attribute, |v| v.as_str().is_some_and(&test))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Gt,
    Ge,
    Lt,
    Le,
    Pr,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            "ew" => Some(CompareOp::Ew),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            "pr" => Some(CompareOp::Pr),
            _ => None,
        }
    }

    fn is_substring(self) -> bool {
        matches!(self, CompareOp::Co | CompareOp::Sw | CompareOp::Ew)
    }
}

/// Filter parser.
struct FilterParser<'a> {
    input: &'a str,
    pos: usize,
}

type ParseResult<T> = Result<T, FilterError>;

impl<'a> FilterParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> ParseResult<Filter> {
        self.skip_whitespace();
        let filter = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input '{}'",
                &self.input[self.pos..]
            )));
        }
        Ok(filter)
    }

    fn parse_or(&mut self) -> ParseResult<Filter> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_whitespace();
            if !self.try_consume_keyword("or") {
                return Ok(left);
            }
            self.skip_whitespace();
            left = left.or_with(self.parse_and()?);
        }
    }

    fn parse_and(&mut self) -> ParseResult<Filter> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            if !self.try_consume_keyword("and") {
                return Ok(left);
            }
            self.skip_whitespace();
            left = left.and_with(self.parse_unary()?);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Filter> {
        self.skip_whitespace();
        if self.try_consume_keyword("not") {
            self.skip_whitespace();
            if !self.try_consume_char('(') {
                return Err(self.error("expected '(' after 'not'"));
            }
            let inner = self.parse_group_body()?;
            return Ok(Filter::negate(inner));
        }
        if self.try_consume_char('(') {
            return self.parse_group_body();
        }
        self.parse_comparison()
    }

    fn parse_group_body(&mut self) -> ParseResult<Filter> {
        let inner = self.parse_or()?;
        self.skip_whitespace();
        if !self.try_consume_char(')') {
            return Err(self.error("expected ')'"));
        }
        Ok(inner)
    }

    fn parse_comparison(&mut self) -> ParseResult<Filter> {
        let attribute = self.parse_attribute()?;
        self.skip_whitespace();

        let op_str = self.parse_word();
        if op_str.is_empty() {
            return Err(self.error("expected operator"));
        }
        let op = CompareOp::parse(&op_str.to_lowercase())
            .ok_or_else(|| FilterError::UnknownOperator(op_str.clone()))?;

        if op == CompareOp::Pr {
            return Ok(Filter::Present { attribute });
        }

        self.skip_whitespace();
        let value = self.parse_value()?;

        if op.is_substring() {
            let Value::String(value) = value else {
                return Err(self.error(format!("'{op_str}' needs a quoted string")));
            };
            return Ok(match op {
                CompareOp::Co => Filter::Contains { attribute, value },
                CompareOp::Sw => Filter::StartsWith { attribute, value },
                _ => Filter::EndsWith { attribute, value },
            });
        }

        Ok(match op {
            CompareOp::Eq => Filter::Equals { attribute, value },
            CompareOp::Ne => Filter::NotEquals { attribute, value },
            CompareOp::Gt => Filter::GreaterThan { attribute, value },
            CompareOp::Ge => Filter::GreaterThanOrEquals { attribute, value },
            CompareOp::Lt => Filter::LessThan { attribute, value },
            _ => Filter::LessThanOrEquals { attribute, value },
        })
    }

    fn parse_attribute(&mut self) -> ParseResult<String> {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '.' || c == '_' || c == '$' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected attribute name"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_ascii_alphabetic() {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        if self.try_consume_char('"') {
            let mut value = String::new();
            loop {
                let Some(c) = self.current_char() else {
                    return Err(self.error("unterminated string"));
                };
                self.pos += c.len_utf8();
                match c {
                    '"' => return Ok(Value::String(value)),
                    '\\' => {
                        let Some(escaped) = self.current_char() else {
                            return Err(self.error("unterminated string"));
                        };
                        self.pos += escaped.len_utf8();
                        value.push(escaped);
                    }
                    other => value.push(other),
                }
            }
        }

        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '+' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.pos];
        match literal {
            "" => Err(self.error("expected value")),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            _ => serde_json::from_str::<serde_json::Number>(literal)
                .map(Value::Number)
                .map_err(|_| {
                    FilterError::Syntax {
                        position: start,
                        message: format!("'{literal}' is not a quoted string, number or boolean"),
                    }
                }),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn try_consume_char(&mut self, c: char) -> bool {
        if self.current_char() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn try_consume_keyword(&mut self, keyword: &str) -> bool {
        let remaining = &self.input[self.pos..];
        let Some(head) = remaining.get(..keyword.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(keyword) {
            return false;
        }
        let boundary = remaining[keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if boundary {
            self.pos += keyword.len();
        }
        boundary
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        FilterError::Syntax {
            position: self.pos,
            message: message.into(),
        }
    }
}
