//! Filter operations for document queries

use serde_json::Value;
use std::cmp::Ordering;

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Neq,

    /// Greater than
    Gt,

    /// Greater than or equal to
    Gte,

    /// Less than
    Lt,

    /// Less than or equal to
    Lte,

    /// Like (case sensitive), `*` or `%` as wildcard
    Like,

    /// Like (case insensitive)
    ILike,
}

impl FilterOperator {
    /// Convert the operator to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
        }
    }
}

/// A single `column <op> value` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl Filter {
    pub fn new(column: &str, operator: FilterOperator, value: impl ToString) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: value.to_string(),
        }
    }

    /// PostgREST encoding of the right-hand side, e.g. `eq.Orchidaceae`
    pub fn encode(&self) -> String {
        format!("{}.{}", self.operator.as_str(), self.value)
    }

    /// Evaluates the filter against a JSON document. A missing or null
    /// column never matches, mirroring SQL comparison semantics.
    pub fn matches(&self, document: &Value) -> bool {
        let field = match document.get(&self.column) {
            Some(Value::Null) | None => return false,
            Some(field) => field,
        };
        let text = scalar_text(field);

        match self.operator {
            FilterOperator::Eq => text == self.value,
            FilterOperator::Neq => text != self.value,
            FilterOperator::Gt => compare_scalar(field, &self.value) == Ordering::Greater,
            FilterOperator::Gte => compare_scalar(field, &self.value) != Ordering::Less,
            FilterOperator::Lt => compare_scalar(field, &self.value) == Ordering::Less,
            FilterOperator::Lte => compare_scalar(field, &self.value) != Ordering::Greater,
            FilterOperator::Like => wildcard_match(&self.value, &text),
            FilterOperator::ILike => {
                wildcard_match(&self.value.to_lowercase(), &text.to_lowercase())
            }
        }
    }
}

/// Text form of a scalar JSON value as PostgREST would compare it
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric comparison when both sides parse as numbers, lexicographic otherwise
pub(crate) fn compare_scalar(field: &Value, value: &str) -> Ordering {
    let text = scalar_text(field);
    match (text.parse::<f64>(), value.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => text.as_str().cmp(value),
    }
}

/// Orders two documents' values for the same column; nulls sort last
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(a), Some(b)) => compare_scalar(a, &scalar_text(b)),
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // Classic two-pointer glob match with backtracking on the last wildcard
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '*' || pattern[p] == '%') {
            star = Some(p);
            mark = t;
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pattern.len() && (pattern[p] == '*' || pattern[p] == '%') {
        p += 1;
    }
    p == pattern.len()
}
