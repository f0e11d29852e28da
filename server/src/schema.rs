use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// Epoch inputs at or above this magnitude are milliseconds, below it seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone)]
pub enum Kind {
    String,
    Int,
    Number,
    Bool,
    Date,
    Object(Vec<Field>),
    Array(Box<Kind>),
    Optional(Box<Kind>),
}

impl Kind {
    pub fn object(fields: Vec<Field>) -> Self {
        Kind::Object(fields)
    }

    pub fn array(item: Kind) -> Self {
        Kind::Array(Box::new(item))
    }

    fn expected(&self) -> &'static str {
        match self {
            Kind::String => "expected a string",
            Kind::Int => "expected an integer",
            Kind::Number => "expected a number",
            Kind::Bool => "expected a boolean",
            Kind::Date => "expected a date",
            Kind::Object(_) => "expected an object",
            Kind::Array(_) => "expected an array",
            Kind::Optional(inner) => inner.expected(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
}

impl Field {
    pub fn new(name: &'static str, kind: Kind) -> Self {
        Self { name, kind }
    }

    pub fn optional(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind: Kind::Optional(Box::new(kind)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<Issue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            if issue.field.is_empty() {
                write!(f, "{}{}", sep, issue.message)?;
            } else {
                write!(f, "{}{}: {}", sep, issue.field, issue.message)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum SchemaError {
    // The caller's body does not satisfy the schema.
    Invalid(ValidationError),
    // The schema and the target type disagree; a programming error, not the caller's.
    Shape(serde_json::Error),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Invalid(err) => err.fmt(f),
            SchemaError::Shape(err) => write!(f, "schema shape mismatch: {}", err),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Coerce a raw JSON value against the schema. Unknown object keys are
/// dropped, date fields are normalized to `YYYY-MM-DD` strings, and every
/// violation is reported with its field path.
pub fn coerce(kind: &Kind, value: &Value) -> Result<Value, ValidationError> {
    let mut issues = Vec::new();
    let out = coerce_value(kind, value, "", &mut issues);
    if issues.is_empty() {
        Ok(out.unwrap_or(Value::Null))
    } else {
        Err(ValidationError { issues })
    }
}

/// Coerce and deserialize into the handler's typed input in one step.
pub fn parse<T: DeserializeOwned>(kind: &Kind, value: &Value) -> Result<T, SchemaError> {
    let coerced = coerce(kind, value).map_err(SchemaError::Invalid)?;
    serde_json::from_value(coerced).map_err(SchemaError::Shape)
}

fn coerce_value(kind: &Kind, value: &Value, path: &str, issues: &mut Vec<Issue>) -> Option<Value> {
    match kind {
        Kind::Optional(inner) => {
            if value.is_null() {
                Some(Value::Null)
            } else {
                coerce_value(inner, value, path, issues)
            }
        }
        Kind::String => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            _ => reject(kind, path, issues),
        },
        Kind::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            _ => reject(kind, path, issues),
        },
        Kind::Int => match coerce_int(value) {
            Some(n) => Some(Value::Number(Number::from(n))),
            None => reject(kind, path, issues),
        },
        Kind::Number => match value {
            Value::Number(n) => Some(Value::Number(n.clone())),
            _ => reject(kind, path, issues),
        },
        Kind::Date => match coerce_date(value) {
            Some(date) => Some(Value::String(date.format("%Y-%m-%d").to_string())),
            None => reject(kind, path, issues),
        },
        Kind::Array(item) => match value {
            Value::Array(values) => {
                let mut out = Vec::with_capacity(values.len());
                for (i, entry) in values.iter().enumerate() {
                    let entry_path = format!("{}[{}]", path, i);
                    if let Some(coerced) = coerce_value(item, entry, &entry_path, issues) {
                        out.push(coerced);
                    }
                }
                Some(Value::Array(out))
            }
            _ => reject(kind, path, issues),
        },
        Kind::Object(fields) => match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(fields.len());
                for field in fields {
                    let field_path = join_path(path, field.name);
                    match map.get(field.name) {
                        Some(entry) => {
                            if let Some(coerced) =
                                coerce_value(&field.kind, entry, &field_path, issues)
                            {
                                out.insert(field.name.to_string(), coerced);
                            }
                        }
                        None => {
                            if !matches!(field.kind, Kind::Optional(_)) {
                                issues.push(Issue {
                                    field: field_path,
                                    message: "missing required field".to_string(),
                                });
                            }
                        }
                    }
                }
                Some(Value::Object(out))
            }
            _ => reject(kind, path, issues),
        },
    }
}

fn reject(kind: &Kind, path: &str, issues: &mut Vec<Issue>) -> Option<Value> {
    issues.push(Issue {
        field: path.to_string(),
        message: kind.expected().to_string(),
    });
    None
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n,
        _ => return None,
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    // Whole-valued floats are accepted; 2.0 and 2 mean the same donation number.
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn coerce_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())),
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| {
                let f = n.as_f64()?;
                if f.fract() == 0.0 {
                    Some(f as i64)
                } else {
                    None
                }
            })?;
            let secs = if raw.abs() >= EPOCH_MILLIS_THRESHOLD {
                raw / 1000
            } else {
                raw
            };
            Utc.timestamp_opt(secs, 0).single().map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn is_valid(&self) -> bool {
        self.start_date <= self.end_date
    }
}

pub fn date_range_kind() -> Kind {
    Kind::object(vec![
        Field::new("startDate", Kind::Date),
        Field::new("endDate", Kind::Date),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_date_from_iso_string() {
        let date = coerce_date(&json!("2024-01-31")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn test_coerce_date_from_rfc3339_string() {
        let date = coerce_date(&json!("2024-01-31T15:30:00Z")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn test_coerce_date_from_epoch_seconds_and_millis() {
        // 2024-01-01T00:00:00Z
        let from_secs = coerce_date(&json!(1_704_067_200_i64)).unwrap();
        let from_millis = coerce_date(&json!(1_704_067_200_000_i64)).unwrap();
        assert_eq!(from_secs, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(from_secs, from_millis);
    }

    #[test]
    fn test_coerce_date_rejects_garbage() {
        assert!(coerce_date(&json!("last tuesday")).is_none());
        assert!(coerce_date(&json!(true)).is_none());
    }

    #[test]
    fn test_coerce_int_accepts_whole_floats() {
        assert_eq!(coerce_int(&json!(7)), Some(7));
        assert_eq!(coerce_int(&json!(7.0)), Some(7));
        assert_eq!(coerce_int(&json!(7.5)), None);
    }

    #[test]
    fn test_date_range_contains_is_inclusive() {
        let range = DateRange {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        };
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
    }
}
