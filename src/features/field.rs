use chrono::DateTime;
use sea_orm::{EntityTrait, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// How a query-string value is parsed before it is bound to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
    Uuid,
    /// RFC 3339 timestamp.
    Timestamp,
    /// One of a closed set of string values.
    Enum(&'static [&'static str]),
}

impl FieldKind {
    pub fn parse(&self, field: &str, raw: &str) -> AppResult<Value> {
        let invalid = || AppError::BadRequest(format!("Invalid {}: {}", field, raw));

        let value = match self {
            FieldKind::Int => Value::from(raw.trim().parse::<i32>().map_err(|_| invalid())?),
            FieldKind::Float => Value::from(raw.trim().parse::<f64>().map_err(|_| invalid())?),
            FieldKind::Bool => match raw.trim() {
                "true" => Value::from(true),
                "false" => Value::from(false),
                _ => return Err(invalid()),
            },
            FieldKind::Text => Value::from(raw.to_string()),
            FieldKind::Uuid => Value::from(Uuid::parse_str(raw.trim()).map_err(|_| invalid())?),
            FieldKind::Timestamp => {
                Value::from(DateTime::parse_from_rfc3339(raw.trim()).map_err(|_| invalid())?)
            }
            FieldKind::Enum(allowed) => {
                if !allowed.contains(&raw) {
                    return Err(invalid());
                }
                Value::from(raw.to_string())
            }
        };

        Ok(value)
    }
}

/// An entity whose collection can be listed through the query features.
///
/// Field names are the public, serialized (camelCase) names.
pub trait Queryable: EntityTrait {
    /// Fields that may appear in a `fields` projection.
    const FIELDS: &'static [&'static str];

    /// Column and value kind for a filterable / sortable field.
    fn field(name: &str) -> Option<(Self::Column, FieldKind)>;

    /// Column used for the default (newest first) ordering.
    fn default_sort() -> Self::Column;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(FieldKind::Int.parse("duration", "5").unwrap(), Value::from(5i32));
        assert_eq!(
            FieldKind::Float.parse("price", "497.5").unwrap(),
            Value::from(497.5f64)
        );
        assert!(FieldKind::Int.parse("duration", "five").is_err());
    }

    #[test]
    fn test_parse_enum_is_closed() {
        let kind = FieldKind::Enum(&["easy", "medium", "difficult"]);

        assert_eq!(
            kind.parse("difficulty", "easy").unwrap(),
            Value::from("easy".to_string())
        );
        assert!(kind.parse("difficulty", "extreme").is_err());
    }

    #[test]
    fn test_parse_bool_rejects_garbage() {
        assert_eq!(FieldKind::Bool.parse("secretTour", "true").unwrap(), Value::from(true));
        assert!(FieldKind::Bool.parse("secretTour", "yes").is_err());
    }
}
