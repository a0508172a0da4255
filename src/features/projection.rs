use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Identity field, kept by every inclusion projection.
const ID_FIELD: &str = "id";

/// Field selection requested through `fields=`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses `name,price` (inclusion) or `-images,-__v` (exclusion).
    pub fn parse(raw: &str) -> AppResult<Self> {
        let entries: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();

        if entries.is_empty() {
            return Ok(Projection::All);
        }

        let excluded = entries.iter().filter(|entry| entry.starts_with('-')).count();
        if excluded == entries.len() {
            let fields = entries
                .iter()
                .map(|entry| entry.trim_start_matches('-').to_string())
                .collect();
            Ok(Projection::Exclude(fields))
        } else if excluded == 0 {
            Ok(Projection::Include(entries.iter().map(|e| e.to_string()).collect()))
        } else {
            Err(AppError::BadRequest(
                "Cannot mix included and excluded fields in projection".to_string(),
            ))
        }
    }

    /// Included fields must exist; excluding an unknown field is a no-op.
    pub fn validate(&self, known: &[&str]) -> AppResult<()> {
        if let Projection::Include(fields) = self {
            if let Some(unknown) = fields.iter().find(|f| !known.contains(&f.as_str())) {
                return Err(AppError::BadRequest(format!("Unknown field: {}", unknown)));
            }
        }
        Ok(())
    }

    pub fn apply(&self, value: Value) -> Value {
        match (self, value) {
            (Projection::Include(fields), Value::Object(map)) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| key == ID_FIELD || fields.iter().any(|f| f == key))
                    .collect(),
            ),
            (Projection::Exclude(fields), Value::Object(mut map)) => {
                for field in fields {
                    map.remove(field);
                }
                Value::Object(map)
            }
            (_, value) => value,
        }
    }

    pub fn apply_all<T: Serialize>(&self, items: &[T]) -> AppResult<Vec<Value>> {
        items
            .iter()
            .map(|item| {
                serde_json::to_value(item)
                    .map(|value| self.apply(value))
                    .map_err(|e| AppError::Internal(format!("Failed to serialize document: {}", e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_inclusion_and_exclusion() {
        assert_eq!(
            Projection::parse("name, price").unwrap(),
            Projection::Include(vec!["name".to_string(), "price".to_string()])
        );
        assert_eq!(
            Projection::parse("-__v").unwrap(),
            Projection::Exclude(vec!["__v".to_string()])
        );
        assert_eq!(Projection::parse(" , ").unwrap(), Projection::All);
        assert!(Projection::parse("name,-price").is_err());
    }

    #[test]
    fn test_include_keeps_identity() {
        let doc = json!({"id": "t1", "name": "The Forest Hiker", "price": 397, "duration": 5});
        let projected = Projection::parse("name,price").unwrap().apply(doc);

        assert_eq!(projected, json!({"id": "t1", "name": "The Forest Hiker", "price": 397}));
    }

    #[test]
    fn test_exclude_drops_fields() {
        let doc = json!({"id": "t1", "name": "The Sea Explorer", "images": ["a.jpg"]});
        let projected = Projection::parse("-images,-__v").unwrap().apply(doc);

        assert_eq!(projected, json!({"id": "t1", "name": "The Sea Explorer"}));
    }

    #[test]
    fn test_validate_rejects_unknown_inclusion() {
        let known = ["id", "name", "price"];

        assert!(Projection::parse("name").unwrap().validate(&known).is_ok());
        assert!(Projection::parse("password").unwrap().validate(&known).is_err());
        assert!(Projection::parse("-__v").unwrap().validate(&known).is_ok());
    }
}
