//! Path-based field extraction from raw event payloads.
//!
//! Transformers address payload fields with dotted paths (`agRisk.value`,
//! `actionOnFailure.risk`). A JSON `null` counts as absent so that sparse
//! overwrites leave the default untouched.

use std::fmt;

use serde_json::Value;

use crate::entity::EntityError;

/// Represents a path to a field in a payload
///
/// - `user.name` - nested object access
/// - `items.[0].name` - array element access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "user", "name")
    Field(String),
    /// An array index (e.g., [0], [5])
    Index(usize),
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('[') && s.ends_with(']') {
                    if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                        return PathSegment::Index(index);
                    }
                }
                PathSegment::Field(s.to_string())
            })
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Create a field path from a dotted string
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Borrowed view over one raw JSON payload
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    value: &'a Value,
}

impl<'a> Payload<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Resolve a path; `None` when any segment is missing or the leaf is null
    pub fn resolve(&self, path: &FieldPath) -> Option<&'a Value> {
        let mut current = self.value;
        for segment in &path.segments {
            current = match segment {
                PathSegment::Field(name) => current.get(name.as_str())?,
                PathSegment::Index(index) => current.get(*index)?,
            };
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    pub fn get(&self, path: &str) -> Option<&'a Value> {
        self.resolve(&FieldPath::from_dotted(path))
    }

    /// Text form of the payload root itself (list elements such as ids)
    pub fn as_text(&self) -> Option<String> {
        if self.value.is_null() {
            None
        } else {
            Some(scalar_text(self.value))
        }
    }

    /// Text form of a scalar; objects and lists come back JSON-encoded
    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path).map(scalar_text)
    }

    /// First present path among spelling variants
    pub fn text_any(&self, paths: &[&str]) -> Option<String> {
        paths.iter().find_map(|p| self.text(p))
    }

    /// JSON encoding of whatever sits at the path
    pub fn json(&self, path: &str) -> Option<String> {
        self.get(path).map(Value::to_string)
    }

    pub fn json_any(&self, paths: &[&str]) -> Option<String> {
        paths.iter().find_map(|p| self.json(p))
    }

    /// Numeric field; strings holding a number are accepted
    pub fn number(&self, path: &str) -> Result<Option<f64>, EntityError> {
        match self.get(path) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                EntityError::InvalidFieldValue {
                    field: path.to_string(),
                    reason: format!("'{}' is not a number", s),
                }
            }),
            Some(other) => Err(EntityError::InvalidFieldValue {
                field: path.to_string(),
                reason: format!("expected a number, got {}", other),
            }),
        }
    }

    pub fn integer(&self, path: &str) -> Result<Option<i64>, EntityError> {
        match self.get(path) {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(Some(i)),
                None => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| Some(f as i64))
                    .ok_or_else(|| EntityError::InvalidFieldValue {
                        field: path.to_string(),
                        reason: format!("{} is not an integer", n),
                    }),
            },
            Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| {
                EntityError::InvalidFieldValue {
                    field: path.to_string(),
                    reason: format!("'{}' is not an integer", s),
                }
            }),
            Some(other) => Err(EntityError::InvalidFieldValue {
                field: path.to_string(),
                reason: format!("expected an integer, got {}", other),
            }),
        }
    }

    /// Elements of a list field; a value that is not a list counts as absent
    pub fn list(&self, path: &str) -> Option<&'a [Value]> {
        match self.get(path)? {
            Value::Array(items) => Some(items.as_slice()),
            other => {
                tracing::debug!(field = path, "Ignoring non-list value {}", other);
                None
            }
        }
    }

    /// Nested object, when present
    pub fn object(&self, path: &str) -> Option<Payload<'a>> {
        self.get(path).filter(|v| v.is_object()).map(Payload::new)
    }

    /// Nested object that the mapping cannot do without
    pub fn require(&self, path: &str) -> Result<Payload<'a>, EntityError> {
        self.object(path).ok_or_else(|| EntityError::RequiredFieldMissing {
            field: path.to_string(),
        })
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("user.address.city", ".");

        assert_eq!(path.segments.len(), 3);
        assert_eq!(path.segments[0], PathSegment::Field("user".to_string()));
        assert_eq!(path.segments[2], PathSegment::Field("city".to_string()));
    }

    #[test]
    fn test_field_path_with_index() {
        let path = FieldPath::parse("items.[0].name", ".");

        assert_eq!(path.segments[1], PathSegment::Index(0));
    }

    #[test]
    fn test_payload_text() {
        let value = json!({
            "name": "ops",
            "risk": 7,
            "managed": true,
            "owner": {"displayName": "Ann", "value": "u-1"},
            "empty": null
        });
        let payload = Payload::new(&value);

        assert_eq!(payload.text("name").as_deref(), Some("ops"));
        assert_eq!(payload.text("risk").as_deref(), Some("7"));
        assert_eq!(payload.text("managed").as_deref(), Some("true"));
        assert_eq!(payload.text("owner.displayName").as_deref(), Some("Ann"));
        assert_eq!(payload.text("empty"), None);
        assert_eq!(payload.text("missing.deeper"), None);
    }

    #[test]
    fn test_payload_json() {
        let value = json!({"tags": {"env": "prod"}, "ids": ["a", "b"]});
        let payload = Payload::new(&value);

        assert_eq!(payload.json("tags").as_deref(), Some(r#"{"env":"prod"}"#));
        assert_eq!(payload.json("ids").as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(payload.json_any(&["ownerUids", "ids"]).as_deref(), Some(r#"["a","b"]"#));
    }

    #[test]
    fn test_payload_numbers() {
        let value = json!({"createdOn": 1700000000000i64, "days": "30", "bad": "soon", "half": 2.5});
        let payload = Payload::new(&value);

        assert_eq!(payload.number("createdOn").unwrap(), Some(1700000000000.0));
        assert_eq!(payload.integer("days").unwrap(), Some(30));
        assert_eq!(payload.number("missing").unwrap(), None);
        assert!(payload.number("bad").is_err());
        assert!(payload.integer("half").is_err());
    }

    #[test]
    fn test_payload_list_and_require() {
        let value = json!({"ids": ["a"], "name": "x", "globalIdentity": {"id": "g.USER.1"}});
        let payload = Payload::new(&value);

        assert_eq!(payload.list("ids").map(|l| l.len()), Some(1));
        assert!(payload.list("name").is_none());
        assert!(payload.list("absent").is_none());

        let nested = payload.require("globalIdentity").unwrap();
        assert_eq!(nested.text("id").as_deref(), Some("g.USER.1"));
        assert!(matches!(
            payload.require("identity"),
            Err(EntityError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_resolve_indexed_path() {
        let value = json!({"items": [{"count": "12"}]});
        let payload = Payload::new(&value);

        let path = FieldPath::from_dotted("items.[0].count");
        assert_eq!(payload.resolve(&path), Some(&json!("12")));
        assert_eq!(payload.text("items.[1].count"), None);
    }
}
