//! Payload sanitization and privacy protection

use crate::{config::PrivacyConfig, Error, Result};
use serde_json::{Map, Value};

/// Placeholder substituted for every redacted value
pub const REDACTION_MARKER: &str = "*****";

/// Key fragments that mark a field as sensitive (matched against the lowercased key)
pub const DEFAULT_REDACTED_FIELDS: [&str; 4] = ["password", "token", "apikey", "authorization"];

/// Fragment that marks a positional query parameter as sensitive
const PARAM_REDACTION_FRAGMENT: &str = "password";

/// Redact sensitive keys from a JSON value using the default field list.
///
/// Returns a deep copy; `value` itself is never touched.
pub fn sanitize(value: &Value) -> Value {
    Sanitizer::default().sanitize_json(value)
}

/// Redact password-like strings from a positional parameter list.
pub fn sanitize_params(params: &[Value]) -> Vec<Value> {
    Sanitizer::default().sanitize_params(params)
}

/// Key-based redactor for structured payloads
#[derive(Debug, Clone)]
pub struct Sanitizer {
    redacted_fields: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_REDACTED_FIELDS)
    }
}

impl Sanitizer {
    /// Create a sanitizer that redacts keys containing any of `fields`
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            redacted_fields: fields
                .into_iter()
                .map(|field| field.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Build a sanitizer from privacy settings
    pub fn from_config(config: &PrivacyConfig) -> Result<Self> {
        if config.redacted_fields.is_empty() {
            return Err(Error::Config {
                message: "privacy.redacted_fields must not be empty".to_string(),
            });
        }

        Ok(Self::new(&config.redacted_fields))
    }

    /// Check if a field name should be redacted
    pub fn should_redact_field(&self, field_name: &str) -> bool {
        let field_lower = field_name.to_lowercase();
        self.redacted_fields
            .iter()
            .any(|redacted_field| field_lower.contains(redacted_field.as_str()))
    }

    /// Sanitize a JSON value, returning a redacted deep copy
    pub fn sanitize_json(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sanitized = Map::with_capacity(map.len());
                for (key, val) in map {
                    let val = if self.should_redact_field(key) {
                        Value::String(REDACTION_MARKER.to_string())
                    } else {
                        self.sanitize_json(val)
                    };
                    sanitized.insert(key.clone(), val);
                }
                Value::Object(sanitized)
            }
            // Arrays are only walked to reach nested objects
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.sanitize_json(item)).collect())
            }
            _ => value.clone(),
        }
    }

    /// Sanitize positional parameters (e.g. SQL bind values)
    pub fn sanitize_params(&self, params: &[Value]) -> Vec<Value> {
        params
            .iter()
            .map(|param| match param {
                Value::String(s) if s.to_lowercase().contains(PARAM_REDACTION_FRAGMENT) => {
                    Value::String(REDACTION_MARKER.to_string())
                }
                other => other.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_sanitization() {
        let original = json!({
            "name": "pizza diner",
            "email": "d@jwt.com",
            "password": "diner",
            "nested": {
                "refreshToken": "abc.def",
                "Authorization": "Bearer xyz",
                "keep": 1
            }
        });

        let sanitized = sanitize(&original);

        assert_eq!(sanitized["name"], "pizza diner");
        assert_eq!(sanitized["email"], "d@jwt.com");
        assert_eq!(sanitized["password"], REDACTION_MARKER);
        assert_eq!(sanitized["nested"]["refreshToken"], REDACTION_MARKER);
        assert_eq!(sanitized["nested"]["Authorization"], REDACTION_MARKER);
        assert_eq!(sanitized["nested"]["keep"], 1);

        // Input stays intact
        assert_eq!(original["password"], "diner");
        assert_eq!(original["nested"]["refreshToken"], "abc.def");
    }

    #[test]
    fn test_redacts_whole_subtree_under_sensitive_key() {
        let original = json!({ "tokens": { "access": "a", "refresh": "r" } });
        let sanitized = sanitize(&original);
        assert_eq!(sanitized["tokens"], REDACTION_MARKER);
    }

    #[test]
    fn test_objects_inside_arrays_are_sanitized() {
        let original = json!({
            "users": [
                { "id": 1, "userPassword": "x" },
                "password-looking string stays",
                42
            ]
        });

        let sanitized = sanitize(&original);

        assert_eq!(sanitized["users"][0]["id"], 1);
        assert_eq!(sanitized["users"][0]["userPassword"], REDACTION_MARKER);
        assert_eq!(sanitized["users"][1], "password-looking string stays");
        assert_eq!(sanitized["users"][2], 42);
    }

    #[test]
    fn test_apikey_matching_is_case_insensitive() {
        let sanitized = sanitize(&json!({ "X-ApiKey": "k", "apiKeyId": "k2" }));
        assert_eq!(sanitized["X-ApiKey"], REDACTION_MARKER);
        assert_eq!(sanitized["apiKeyId"], REDACTION_MARKER);
    }

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(sanitize(&json!("password")), json!("password"));
        assert_eq!(sanitize(&json!(null)), json!(null));
        assert_eq!(sanitize(&json!([1, 2, 3])), json!([1, 2, 3]));
    }

    #[test]
    fn test_params_sanitization() {
        let params = vec![json!("a"), json!("secretpassword"), json!("b")];
        assert_eq!(sanitize_params(&params), vec![json!("a"), json!("*****"), json!("b")]);

        let mixed = vec![json!(7), json!(null), json!("PassWord1"), json!({"password": "x"})];
        let sanitized = sanitize_params(&mixed);
        assert_eq!(sanitized[0], json!(7));
        assert_eq!(sanitized[1], json!(null));
        assert_eq!(sanitized[2], json!(REDACTION_MARKER));
        assert_eq!(sanitized[3], json!({"password": "x"}));
    }

    #[test]
    fn test_custom_fields_from_config() {
        let config = PrivacyConfig {
            redacted_fields: vec!["Secret".to_string()],
            ..PrivacyConfig::default()
        };
        let sanitizer = Sanitizer::from_config(&config).unwrap();

        let sanitized = sanitizer.sanitize_json(&json!({ "clientSecret": "s", "password": "p" }));
        assert_eq!(sanitized["clientSecret"], REDACTION_MARKER);
        assert_eq!(sanitized["password"], "p");
    }

    #[test]
    fn test_empty_field_list_is_rejected() {
        let config = PrivacyConfig {
            redacted_fields: vec![],
            ..PrivacyConfig::default()
        };
        assert!(Sanitizer::from_config(&config).is_err());
    }
}
