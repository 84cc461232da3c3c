//! Shared value types.

use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A credential-bearing string that never leaks through logs or dumps.
///
/// `Debug` and `Display` print `[REDACTED]`, and serialization emits
/// `"***REDACTED***"` so a config round-trip cannot exfiltrate the value.
/// Deserialization accepts the plain string. Call [`expose_secret`] at the
/// single place the real value is needed (building the connection URI).
///
/// [`expose_secret`]: SensitiveString::expose_secret
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Wrap a plain string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Read the wrapped value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl JsonSchema for SensitiveString {
    fn schema_name() -> String {
        "SensitiveString".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.format = Some("password".to_string());
            obj.metadata().description =
                Some("Credential value. Redacted in logs and serialized output.".to_string());
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let password = SensitiveString::new("hunter2");
        assert_eq!(format!("{:?}", password), "[REDACTED]");
        assert_eq!(format!("{}", password), "[REDACTED]");
    }

    #[test]
    fn test_expose_secret_returns_value() {
        let password = SensitiveString::from("hunter2");
        assert_eq!(password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_serialize_redacts() {
        let password = SensitiveString::new("hunter2");
        let json = serde_json::to_string(&password).unwrap();
        assert_eq!(json, "\"***REDACTED***\"");
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_plain_string() {
        let password: SensitiveString = serde_json::from_str("\"hunter2\"").unwrap();
        assert_eq!(password.expose_secret(), "hunter2");
    }
}
