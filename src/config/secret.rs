//! Credential wrapper for connection strings
//!
//! A PostgreSQL connection string usually embeds the password, so it lives
//! in a [`secrecy::Secret`]: zeroized on drop, `[REDACTED]` under `Debug`.
//! Reading it requires an explicit `expose_secret()`.
//!
//! ```rust
//! use phimask::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let conn = secret_string("postgresql://phimask:pw@db/phi".to_string());
//! assert!(conn.expose_secret().starts_with("postgresql://"));
//! assert!(!format!("{conn:?}").contains("pw@db"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;
use zeroize::Zeroize;

/// Plaintext held inside a [`SecretString`]
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Deref for SecretValue {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Connection string that never prints
pub type SecretString = Secret<SecretValue>;

/// Wrap a plain string
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_exposed_value_behaves_like_str() {
        let secret = secret_string("postgresql://u:pw@db/phi".to_string());
        let exposed = secret.expose_secret();

        assert_eq!(exposed, "postgresql://u:pw@db/phi");
        assert!(exposed.starts_with("postgresql://"));
        assert!(!exposed.is_empty());
        assert_eq!(exposed.len(), 24);
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = secret_string("postgresql://u:hunter2@db/phi".to_string());
        let rendered = format!("{secret:?}");

        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_toml_round_trip_keeps_value() {
        #[derive(Serialize, Deserialize)]
        struct Connection {
            connection_string: SecretString,
        }

        let parsed: Connection =
            toml::from_str("connection_string = \"postgres://localhost/phi\"").unwrap();
        assert_eq!(
            parsed.connection_string.expose_secret(),
            "postgres://localhost/phi"
        );

        let written = toml::to_string(&parsed).unwrap();
        assert!(written.contains("postgres://localhost/phi"));
    }
}
