//! Internal-id machinery: the serialize-side token registry and the
//! deserialize-side binding/patching counterpart.

pub mod factory;
pub mod resolver;

pub use factory::IdFactory;
pub use resolver::{IdResolver, ResolvedHandler};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

///
/// Key
///
/// A real entity key as handed out by a repository: an integer or a string.
/// Portable trees never carry these directly for referenced entities; they
/// carry internal id tokens that bind to keys during deserialization.
/// Serializes untagged, as the bare scalar.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Read a key out of a tree value. Only integers and strings qualify.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Self::Int(key)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::Text(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self::Text(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_from_value_accepts_scalars_only() {
        assert_eq!(Key::from_value(&json!(7)), Some(Key::Int(7)));
        assert_eq!(Key::from_value(&json!("u-1")), Some(Key::Text("u-1".into())));
        assert_eq!(Key::from_value(&json!(null)), None);
        assert_eq!(Key::from_value(&json!([1])), None);
        assert_eq!(Key::from_value(&json!(1.5)), None);
    }

    #[test]
    fn key_value_round_trip() {
        for key in [Key::Int(3), Key::Text("abc".into())] {
            assert_eq!(Key::from_value(&key.to_value()), Some(key));
        }
    }

    #[test]
    fn key_serializes_as_the_bare_scalar() {
        assert_eq!(serde_json::to_value(Key::Int(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::to_value(Key::Text("u-1".into())).unwrap(),
            json!("u-1")
        );

        let int: Key = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(int, Key::Int(3));
        let text: Key = serde_json::from_value(json!("u-1")).unwrap();
        assert_eq!(text, Key::Text("u-1".into()));
    }
}
