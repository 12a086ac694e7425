use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Value {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<Value>),
    Dictionary(BTreeMap<Vec<u8>, Value>),
}

/// Failure to read a decoded value as a particular kind.
#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer {0} out of range")]
    OutOfRange(i64),

    #[error("string is not valid utf8")]
    InvalidUtf8,
}

impl Value {
    pub fn string(string: &str) -> Self {
        Self::String(string.as_bytes().to_vec())
    }

    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    pub fn dictionary() -> Self {
        Self::Dictionary(BTreeMap::new())
    }

    pub fn with_value(mut self, value: Value) -> Self {
        if let Self::List(values) = &mut self {
            values.push(value);
        }
        self
    }

    pub fn with_entry(mut self, key: &str, value: Value) -> Self {
        if let Self::Dictionary(entries) = &mut self {
            entries.insert(key.as_bytes().to_vec(), value);
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::List(_) => "list",
            Self::Dictionary(_) => "dictionary",
        }
    }

    pub fn remove_entry(&mut self, key: &str) -> Result<Value, ValueError> {
        self.try_remove_entry(key)?
            .ok_or_else(|| ValueError::MissingKey(key.to_string()))
    }

    pub fn try_remove_entry(&mut self, key: &str) -> Result<Option<Value>, ValueError> {
        match self {
            Self::Dictionary(entries) => Ok(entries.remove(key.as_bytes())),
            other => Err(ValueError::UnexpectedKind {
                expected: "dictionary",
                found: other.kind(),
            }),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::Dictionary(entries) => entries.contains_key(key.as_bytes()),
            _ => false,
        }
    }

    /// Renders the value as JSON. Byte strings that are not valid UTF-8 are converted lossily.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
            Self::Integer(integer) => (*integer).into(),
            Self::List(values) => values.iter().map(Value::to_json).collect(),
            Self::Dictionary(entries) => entries
                .iter()
                .map(|(key, value)| (String::from_utf8_lossy(key).into_owned(), value.to_json()))
                .collect::<serde_json::Map<_, _>>()
                .into(),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(bytes) => Ok(bytes),
            other => Err(ValueError::UnexpectedKind {
                expected: "string",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let bytes: Vec<u8> = value.try_into()?;
        String::from_utf8(bytes).map_err(|_| ValueError::InvalidUtf8)
    }
}

impl TryFrom<Value> for i64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(integer) => Ok(integer),
            other => Err(ValueError::UnexpectedKind {
                expected: "integer",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<Value> for usize {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let integer: i64 = value.try_into()?;
        usize::try_from(integer).map_err(|_| ValueError::OutOfRange(integer))
    }
}

impl TryFrom<Value> for u16 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let integer: i64 = value.try_into()?;
        u16::try_from(integer).map_err(|_| ValueError::OutOfRange(integer))
    }
}

impl TryFrom<Value> for Duration {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let integer: i64 = value.try_into()?;
        let seconds = u64::try_from(integer).map_err(|_| ValueError::OutOfRange(integer))?;
        Ok(Duration::from_secs(seconds))
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::List(values) => Ok(values),
            other => Err(ValueError::UnexpectedKind {
                expected: "list",
                found: other.kind(),
            }),
        }
    }
}
