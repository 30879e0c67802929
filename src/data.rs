//! Structured render context exposed to templates

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::parser::ast::SyntaxNode;

/// A value templates can read at render time
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TemplateData {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Dictionary(BTreeMap<String, TemplateData>),
    Array(Vec<TemplateData>),
    /// Nodes rendered in sequence when the value is output
    Interpolated(Vec<SyntaxNode>),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Encode any serializable value into a render context
///
/// Structs and maps become dictionaries. Any other value becomes the root
/// as is, and identifier lookups against it render empty.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<TemplateData, EncodeError> {
    Ok(TemplateData::from(serde_json::to_value(value)?))
}

impl TemplateData {
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateData::Null => "null",
            TemplateData::Bool(_) => "bool",
            TemplateData::Int(_) => "int",
            TemplateData::Double(_) => "double",
            TemplateData::String(_) => "string",
            TemplateData::Bytes(_) => "bytes",
            TemplateData::Dictionary(_) => "dictionary",
            TemplateData::Array(_) => "array",
            TemplateData::Interpolated(_) => "interpolated",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TemplateData::Null)
    }

    /// Null, `false`, zero, and empty strings or collections are false
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateData::Null => false,
            TemplateData::Bool(b) => *b,
            TemplateData::Int(n) => *n != 0,
            TemplateData::Double(n) => *n != 0.0,
            TemplateData::String(s) => !s.is_empty(),
            TemplateData::Bytes(b) => !b.is_empty(),
            TemplateData::Dictionary(d) => !d.is_empty(),
            TemplateData::Array(a) => !a.is_empty(),
            TemplateData::Interpolated(nodes) => !nodes.is_empty(),
        }
    }

    /// Walk a dotted path through nested dictionaries
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&TemplateData> {
        path.iter().try_fold(self, |current, key| match current {
            TemplateData::Dictionary(entries) => entries.get(key.as_ref()),
            _ => None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateData::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, TemplateData>> {
        match self {
            TemplateData::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

/// Output form of a value; collections render as JSON-like text
impl fmt::Display for TemplateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateData::Null | TemplateData::Interpolated(_) => Ok(()),
            TemplateData::Bool(b) => write!(f, "{}", b),
            TemplateData::Int(n) => write!(f, "{}", n),
            TemplateData::Double(n) => write!(f, "{}", n),
            TemplateData::String(s) => f.write_str(s),
            TemplateData::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            TemplateData::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            TemplateData::Dictionary(entries) => {
                f.write_str("[")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for TemplateData {
    fn from(b: bool) -> Self {
        TemplateData::Bool(b)
    }
}

impl From<i64> for TemplateData {
    fn from(n: i64) -> Self {
        TemplateData::Int(n)
    }
}

impl From<i32> for TemplateData {
    fn from(n: i32) -> Self {
        TemplateData::Int(n.into())
    }
}

impl From<f64> for TemplateData {
    fn from(n: f64) -> Self {
        TemplateData::Double(n)
    }
}

impl From<String> for TemplateData {
    fn from(s: String) -> Self {
        TemplateData::String(s)
    }
}

impl From<&str> for TemplateData {
    fn from(s: &str) -> Self {
        TemplateData::String(s.to_string())
    }
}

impl From<Vec<TemplateData>> for TemplateData {
    fn from(items: Vec<TemplateData>) -> Self {
        TemplateData::Array(items)
    }
}

impl From<BTreeMap<String, TemplateData>> for TemplateData {
    fn from(entries: BTreeMap<String, TemplateData>) -> Self {
        TemplateData::Dictionary(entries)
    }
}

impl<K: Into<String>, V: Into<TemplateData>> FromIterator<(K, V)> for TemplateData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TemplateData::Dictionary(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for TemplateData {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => TemplateData::Null,
            Value::Bool(b) => TemplateData::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => TemplateData::Int(i),
                None => TemplateData::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => TemplateData::String(s),
            Value::Array(items) => {
                TemplateData::Array(items.into_iter().map(TemplateData::from).collect())
            }
            Value::Object(entries) => TemplateData::Dictionary(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, TemplateData::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Page {
        name: String,
        alert: Alert,
        visits: u32,
    }

    #[derive(Serialize)]
    struct Alert {
        message: String,
    }

    #[test]
    fn test_encode_struct() {
        let data = encode(&Page {
            name: "Vapor".into(),
            alert: Alert {
                message: "Test".into(),
            },
            visits: 3,
        })
        .expect("encodes");

        assert_eq!(data.lookup(&["name"]), Some(&TemplateData::from("Vapor")));
        assert_eq!(
            data.lookup(&["alert", "message"]),
            Some(&TemplateData::from("Test"))
        );
        assert_eq!(data.lookup(&["visits"]), Some(&TemplateData::Int(3)));
        assert_eq!(data.lookup(&["alert", "missing"]), None);
    }

    #[test]
    fn test_encode_scalars_and_arrays() {
        assert_eq!(encode(&5).expect("encodes"), TemplateData::Int(5));
        assert_eq!(
            encode(&vec![1, 2]).expect("encodes"),
            TemplateData::Array(vec![1.into(), 2.into()])
        );
        assert_eq!(encode(&None::<u8>).expect("encodes"), TemplateData::Null);
    }

    #[test]
    fn test_truthiness() {
        assert!(!TemplateData::Null.is_truthy());
        assert!(!TemplateData::Int(0).is_truthy());
        assert!(!TemplateData::from("").is_truthy());
        assert!(!TemplateData::Array(vec![]).is_truthy());
        assert!(TemplateData::Double(0.5).is_truthy());
        assert!(TemplateData::from("x").is_truthy());
    }

    #[test]
    fn test_display() {
        let data: TemplateData = [("a", TemplateData::Int(1)), ("b", TemplateData::from(true))]
            .into_iter()
            .collect();
        assert_eq!(data.to_string(), "[a: 1, b: true]");
        assert_eq!(TemplateData::Null.to_string(), "");
        assert_eq!(TemplateData::Bytes(b"raw".to_vec()).to_string(), "raw");
        assert_eq!(
            TemplateData::Array(vec![1.into(), 2.5.into()]).to_string(),
            "[1, 2.5]"
        );
    }
}
