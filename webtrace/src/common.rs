use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Value of a span or node attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// String value
    String(Cow<'static, str>),
    /// Signed integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// Double-precision floating point value
    Double(f64),
}

impl From<&'static str> for AttributeValue {
    fn from(s: &'static str) -> Self {
        AttributeValue::String(Cow::Borrowed(s))
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(Cow::Owned(s))
    }
}

impl From<Cow<'static, str>> for AttributeValue {
    fn from(s: Cow<'static, str>) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Int(i.into())
    }
}

impl From<u16> for AttributeValue {
    fn from(i: u16) -> Self {
        AttributeValue::Int(i.into())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(d: f64) -> Self {
        AttributeValue::Double(d)
    }
}

impl AttributeValue {
    /// Returns the string value, if this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(i) => i.fmt(f),
            AttributeValue::Bool(b) => b.fmt(f),
            AttributeValue::Double(d) => d.fmt(f),
        }
    }
}

/// Attribute map keyed by attribute name. Setting an existing key replaces
/// its value.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Trait for errors returned by exporters
pub trait ExportError: std::error::Error + Send + Sync + 'static {
    /// The name of exporter that returned this error
    fn exporter_name(&self) -> &'static str {
        "N/A"
    }
}
