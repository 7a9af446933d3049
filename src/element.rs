use std::collections::HashMap;
use std::ops::Index;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// A typed conversion out of the element model failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {from} to {to}")]
pub struct CastError {
    from: &'static str,
    to: &'static str,
}

impl CastError {
    pub(crate) fn new(from: &'static str, to: &'static str) -> Self {
        Self { from, to }
    }

    pub fn source_kind(&self) -> &str {
        self.from
    }

    pub fn target_kind(&self) -> &str {
        self.to
    }
}

static NULL: JsonElement = JsonElement::Value(JsonValue::Null);

/// A JSON value tree used wherever no static contract describes the data:
/// untyped request parameters, results and error data of unknown shape.
///
/// Every conversion out of the tree is explicit and fallible. Structural
/// lookups never fail: a missing object member reads as null.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonElement {
    Value(JsonValue),
    Array(JsonArray),
    Object(JsonObject),
}

impl JsonElement {
    pub const NULL: JsonElement = JsonElement::Value(JsonValue::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, JsonElement::Value(JsonValue::Null))
    }

    pub fn as_value(&self) -> Option<&JsonValue> {
        match self {
            JsonElement::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&JsonArray> {
        match self {
            JsonElement::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            JsonElement::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            JsonElement::Value(v) => v.kind_name(),
            JsonElement::Array(_) => "array",
            JsonElement::Object(_) => "object",
        }
    }

    fn scalar(&self) -> Result<&JsonValue, CastError> {
        self.as_value()
            .ok_or_else(|| CastError::new(self.kind_name(), "value"))
    }

    /// Builds an element tree from parsed JSON. Numbers become integers
    /// when they fit in `i64` and floats otherwise.
    pub fn from_json(value: Value) -> JsonElement {
        match value {
            Value::Null => JsonElement::NULL,
            Value::Bool(b) => JsonElement::Value(JsonValue::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => JsonElement::Value(JsonValue::Int(i)),
                None => JsonElement::Value(JsonValue::Float(n.as_f64().unwrap_or(f64::MAX))),
            },
            Value::String(s) => JsonElement::Value(JsonValue::Str(s)),
            Value::Array(items) => {
                JsonElement::Array(items.into_iter().map(JsonElement::from_json).collect())
            }
            Value::Object(members) => JsonElement::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k, JsonElement::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Renders the element back into JSON. Fails for values JSON cannot
    /// carry, such as non-finite floats. Byte sequences encode as base64
    /// strings.
    pub fn to_json(&self) -> Result<Value, CastError> {
        match self {
            JsonElement::Value(JsonValue::Null) => Ok(Value::Null),
            JsonElement::Value(JsonValue::Bool(b)) => Ok(Value::Bool(*b)),
            JsonElement::Value(JsonValue::Int(n)) => Ok(Value::from(*n)),
            JsonElement::Value(JsonValue::Float(v)) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .ok_or_else(|| CastError::new("float", "JSON number")),
            JsonElement::Value(JsonValue::Str(s)) => Ok(Value::String(s.clone())),
            JsonElement::Value(JsonValue::Bytes(b)) => Ok(Value::String(BASE64.encode(b))),
            JsonElement::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|e| e.to_json())
                    .collect::<Result<_, _>>()?,
            )),
            JsonElement::Object(members) => {
                let mut map = serde_json::Map::with_capacity(members.len());
                for (key, value) in members.iter() {
                    map.insert(key.to_string(), value.to_json()?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

impl From<JsonValue> for JsonElement {
    fn from(value: JsonValue) -> Self {
        JsonElement::Value(value)
    }
}

impl From<JsonArray> for JsonElement {
    fn from(value: JsonArray) -> Self {
        JsonElement::Array(value)
    }
}

impl From<JsonObject> for JsonElement {
    fn from(value: JsonObject) -> Self {
        JsonElement::Object(value)
    }
}

impl From<bool> for JsonElement {
    fn from(value: bool) -> Self {
        JsonElement::Value(JsonValue::Bool(value))
    }
}

impl From<i64> for JsonElement {
    fn from(value: i64) -> Self {
        JsonElement::Value(JsonValue::Int(value))
    }
}

impl From<f64> for JsonElement {
    fn from(value: f64) -> Self {
        JsonElement::Value(JsonValue::Float(value))
    }
}

impl From<&str> for JsonElement {
    fn from(value: &str) -> Self {
        JsonElement::Value(JsonValue::Str(value.to_string()))
    }
}

impl From<String> for JsonElement {
    fn from(value: String) -> Self {
        JsonElement::Value(JsonValue::Str(value))
    }
}

impl From<Vec<u8>> for JsonElement {
    fn from(value: Vec<u8>) -> Self {
        JsonElement::Value(JsonValue::Bytes(value))
    }
}

/// A JSON primitive: null, boolean, number (integer or float), string,
/// or a byte sequence carried as a base64 string on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl JsonValue {
    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "boolean",
            JsonValue::Int(_) => "integer",
            JsonValue::Float(_) => "float",
            JsonValue::Str(_) => "string",
            JsonValue::Bytes(_) => "bytes",
        }
    }

    pub fn as_bool(&self) -> Result<bool, CastError> {
        match self {
            JsonValue::Bool(b) => Ok(*b),
            JsonValue::Int(n) => Ok(*n != 0),
            JsonValue::Float(v) => Ok(*v != 0.0),
            JsonValue::Str(s) => s
                .parse()
                .map_err(|_| CastError::new(self.kind_name(), "boolean")),
            _ => Err(CastError::new(self.kind_name(), "boolean")),
        }
    }

    pub fn as_i64(&self) -> Result<i64, CastError> {
        let err = || CastError::new(self.kind_name(), "integer");
        match self {
            JsonValue::Bool(b) => Ok(*b as i64),
            JsonValue::Int(n) => Ok(*n),
            JsonValue::Float(v) => {
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    Ok(*v as i64)
                } else {
                    Err(err())
                }
            }
            JsonValue::Str(s) => s.parse().map_err(|_| err()),
            _ => Err(err()),
        }
    }

    pub fn as_f64(&self) -> Result<f64, CastError> {
        let err = || CastError::new(self.kind_name(), "float");
        match self {
            JsonValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsonValue::Int(n) => Ok(*n as f64),
            JsonValue::Float(v) => Ok(*v),
            JsonValue::Str(s) => s.parse().map_err(|_| err()),
            _ => Err(err()),
        }
    }

    pub fn as_str(&self) -> Result<&str, CastError> {
        match self {
            JsonValue::Str(s) => Ok(s),
            _ => Err(CastError::new(self.kind_name(), "string")),
        }
    }

    /// Locale-invariant rendering of any non-null scalar.
    pub fn to_text(&self) -> Result<String, CastError> {
        match self {
            JsonValue::Bool(b) => Ok(b.to_string()),
            JsonValue::Int(n) => Ok(n.to_string()),
            JsonValue::Float(v) => Ok(v.to_string()),
            JsonValue::Str(s) => Ok(s.clone()),
            JsonValue::Bytes(b) => Ok(BASE64.encode(b)),
            JsonValue::Null => Err(CastError::new("null", "string")),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CastError> {
        match self {
            JsonValue::Bytes(b) => Ok(b.clone()),
            JsonValue::Str(s) => BASE64
                .decode(s)
                .map_err(|_| CastError::new("string", "bytes")),
            _ => Err(CastError::new(self.kind_name(), "bytes")),
        }
    }

    pub fn to_uuid(&self) -> Result<Uuid, CastError> {
        let err = || CastError::new(self.kind_name(), "uuid");
        match self {
            JsonValue::Str(s) => Uuid::parse_str(s).map_err(|_| err()),
            _ => Err(err()),
        }
    }

    pub fn to_datetime(&self) -> Result<DateTime<FixedOffset>, CastError> {
        let err = || CastError::new(self.kind_name(), "date-time");
        match self {
            JsonValue::Str(s) => DateTime::parse_from_rfc3339(s).map_err(|_| err()),
            _ => Err(err()),
        }
    }

    pub fn to_url(&self) -> Result<Url, CastError> {
        let err = || CastError::new(self.kind_name(), "uri");
        match self {
            JsonValue::Str(s) => Url::parse(s).map_err(|_| err()),
            _ => Err(err()),
        }
    }
}

/// A read-only string-keyed JSON object.
///
/// `member` and indexing read null for unknown keys rather than failing,
/// which keeps exploratory inspection of loosely-typed payloads cheap.
/// Member order carries no meaning.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonObject(HashMap<String, JsonElement>);

impl JsonObject {
    pub fn new(members: HashMap<String, JsonElement>) -> Self {
        Self(members)
    }

    pub fn get(&self, key: &str) -> Option<&JsonElement> {
        self.0.get(key)
    }

    pub fn member(&self, key: &str) -> &JsonElement {
        self.0.get(key).unwrap_or(&NULL)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonElement)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<HashMap<String, JsonElement>> for JsonObject {
    fn from(members: HashMap<String, JsonElement>) -> Self {
        Self(members)
    }
}

impl FromIterator<(String, JsonElement)> for JsonObject {
    fn from_iter<I: IntoIterator<Item = (String, JsonElement)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Index<&str> for JsonObject {
    type Output = JsonElement;

    fn index(&self, key: &str) -> &JsonElement {
        self.member(key)
    }
}

/// An ordered JSON array with per-element typed conversion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonArray(Vec<JsonElement>);

impl JsonArray {
    pub fn new(items: Vec<JsonElement>) -> Self {
        Self(items)
    }

    pub fn get(&self, index: usize) -> Option<&JsonElement> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JsonElement> {
        self.0.iter()
    }

    /// Converts each element independently; a failing element reports its
    /// own error without poisoning its neighbors.
    pub fn cast<'a, T: FromElement + 'a>(&'a self) -> impl Iterator<Item = Result<T, CastError>> + 'a {
        self.0.iter().map(T::from_element)
    }

    pub fn to_vec<T: FromElement>(&self) -> Result<Vec<T>, CastError> {
        self.cast().collect()
    }
}

impl From<Vec<JsonElement>> for JsonArray {
    fn from(items: Vec<JsonElement>) -> Self {
        Self(items)
    }
}

impl FromIterator<JsonElement> for JsonArray {
    fn from_iter<I: IntoIterator<Item = JsonElement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Index<usize> for JsonArray {
    type Output = JsonElement;

    fn index(&self, index: usize) -> &JsonElement {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a JsonArray {
    type Item = &'a JsonElement;
    type IntoIter = std::slice::Iter<'a, JsonElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Explicit conversion from an element into a concrete Rust type.
pub trait FromElement: Sized {
    fn from_element(element: &JsonElement) -> Result<Self, CastError>;
}

impl FromElement for JsonElement {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        Ok(element.clone())
    }
}

impl FromElement for bool {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.as_bool()
    }
}

impl FromElement for i64 {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.as_i64()
    }
}

impl FromElement for f64 {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.as_f64()
    }
}

impl FromElement for String {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.to_text()
    }
}

impl FromElement for Vec<u8> {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.to_bytes()
    }
}

impl FromElement for Uuid {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.to_uuid()
    }
}

impl FromElement for DateTime<FixedOffset> {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.to_datetime()
    }
}

impl FromElement for Url {
    fn from_element(element: &JsonElement) -> Result<Self, CastError> {
        element.scalar()?.to_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_coercions() {
        assert_eq!(JsonValue::Int(1).as_bool(), Ok(true));
        assert_eq!(JsonValue::Str("42".into()).as_i64(), Ok(42));
        assert_eq!(JsonValue::Int(2).as_f64(), Ok(2.0));
        assert_eq!(JsonValue::Float(2.5).as_i64().is_err(), true);
        assert_eq!(JsonValue::Float(2.0).as_i64(), Ok(2));
        assert!(JsonValue::Null.to_text().is_err());
    }

    #[test]
    fn uuid_and_time_coercions() {
        let v = JsonValue::Str("67e55044-10b1-426f-9247-bb680e5fe0c8".into());
        assert!(v.to_uuid().is_ok());
        let t = JsonValue::Str("2024-05-01T12:00:00Z".into());
        assert!(t.to_datetime().is_ok());
        assert!(JsonValue::Int(1).to_uuid().is_err());
    }

    #[test]
    fn bytes_round_trip_as_base64() {
        let v = JsonValue::Bytes(vec![1, 2, 3]);
        let text = v.to_text().unwrap();
        assert_eq!(JsonValue::Str(text).to_bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_member_reads_as_null() {
        let obj = JsonElement::from_json(json!({"a": 1}));
        let obj = obj.as_object().unwrap();
        assert!(obj["missing"].is_null());
        assert_eq!(obj.get("missing"), None);
        assert_eq!(obj["a"], JsonElement::from(1i64));
    }

    #[test]
    fn array_cast_reports_per_element() {
        let arr = JsonElement::from_json(json!([1, "x", 3]));
        let arr = arr.as_array().unwrap();
        let cast: Vec<Result<i64, CastError>> = arr.cast().collect();
        assert_eq!(cast[0], Ok(1));
        assert!(cast[1].is_err());
        assert_eq!(cast[2], Ok(3));
        assert!(arr.to_vec::<i64>().is_err());
    }

    #[test]
    fn non_finite_float_is_not_json() {
        let e = JsonElement::from(f64::NAN);
        assert!(e.to_json().is_err());
        assert_eq!(JsonElement::from(1.5).to_json().unwrap(), json!(1.5));
    }

    #[test]
    fn json_round_trip() {
        let v = json!({"a": [1, 2.5, null, true], "b": {"c": "s"}});
        let e = JsonElement::from_json(v.clone());
        assert_eq!(e.to_json().unwrap(), v);
    }
}
