use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use parse_display::Display;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use super::element::{CastError, JsonElement};
use super::id::MessageId;

/// The declared type of a contract parameter, result or error-data slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ValueKind {
    #[display("boolean")]
    Bool,
    #[display("integer")]
    Int,
    #[display("float")]
    Float,
    #[display("string")]
    Str,
    #[display("bytes")]
    Bytes,
    #[display("uuid")]
    Uuid,
    #[display("date-time")]
    Time,
    #[display("uri")]
    Uri,
    #[display("element")]
    Element,
    #[display("object")]
    Object,
    #[display("array")]
    Array,
}

impl ValueKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "boolean",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Uuid => "uuid",
            ValueKind::Time => "date-time",
            ValueKind::Uri => "uri",
            ValueKind::Element => "element",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
        }
    }
}

/// A declared type plus whether JSON null is an acceptable value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamType {
    pub kind: ValueKind,
    pub nullable: bool,
}

impl ParamType {
    pub const fn of(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Converts parsed JSON into the element model under a declared type.
///
/// Null only converts when the type is nullable. Uuid, date-time and uri
/// values must be strings in the respective syntax and are kept as strings
/// after validation. Bytes are carried as base64 strings on the wire.
pub fn convert(value: &Value, ty: &ParamType) -> Result<JsonElement, CastError> {
    if value.is_null() {
        return if ty.nullable {
            Ok(JsonElement::NULL)
        } else {
            Err(CastError::new("null", ty.kind.name()))
        };
    }
    let err = || CastError::new(json_kind(value), ty.kind.name());
    match ty.kind {
        ValueKind::Element => Ok(JsonElement::from_json(value.clone())),
        ValueKind::Bool => value.as_bool().map(JsonElement::from).ok_or_else(err),
        ValueKind::Int => value.as_i64().map(JsonElement::from).ok_or_else(err),
        ValueKind::Float => value.as_f64().map(JsonElement::from).ok_or_else(err),
        ValueKind::Str => value.as_str().map(JsonElement::from).ok_or_else(err),
        ValueKind::Bytes => value
            .as_str()
            .and_then(|s| BASE64.decode(s).ok())
            .map(JsonElement::from)
            .ok_or_else(err),
        ValueKind::Uuid => value
            .as_str()
            .filter(|s| Uuid::parse_str(s).is_ok())
            .map(JsonElement::from)
            .ok_or_else(err),
        ValueKind::Time => value
            .as_str()
            .filter(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .map(JsonElement::from)
            .ok_or_else(err),
        ValueKind::Uri => value
            .as_str()
            .filter(|s| Url::parse(s).is_ok())
            .map(JsonElement::from)
            .ok_or_else(err),
        ValueKind::Object => match value {
            Value::Object(_) => Ok(JsonElement::from_json(value.clone())),
            _ => Err(err()),
        },
        ValueKind::Array => match value {
            Value::Array(_) => Ok(JsonElement::from_json(value.clone())),
            _ => Err(err()),
        },
    }
}

/// The declared parameter shape of one overload of an RPC method.
///
/// A method name maps to an ordered list of these; the decoder tries them
/// in order and the first one that fully binds wins.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestContract {
    /// A no-argument call.
    #[default]
    None,
    /// An ordered parameter list; arguments beyond `required` are optional.
    ByPosition {
        types: Vec<ParamType>,
        required: usize,
    },
    /// A name-keyed parameter set.
    ByName(Vec<(String, ParamType)>),
}

impl RequestContract {
    /// All parameters required.
    pub fn by_position(types: Vec<ParamType>) -> Self {
        let required = types.len();
        Self::by_position_with_required(types, required)
    }

    /// An empty list degrades to the no-argument contract; a required
    /// count beyond the list length clamps to the length.
    pub fn by_position_with_required(types: Vec<ParamType>, required: usize) -> Self {
        if types.is_empty() {
            return RequestContract::None;
        }
        let required = required.min(types.len());
        RequestContract::ByPosition { types, required }
    }

    pub fn by_name(params: Vec<(String, ParamType)>) -> Self {
        if params.is_empty() {
            RequestContract::None
        } else {
            RequestContract::ByName(params)
        }
    }

    pub fn param_count(&self) -> usize {
        match self {
            RequestContract::None => 0,
            RequestContract::ByPosition { types, .. } => types.len(),
            RequestContract::ByName(params) => params.len(),
        }
    }
}

/// Declared result and error-data types for one pending request, keyed by
/// its message identifier. Registered before the request is sent and
/// removed once the response is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseContract {
    result: ParamType,
    error_data: ParamType,
}

impl Default for ResponseContract {
    fn default() -> Self {
        Self {
            result: ParamType::nullable(ValueKind::Element),
            error_data: ParamType::nullable(ValueKind::Element),
        }
    }
}

impl ResponseContract {
    pub fn new(result: ParamType, error_data: ParamType) -> Self {
        Self { result, error_data }
    }

    pub fn result(&self) -> &ParamType {
        &self.result
    }

    pub fn error_data(&self) -> &ParamType {
        &self.error_data
    }
}

/// Supplies contracts to the decoder.
///
/// An absent request-contract list means the method is unsupported; an
/// absent response contract for an inbound response id means the decoder
/// cannot know the expected result type. Implementations are read
/// concurrently with caller-side registration, so they must be internally
/// synchronized, and registration must happen before the matching request
/// is sent.
pub trait ContractResolver: Send + Sync {
    fn request_contracts(&self, method: &str) -> Option<Arc<[RequestContract]>>;
    fn response_contract(&self, id: &MessageId) -> Option<ResponseContract>;
}

/// The reference resolver: a read-mostly method table set up at startup
/// and a per-id response table mutated around each outstanding request.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    requests: RwLock<HashMap<String, Arc<[RequestContract]>>>,
    responses: RwLock<HashMap<MessageId, ResponseContract>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_request(&self, method: impl Into<String>, contracts: Vec<RequestContract>) {
        let method = method.into();
        debug!(method, candidates = contracts.len(), "register request contracts");
        self.requests
            .write()
            .unwrap()
            .insert(method, contracts.into());
    }

    pub fn register_response(&self, id: MessageId, contract: ResponseContract) {
        trace!(id = %id, "register response contract");
        self.responses.write().unwrap().insert(id, contract);
    }

    pub fn remove_response(&self, id: &MessageId) -> Option<ResponseContract> {
        trace!(id = %id, "remove response contract");
        self.responses.write().unwrap().remove(id)
    }

    pub fn clear_responses(&self) {
        debug!("clear response contracts");
        self.responses.write().unwrap().clear();
    }
}

impl ContractResolver for ContractRegistry {
    fn request_contracts(&self, method: &str) -> Option<Arc<[RequestContract]>> {
        self.requests.read().unwrap().get(method).cloned()
    }

    fn response_contract(&self, id: &MessageId) -> Option<ResponseContract> {
        self.responses.read().unwrap().get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_converts_only_when_nullable() {
        assert!(convert(&json!(null), &ParamType::nullable(ValueKind::Int)).is_ok());
        assert!(convert(&json!(null), &ParamType::of(ValueKind::Int)).is_err());
    }

    #[test]
    fn integer_does_not_accept_float() {
        assert_eq!(
            convert(&json!(7), &ParamType::of(ValueKind::Int)),
            Ok(JsonElement::from(7i64))
        );
        assert!(convert(&json!(7.5), &ParamType::of(ValueKind::Int)).is_err());
        // Widening the other way is fine.
        assert_eq!(
            convert(&json!(7), &ParamType::of(ValueKind::Float)),
            Ok(JsonElement::from(7.0))
        );
    }

    #[test]
    fn string_syntax_kinds_validate() {
        let uuid = json!("67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert!(convert(&uuid, &ParamType::of(ValueKind::Uuid)).is_ok());
        assert!(convert(&json!("not-a-uuid"), &ParamType::of(ValueKind::Uuid)).is_err());

        let time = json!("2024-05-01T12:00:00Z");
        assert!(convert(&time, &ParamType::of(ValueKind::Time)).is_ok());
        assert!(convert(&json!("May 1st"), &ParamType::of(ValueKind::Time)).is_err());

        assert!(convert(&json!("https://example.com/"), &ParamType::of(ValueKind::Uri)).is_ok());
    }

    #[test]
    fn bytes_decode_base64() {
        let e = convert(&json!("AQID"), &ParamType::of(ValueKind::Bytes)).unwrap();
        assert_eq!(e, JsonElement::from(vec![1u8, 2, 3]));
        assert!(convert(&json!("!!"), &ParamType::of(ValueKind::Bytes)).is_err());
    }

    #[test]
    fn container_kinds_require_shape() {
        assert!(convert(&json!({"a": 1}), &ParamType::of(ValueKind::Object)).is_ok());
        assert!(convert(&json!([1]), &ParamType::of(ValueKind::Object)).is_err());
        assert!(convert(&json!([1]), &ParamType::of(ValueKind::Array)).is_ok());
        assert!(convert(&json!({"a": 1}), &ParamType::of(ValueKind::Element)).is_ok());
    }

    #[test]
    fn empty_contracts_degrade_to_none() {
        assert_eq!(RequestContract::by_position(vec![]), RequestContract::None);
        assert_eq!(RequestContract::by_name(vec![]), RequestContract::None);
    }

    #[test]
    fn required_count_clamps() {
        let c = RequestContract::by_position_with_required(
            vec![ParamType::of(ValueKind::Int)],
            9,
        );
        assert_eq!(
            c,
            RequestContract::ByPosition {
                types: vec![ParamType::of(ValueKind::Int)],
                required: 1,
            }
        );
    }

    #[test]
    fn registry_lifecycle() {
        let registry = ContractRegistry::new();
        assert!(registry.request_contracts("sum").is_none());
        registry.register_request(
            "sum",
            vec![RequestContract::by_position(vec![
                ParamType::of(ValueKind::Int),
                ParamType::of(ValueKind::Int),
            ])],
        );
        assert_eq!(registry.request_contracts("sum").unwrap().len(), 1);

        let id = MessageId::Int(1);
        assert!(registry.response_contract(&id).is_none());
        registry.register_response(id.clone(), ResponseContract::default());
        assert!(registry.response_contract(&id).is_some());
        assert!(registry.remove_response(&id).is_some());
        assert!(registry.response_contract(&id).is_none());

        registry.register_response(MessageId::Int(2), ResponseContract::default());
        registry.clear_responses();
        assert!(registry.response_contract(&MessageId::Int(2)).is_none());
    }
}
