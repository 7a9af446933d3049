use std::collections::HashMap;

use super::element::JsonElement;
use super::id::MessageId;
use super::{Error, Result};

pub use self::codes as error_codes;

/// Standard JSON-RPC error codes and code ranges, plus the extension code
/// used for malformed inbound responses.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_REQUEST: i64 = -32600;
    /// Not part of the standard: a response from the server was malformed.
    pub const INVALID_RESPONSE: i64 = -31600;
    pub const SERVER_ERROR_LOWER: i64 = -32099;
    pub const SERVER_ERROR_UPPER: i64 = -32000;
    pub const SYSTEM_ERROR_LOWER: i64 = -32768;
    pub const SYSTEM_ERROR_UPPER: i64 = -32000;
}

pub fn is_standard_error_code(code: i64) -> bool {
    matches!(
        code,
        codes::PARSE_ERROR
            | codes::INTERNAL_ERROR
            | codes::INVALID_PARAMS
            | codes::METHOD_NOT_FOUND
            | codes::INVALID_REQUEST
    )
}

pub fn is_server_error_code(code: i64) -> bool {
    (codes::SERVER_ERROR_LOWER..=codes::SERVER_ERROR_UPPER).contains(&code)
}

pub fn is_system_error_code(code: i64) -> bool {
    (codes::SYSTEM_ERROR_LOWER..=codes::SYSTEM_ERROR_UPPER).contains(&code)
}

/// True for JSON-RPC system extension methods: a 4-character
/// case-insensitive `rpc.` prefix.
pub fn is_system_method(method: &str) -> bool {
    let bytes = method.as_bytes();
    bytes.len() >= 4
        && bytes[0].eq_ignore_ascii_case(&b'r')
        && bytes[1].eq_ignore_ascii_case(&b'p')
        && bytes[2].eq_ignore_ascii_case(&b'c')
        && bytes[3] == b'.'
}

/// Method parameters, supplied either as an ordered list or as a
/// name-keyed mapping, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    ByPosition(Vec<JsonElement>),
    ByName(HashMap<String, JsonElement>),
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::ByPosition(items) => items.len(),
            Params::ByName(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable JSON-RPC request message.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: String,
    id: MessageId,
    params: Option<Params>,
}

impl Request {
    /// A request with no parameters. Fails for an empty method name.
    pub fn new(method: impl Into<String>, id: MessageId) -> Result<Self> {
        let method = method.into();
        if method.is_empty() {
            return Err(Error::EmptyMethod);
        }
        Ok(Self {
            method,
            id,
            params: None,
        })
    }

    pub fn with_positional(
        method: impl Into<String>,
        id: MessageId,
        params: Vec<JsonElement>,
    ) -> Result<Self> {
        let mut request = Self::new(method, id)?;
        request.params = Some(Params::ByPosition(params));
        Ok(request)
    }

    pub fn with_named(
        method: impl Into<String>,
        id: MessageId,
        params: HashMap<String, JsonElement>,
    ) -> Result<Self> {
        let mut request = Self::new(method, id)?;
        request.params = Some(Params::ByName(params));
        Ok(request)
    }

    /// A request that expects no response.
    pub fn notification(method: impl Into<String>) -> Result<Self> {
        Self::new(method, MessageId::None)
    }

    pub(crate) fn from_parts(method: String, id: MessageId, params: Option<Params>) -> Self {
        Self { method, id, params }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    pub fn params_by_position(&self) -> Option<&[JsonElement]> {
        match &self.params {
            Some(Params::ByPosition(items)) => Some(items),
            _ => None,
        }
    }

    pub fn params_by_name(&self) -> Option<&HashMap<String, JsonElement>> {
        match &self.params {
            Some(Params::ByName(members)) => Some(members),
            _ => None,
        }
    }

    /// Count of supplied parameters, whichever shape is set.
    pub fn param_count(&self) -> usize {
        self.params.as_ref().map_or(0, Params::len)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_system(&self) -> bool {
        is_system_method(&self.method)
    }
}

/// An immutable JSON-RPC response message: exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    id: MessageId,
    body: Body,
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Result(JsonElement),
    Error(ErrorObject),
}

impl Response {
    /// A success response. The identifier must name the answered request,
    /// so `MessageId::None` is rejected.
    pub fn success(id: MessageId, result: JsonElement) -> Result<Self> {
        if id.is_none() {
            return Err(Error::UndefinedId);
        }
        Ok(Self {
            id,
            body: Body::Result(result),
        })
    }

    /// An error response. An absent identifier is allowed here: an error
    /// may answer a request whose identifier could not be read.
    pub fn error(id: MessageId, error: ErrorObject) -> Self {
        Self {
            id,
            body: Body::Error(error),
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn result(&self) -> Option<&JsonElement> {
        match &self.body {
            Body::Result(result) => Some(result),
            Body::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&ErrorObject> {
        match &self.body {
            Body::Result(_) => None,
            Body::Error(error) => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, Body::Result(_))
    }
}

/// A JSON-RPC error value: code, short message, optional data.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    code: i64,
    message: String,
    data: Option<JsonElement>,
}

impl ErrorObject {
    /// Fails for codes inside the system-reserved range that are neither
    /// standard codes nor inside the server-defined subrange.
    pub fn new(code: i64, message: impl Into<String>) -> Result<Self> {
        if is_system_error_code(code) && !is_server_error_code(code) && !is_standard_error_code(code)
        {
            return Err(Error::ErrorCodeRange(code));
        }
        Ok(Self {
            code,
            message: message.into(),
            data: None,
        })
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: JsonElement) -> Result<Self> {
        let mut error = Self::new(code, message)?;
        error.data = Some(data);
        Ok(error)
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&JsonElement> {
        self.data.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// Either side of the protocol; what a decode produces per message slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn id(&self) -> &MessageId {
        match self {
            Message::Request(request) => request.id(),
            Message::Response(response) => response.id(),
        }
    }

    pub fn into_request(self) -> Option<Request> {
        match self {
            Message::Request(request) => Some(request),
            Message::Response(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Message::Request(_) => None,
            Message::Response(response) => Some(response),
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}
