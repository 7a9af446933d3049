use thiserror::Error;

use super::element::CastError;
use super::id::MessageId;
use super::message::is_system_method;

/// Failures raised by the engine to its immediate caller.
///
/// Structural problems (unparsable input, wrong top-level shape, an empty
/// batch) abort the whole operation. A protocol problem scoped to one
/// message travels as [`MessageError`], either inside a batch slot or
/// wrapped in [`Error::Message`]. Value-conversion problems are a class of
/// their own: the message shape was legal but a leaf value was not
/// representable in the requested type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("top-level JSON value is not an object or an array")]
    InvalidStructure,
    #[error("message batch is empty")]
    EmptyBatch,
    #[error("operation cancelled between batch items")]
    Cancelled,
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("value is not representable in JSON: {0}")]
    InvalidJsonValue(#[from] CastError),
    #[error("message identifier must be a finite number")]
    NonFiniteId,
    #[error("a success response requires an identifier")]
    UndefinedId,
    #[error("error code {0} is inside the reserved range")]
    ErrorCodeRange(i64),
    #[error("method name must not be empty")]
    EmptyMethod,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A protocol failure scoped to a single message.
///
/// Carries the JSON-RPC error code describing the failure, the method name
/// if one had been parsed before the failure, and the message identifier,
/// possibly recovered by a best-effort scan of the rest of the malformed
/// object, so the caller can still address an error response.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (code {code})")]
pub struct MessageError {
    code: i64,
    message: String,
    method: Option<String>,
    id: MessageId,
}

impl MessageError {
    pub(crate) fn new(code: i64, message: impl Into<String>, id: MessageId) -> Self {
        Self {
            code,
            message: message.into(),
            method: None,
            id,
        }
    }

    pub(crate) fn with_method(
        code: i64,
        message: impl Into<String>,
        method: Option<String>,
        id: MessageId,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            method,
            id,
        }
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// True when the failing message had been identified as a request.
    pub fn is_request(&self) -> bool {
        self.method.is_some()
    }

    pub fn is_notification(&self) -> bool {
        self.is_request() && self.id.is_none()
    }

    pub fn is_system(&self) -> bool {
        self.method.as_deref().is_some_and(is_system_method)
    }
}
