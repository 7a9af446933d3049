use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::contract::{ContractResolver, ParamType, RequestContract, ValueKind, convert};
use super::error::MessageError;
use super::id::MessageId;
use super::message::{ErrorObject, Message, Params, Request, Response, error_codes};
use super::{Error, Result};

/// Selects the structural rules of protocol version 1.0 or 2.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompatLevel {
    Level1,
    #[default]
    Level2,
}

/// The result of decoding one message slot: a message, or the protocol
/// failure that kept it from becoming one.
pub type Outcome = Result<Message, MessageError>;

/// What a decode call produces: one message slot, or an ordered batch of
/// them. Iterating yields each slot's outcome in document order.
#[derive(Debug)]
pub enum Decoded {
    Single(Outcome),
    Batch(Vec<Outcome>),
}

impl Decoded {
    pub fn is_batch(&self) -> bool {
        matches!(self, Decoded::Batch(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Decoded::Single(_) => 1,
            Decoded::Batch(outcomes) => outcomes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_single(self) -> Option<Outcome> {
        match self {
            Decoded::Single(outcome) => Some(outcome),
            Decoded::Batch(_) => None,
        }
    }
}

impl IntoIterator for Decoded {
    type Item = Outcome;
    type IntoIter = DecodedIter;

    fn into_iter(self) -> DecodedIter {
        match self {
            Decoded::Single(outcome) => DecodedIter(IterInner::One(Some(outcome))),
            Decoded::Batch(outcomes) => DecodedIter(IterInner::Many(outcomes.into_iter())),
        }
    }
}

pub struct DecodedIter(IterInner);

enum IterInner {
    One(Option<Outcome>),
    Many(std::vec::IntoIter<Outcome>),
}

impl Iterator for DecodedIter {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        match &mut self.0 {
            IterInner::One(slot) => slot.take(),
            IterInner::Many(iter) => iter.next(),
        }
    }
}

/// The streaming decode/encode engine.
///
/// Holds only construction-time settings, so one instance is freely shared
/// across threads; every call is an independent single pass over its input.
#[derive(Clone)]
pub struct Codec {
    compat: CompatLevel,
    resolver: Arc<dyn ContractResolver>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Codec")
            .field("compat", &self.compat)
            .finish_non_exhaustive()
    }
}

impl Codec {
    pub fn new(resolver: Arc<dyn ContractResolver>) -> Self {
        Self::with_compat(resolver, CompatLevel::default())
    }

    pub fn with_compat(resolver: Arc<dyn ContractResolver>, compat: CompatLevel) -> Self {
        Self { compat, resolver }
    }

    pub fn compat(&self) -> CompatLevel {
        self.compat
    }

    /// Decodes one message or a batch from JSON text.
    pub fn decode(&self, json: &str) -> Result<Decoded> {
        self.decode_with(json, None)
    }

    /// Decodes with a cancellation token honored between batch items.
    pub fn decode_with(&self, json: &str, token: Option<&CancellationToken>) -> Result<Decoded> {
        let ctx = Ctx {
            codec: self,
            token,
            fatal: RefCell::new(None),
        };
        let mut de = serde_json::Deserializer::from_str(json);
        let parsed = TopLevelSeed { ctx: &ctx }
            .deserialize(&mut de)
            .and_then(|decoded| de.end().map(|()| decoded));
        match parsed {
            Ok(decoded) => Ok(decoded),
            Err(json_error) => Err(ctx
                .fatal
                .into_inner()
                .unwrap_or(Error::Json(json_error))),
        }
    }

    pub fn encode_request(&self, request: &Request) -> Result<String> {
        Ok(serde_json::to_string(&self.request_value(request)?)?)
    }

    pub fn encode_requests(&self, requests: &[Request]) -> Result<String> {
        self.encode_requests_with(requests, None)
    }

    pub fn encode_requests_with(
        &self,
        requests: &[Request],
        token: Option<&CancellationToken>,
    ) -> Result<String> {
        self.encode_batch(requests, token, |codec, request| {
            codec.request_value(request)
        })
    }

    pub fn encode_response(&self, response: &Response) -> Result<String> {
        Ok(serde_json::to_string(&self.response_value(response)?)?)
    }

    pub fn encode_responses(&self, responses: &[Response]) -> Result<String> {
        self.encode_responses_with(responses, None)
    }

    pub fn encode_responses_with(
        &self,
        responses: &[Response],
        token: Option<&CancellationToken>,
    ) -> Result<String> {
        self.encode_batch(responses, token, |codec, response| {
            codec.response_value(response)
        })
    }

    pub fn encode_message(&self, message: &Message) -> Result<String> {
        match message {
            Message::Request(request) => self.encode_request(request),
            Message::Response(response) => self.encode_response(response),
        }
    }

    fn encode_batch<T>(
        &self,
        items: &[T],
        token: Option<&CancellationToken>,
        to_value: impl Fn(&Self, &T) -> Result<Value>,
    ) -> Result<String> {
        if items.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            values.push(to_value(self, item)?);
        }
        Ok(serde_json::to_string(&Value::Array(values))?)
    }

    fn request_value(&self, request: &Request) -> Result<Value> {
        let mut map = serde_json::Map::new();
        if self.compat == CompatLevel::Level2 {
            map.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
        }
        if !(self.compat == CompatLevel::Level2 && request.id().is_none()) {
            map.insert("id".to_string(), id_value(request.id())?);
        }
        map.insert("method".to_string(), Value::String(request.method().to_string()));
        match request.params() {
            Some(Params::ByPosition(items)) => {
                if !items.is_empty() || self.compat == CompatLevel::Level1 {
                    let mut array = Vec::with_capacity(items.len());
                    for item in items {
                        array.push(item.to_json().map_err(Error::InvalidJsonValue)?);
                    }
                    map.insert("params".to_string(), Value::Array(array));
                }
            }
            Some(Params::ByName(members)) => {
                if self.compat == CompatLevel::Level1 {
                    return Err(Error::Message(MessageError::with_method(
                        error_codes::INVALID_REQUEST,
                        "named parameters cannot be encoded under protocol 1.0",
                        Some(request.method().to_string()),
                        request.id().clone(),
                    )));
                }
                let mut object = serde_json::Map::with_capacity(members.len());
                for (name, value) in members {
                    object.insert(
                        name.clone(),
                        value.to_json().map_err(Error::InvalidJsonValue)?,
                    );
                }
                map.insert("params".to_string(), Value::Object(object));
            }
            None => {
                if self.compat == CompatLevel::Level1 {
                    map.insert("params".to_string(), Value::Array(Vec::new()));
                }
            }
        }
        Ok(Value::Object(map))
    }

    fn response_value(&self, response: &Response) -> Result<Value> {
        let mut map = serde_json::Map::new();
        if self.compat == CompatLevel::Level2 {
            map.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
        }
        map.insert("id".to_string(), id_value(response.id())?);
        match response.result() {
            Some(result) => {
                map.insert(
                    "result".to_string(),
                    result.to_json().map_err(Error::InvalidJsonValue)?,
                );
                if self.compat == CompatLevel::Level1 {
                    map.insert("error".to_string(), Value::Null);
                }
            }
            None => {
                if self.compat == CompatLevel::Level1 {
                    map.insert("result".to_string(), Value::Null);
                }
                if let Some(error) = response.error_object() {
                    map.insert("error".to_string(), error_value(error)?);
                }
            }
        }
        Ok(Value::Object(map))
    }
}

fn id_value(id: &MessageId) -> Result<Value> {
    match id {
        MessageId::None => Ok(Value::Null),
        MessageId::Str(s) => Ok(Value::String(s.clone())),
        MessageId::Int(n) => Ok(Value::from(*n)),
        MessageId::Float(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .ok_or(Error::NonFiniteId),
    }
}

fn error_value(error: &ErrorObject) -> Result<Value> {
    let mut map = serde_json::Map::new();
    map.insert("code".to_string(), Value::from(error.code()));
    map.insert(
        "message".to_string(),
        Value::String(error.message().to_string()),
    );
    if let Some(data) = error.data() {
        map.insert(
            "data".to_string(),
            data.to_json().map_err(Error::InvalidJsonValue)?,
        );
    }
    Ok(Value::Object(map))
}

// Decoding drives a hand-written visitor over serde_json's forward-only
// streaming deserializer, so properties are observed in document order and
// a batch is decoded strictly one item at a time. Per-message protocol
// failures become `Outcome` values; fatal conditions are stashed in `Ctx`
// and surfaced after the deserializer unwinds.
struct Ctx<'c> {
    codec: &'c Codec,
    token: Option<&'c CancellationToken>,
    fatal: RefCell<Option<Error>>,
}

impl Ctx<'_> {
    fn fail_fatal<E: serde::de::Error>(&self, error: Error) -> E {
        *self.fatal.borrow_mut() = Some(error);
        E::custom("decode aborted")
    }
}

struct TopLevelSeed<'c> {
    ctx: &'c Ctx<'c>,
}

impl<'de> DeserializeSeed<'de> for TopLevelSeed<'_> {
    type Value = Decoded;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Decoded, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for TopLevelSeed<'_> {
    type Value = Decoded;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON-RPC message object or a batch array")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Decoded, A::Error>
    where
        A: MapAccess<'de>,
    {
        decode_message(self.ctx, &mut map).map(Decoded::Single)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Decoded, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut outcomes = Vec::new();
        loop {
            if self.ctx.token.is_some_and(|t| t.is_cancelled()) {
                return Err(self.ctx.fail_fatal(Error::Cancelled));
            }
            let item = BatchItemSeed {
                ctx: self.ctx,
                index: outcomes.len(),
            };
            match seq.next_element_seed(item)? {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        if outcomes.is_empty() {
            Err(self.ctx.fail_fatal(Error::EmptyBatch))
        } else {
            Ok(Decoded::Batch(outcomes))
        }
    }

    fn visit_bool<E: serde::de::Error>(self, _: bool) -> std::result::Result<Decoded, E> {
        Err(self.ctx.fail_fatal(Error::InvalidStructure))
    }

    fn visit_i64<E: serde::de::Error>(self, _: i64) -> std::result::Result<Decoded, E> {
        Err(self.ctx.fail_fatal(Error::InvalidStructure))
    }

    fn visit_u64<E: serde::de::Error>(self, _: u64) -> std::result::Result<Decoded, E> {
        Err(self.ctx.fail_fatal(Error::InvalidStructure))
    }

    fn visit_f64<E: serde::de::Error>(self, _: f64) -> std::result::Result<Decoded, E> {
        Err(self.ctx.fail_fatal(Error::InvalidStructure))
    }

    fn visit_str<E: serde::de::Error>(self, _: &str) -> std::result::Result<Decoded, E> {
        Err(self.ctx.fail_fatal(Error::InvalidStructure))
    }

    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Decoded, E> {
        Err(self.ctx.fail_fatal(Error::InvalidStructure))
    }
}

struct BatchItemSeed<'c> {
    ctx: &'c Ctx<'c>,
    index: usize,
}

impl BatchItemSeed<'_> {
    fn invalid_item(&self) -> Outcome {
        Err(MessageError::new(
            error_codes::INVALID_REQUEST,
            format!("batch item {} is not a JSON object", self.index),
            MessageId::None,
        ))
    }
}

impl<'de> DeserializeSeed<'de> for BatchItemSeed<'_> {
    type Value = Outcome;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Outcome, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for BatchItemSeed<'_> {
    type Value = Outcome;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON-RPC message object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Outcome, A::Error>
    where
        A: MapAccess<'de>,
    {
        decode_message(self.ctx, &mut map)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Outcome, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(self.invalid_item())
    }

    fn visit_bool<E: serde::de::Error>(self, _: bool) -> std::result::Result<Outcome, E> {
        Ok(self.invalid_item())
    }

    fn visit_i64<E: serde::de::Error>(self, _: i64) -> std::result::Result<Outcome, E> {
        Ok(self.invalid_item())
    }

    fn visit_u64<E: serde::de::Error>(self, _: u64) -> std::result::Result<Outcome, E> {
        Ok(self.invalid_item())
    }

    fn visit_f64<E: serde::de::Error>(self, _: f64) -> std::result::Result<Outcome, E> {
        Ok(self.invalid_item())
    }

    fn visit_str<E: serde::de::Error>(self, _: &str) -> std::result::Result<Outcome, E> {
        Ok(self.invalid_item())
    }

    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Outcome, E> {
        Ok(self.invalid_item())
    }
}

const HAS_METHOD: u8 = 1;
const HAS_PARAMS: u8 = 1 << 1;
const HAS_RESULT: u8 = 1 << 2;
const HAS_ERROR: u8 = 1 << 3;
const REQUEST_BITS: u8 = HAS_METHOD | HAS_PARAMS;
const RESPONSE_BITS: u8 = HAS_RESULT | HAS_ERROR;

fn decode_message<'de, M>(ctx: &Ctx, map: &mut M) -> std::result::Result<Outcome, M::Error>
where
    M: MapAccess<'de>,
{
    let mut bits = 0u8;
    let mut version: Option<String> = None;
    let mut id: Option<MessageId> = None;
    let mut method: Option<String> = None;
    let mut params: Option<Value> = None;
    let mut result: Option<Value> = None;
    let mut error: Option<Value> = None;

    while let Some(key) = map.next_key::<String>()? {
        let failure: Option<(i64, String)> = match key.as_str() {
            "jsonrpc" => {
                let value: Value = map.next_value()?;
                match ctx.codec.compat {
                    CompatLevel::Level1 => Some((
                        error_codes::INVALID_REQUEST,
                        "the \"jsonrpc\" property is not allowed under protocol 1.0".to_string(),
                    )),
                    CompatLevel::Level2 => match value {
                        Value::String(s) => {
                            version = Some(s);
                            None
                        }
                        _ => Some((
                            error_codes::INVALID_REQUEST,
                            "the \"jsonrpc\" property must be a string".to_string(),
                        )),
                    },
                }
            }
            "id" => {
                let value: Value = map.next_value()?;
                match parse_id(&value) {
                    Some(parsed) => {
                        id = Some(parsed);
                        None
                    }
                    None => Some((
                        error_codes::INVALID_REQUEST,
                        "the \"id\" property must be a string, a number or null".to_string(),
                    )),
                }
            }
            "method" => {
                let value: Value = map.next_value()?;
                if bits & (RESPONSE_BITS | HAS_METHOD) != 0 {
                    Some((
                        error_codes::INVALID_REQUEST,
                        "the \"method\" property is misplaced or duplicated".to_string(),
                    ))
                } else {
                    bits |= HAS_METHOD;
                    match value {
                        Value::String(s) => {
                            method = Some(s);
                            None
                        }
                        _ => Some((
                            error_codes::INVALID_REQUEST,
                            "the \"method\" property must be a string".to_string(),
                        )),
                    }
                }
            }
            "params" => {
                let value: Value = map.next_value()?;
                if bits & (RESPONSE_BITS | HAS_PARAMS) != 0 {
                    Some((
                        error_codes::INVALID_REQUEST,
                        "the \"params\" property is misplaced or duplicated".to_string(),
                    ))
                } else {
                    bits |= HAS_PARAMS;
                    match value {
                        Value::Array(_) | Value::Object(_) => {
                            params = Some(value);
                            None
                        }
                        _ => Some((
                            error_codes::INVALID_REQUEST,
                            "the \"params\" property must be an array or an object".to_string(),
                        )),
                    }
                }
            }
            "result" => {
                let value: Value = map.next_value()?;
                if bits & (REQUEST_BITS | HAS_RESULT) != 0 {
                    Some((
                        error_codes::INVALID_RESPONSE,
                        "the \"result\" property is misplaced or duplicated".to_string(),
                    ))
                } else {
                    bits |= HAS_RESULT;
                    result = Some(value);
                    None
                }
            }
            "error" => {
                let value: Value = map.next_value()?;
                if bits & (REQUEST_BITS | HAS_ERROR) != 0 {
                    Some((
                        error_codes::INVALID_RESPONSE,
                        "the \"error\" property is misplaced or duplicated".to_string(),
                    ))
                } else {
                    bits |= HAS_ERROR;
                    error = Some(value);
                    None
                }
            }
            _ => {
                map.next_value::<IgnoredAny>()?;
                None
            }
        };
        if let Some((code, text)) = failure {
            let id = recover_id(map, id.take())?;
            return Ok(Err(MessageError::with_method(code, text, method, id)));
        }
    }

    let id = id.unwrap_or_default();
    if bits & REQUEST_BITS != 0 {
        Ok(finalize_request(
            ctx.codec,
            version.as_deref(),
            method,
            id,
            params,
        ))
    } else if bits & RESPONSE_BITS != 0 {
        match finalize_response(ctx.codec, version.as_deref(), id, result, error) {
            Ok(outcome) => Ok(outcome),
            Err(fatal) => Err(ctx.fail_fatal(fatal)),
        }
    } else {
        Ok(Err(MessageError::new(
            error_codes::INVALID_REQUEST,
            "message carries no method, params, result or error property",
            id,
        )))
    }
}

/// Best-effort scan of the remaining properties for an "id" while draining
/// the rest of the already-failed object. Unusable id values are ignored.
fn recover_id<'de, M>(map: &mut M, known: Option<MessageId>) -> std::result::Result<MessageId, M::Error>
where
    M: MapAccess<'de>,
{
    let mut id = known;
    while let Some(key) = map.next_key::<String>()? {
        if id.is_none() && key == "id" {
            let value: Value = map.next_value()?;
            id = parse_id(&value);
        } else {
            map.next_value::<IgnoredAny>()?;
        }
    }
    Ok(id.unwrap_or_default())
}

fn parse_id(value: &Value) -> Option<MessageId> {
    match value {
        Value::Null => Some(MessageId::None),
        Value::String(s) => Some(MessageId::from(s.as_str())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(MessageId::Int(i)),
            None => n.as_f64().map(MessageId::Float),
        },
        _ => None,
    }
}

fn finalize_request(
    codec: &Codec,
    version: Option<&str>,
    method: Option<String>,
    id: MessageId,
    params: Option<Value>,
) -> Outcome {
    if codec.compat == CompatLevel::Level2 && version != Some("2.0") {
        return Err(MessageError::with_method(
            error_codes::INVALID_REQUEST,
            "the \"jsonrpc\" property must be the string \"2.0\"",
            method,
            id,
        ));
    }
    let Some(method) = method else {
        return Err(MessageError::new(
            error_codes::INVALID_REQUEST,
            "the \"method\" property is required",
            id,
        ));
    };
    if method.is_empty() {
        return Err(MessageError::with_method(
            error_codes::INVALID_REQUEST,
            "the method name must not be empty",
            Some(method),
            id,
        ));
    }
    let Some(contracts) = codec.resolver.request_contracts(&method) else {
        return Err(MessageError::with_method(
            error_codes::METHOD_NOT_FOUND,
            format!("method \"{method}\" is not supported"),
            Some(method),
            id,
        ));
    };
    for contract in contracts.iter() {
        if let Some(bound) = bind_params(contract, params.as_ref()) {
            return Ok(Message::Request(Request::from_parts(method, id, bound)));
        }
    }
    Err(MessageError::with_method(
        error_codes::METHOD_NOT_FOUND,
        format!("no contract for method \"{method}\" accepts the supplied parameters"),
        Some(method),
        id,
    ))
}

/// Tries one candidate contract against the raw params container. `None`
/// disqualifies the candidate; the caller moves on to the next one.
fn bind_params(contract: &RequestContract, params: Option<&Value>) -> Option<Option<Params>> {
    match contract {
        RequestContract::None => match params {
            None => Some(None),
            Some(Value::Array(items)) if items.is_empty() => Some(None),
            Some(Value::Object(members)) if members.is_empty() => Some(None),
            _ => None,
        },
        RequestContract::ByPosition { types, required } => {
            if let Some(value @ Value::Object(_)) = params {
                // A lone structured argument may arrive as the whole
                // params object instead of a one-element array.
                if *required == 1
                    && types.len() == 1
                    && types[0].kind == ValueKind::Element
                {
                    let element = convert(value, &types[0]).ok()?;
                    return Some(Some(Params::ByPosition(vec![element])));
                }
                return None;
            }
            let items = match params {
                Some(Value::Array(items)) => items,
                _ => return None,
            };
            if items.len() < *required || items.len() > types.len() {
                return None;
            }
            let mut bound = Vec::with_capacity(items.len());
            for (item, ty) in items.iter().zip(types) {
                bound.push(convert(item, ty).ok()?);
            }
            Some(Some(Params::ByPosition(bound)))
        }
        RequestContract::ByName(declared) => {
            let members = match params {
                Some(Value::Object(members)) => members,
                _ => return None,
            };
            let mut bound = HashMap::with_capacity(declared.len());
            for (name, ty) in declared {
                if let Some(value) = members.get(name) {
                    bound.insert(name.clone(), convert(value, ty).ok()?);
                }
            }
            Some(Some(Params::ByName(bound)))
        }
    }
}

fn finalize_response(
    codec: &Codec,
    version: Option<&str>,
    id: MessageId,
    result: Option<Value>,
    error: Option<Value>,
) -> Result<Outcome> {
    let has_result = result.is_some();
    let has_error = error.is_some();
    let success = match codec.compat {
        CompatLevel::Level2 => {
            if version != Some("2.0") {
                return Ok(Err(MessageError::new(
                    error_codes::INVALID_REQUEST,
                    "the \"jsonrpc\" property must be the string \"2.0\"",
                    id,
                )));
            }
            if has_result == has_error {
                return Ok(Err(MessageError::new(
                    error_codes::INVALID_REQUEST,
                    "a response carries exactly one of the result and error properties",
                    id,
                )));
            }
            has_result
        }
        CompatLevel::Level1 => {
            if !has_result || !has_error {
                return Ok(Err(MessageError::new(
                    error_codes::INVALID_REQUEST,
                    "a response carries both the result and error properties under protocol 1.0",
                    id,
                )));
            }
            // A literal null error is the legacy 1.0 success shape.
            error.as_ref().is_some_and(Value::is_null)
        }
    };

    if success {
        let Some(contract) = codec.resolver.response_contract(&id) else {
            return Ok(Err(MessageError::new(
                error_codes::METHOD_NOT_FOUND,
                "no response contract is registered for the message identifier",
                id,
            )));
        };
        if id.is_none() {
            return Ok(Err(MessageError::new(
                error_codes::INVALID_REQUEST,
                "a success response requires an identifier",
                id,
            )));
        }
        let result = result.unwrap_or(Value::Null);
        let element = convert(&result, contract.result()).map_err(Error::InvalidJsonValue)?;
        let response = Response::success(id, element)?;
        return Ok(Ok(Message::Response(response)));
    }

    let error = error.unwrap_or(Value::Null);
    let (code, message, data, error_is_null) = match parse_error_parts(codec.compat, &error) {
        Ok(parts) => parts,
        Err((code, text)) => return Ok(Err(MessageError::new(code, text, id))),
    };
    if error_is_null {
        // Only reachable under Level2; Level1 took the success path.
        return Ok(Err(MessageError::new(
            error_codes::INVALID_REQUEST,
            "the \"error\" property must not be null",
            id,
        )));
    }
    if codec.compat == CompatLevel::Level2 {
        if code.is_none() {
            return Ok(Err(MessageError::new(
                error_codes::INVALID_REQUEST,
                "the error \"code\" property is required",
                id,
            )));
        }
        if message.is_none() {
            return Ok(Err(MessageError::new(
                error_codes::INVALID_REQUEST,
                "the error \"message\" property is required",
                id,
            )));
        }
    }
    let code = code.unwrap_or(0);
    let message = message.unwrap_or_default();

    let data_element = match data {
        None => None,
        Some(data_value) => {
            let data_type = if id.is_none() {
                codec
                    .resolver
                    .response_contract(&id)
                    .map(|c| *c.error_data())
                    .unwrap_or(ParamType::nullable(ValueKind::Element))
            } else {
                match codec.resolver.response_contract(&id) {
                    Some(contract) => *contract.error_data(),
                    None => {
                        return Ok(Err(MessageError::new(
                            error_codes::METHOD_NOT_FOUND,
                            "no response contract is registered for the message identifier",
                            id,
                        )));
                    }
                }
            };
            Some(convert(&data_value, &data_type).map_err(Error::InvalidJsonValue)?)
        }
    };

    let error_object = match data_element {
        None => ErrorObject::new(code, message),
        Some(data) => ErrorObject::with_data(code, message, data),
    };
    match error_object {
        Ok(error_object) => Ok(Ok(Message::Response(Response::error(id, error_object)))),
        Err(_) => Ok(Err(MessageError::new(
            error_codes::INVALID_REQUEST,
            format!("the error code {code} is inside the reserved range"),
            id,
        ))),
    }
}

type ErrorParts = (Option<i64>, Option<String>, Option<Value>, bool);

/// Pulls code, message and data out of a buffered error subtree. Under
/// Level1 wrong-typed members are skipped and defaulted later; under
/// Level2 they fail immediately.
fn parse_error_parts(
    compat: CompatLevel,
    error: &Value,
) -> std::result::Result<ErrorParts, (i64, String)> {
    match error {
        Value::Null => Ok((None, None, None, true)),
        Value::Object(members) => {
            let mut code = None;
            let mut message = None;
            let mut data = None;
            for (key, value) in members {
                match key.as_str() {
                    "code" => match value.as_i64() {
                        Some(n) => code = Some(n),
                        None => {
                            if compat == CompatLevel::Level2 {
                                return Err((
                                    error_codes::INVALID_REQUEST,
                                    "the error \"code\" property must be an integer".to_string(),
                                ));
                            }
                        }
                    },
                    "message" => match value.as_str() {
                        Some(s) => message = Some(s.to_string()),
                        None => {
                            if compat == CompatLevel::Level2 {
                                return Err((
                                    error_codes::INVALID_REQUEST,
                                    "the error \"message\" property must be a string".to_string(),
                                ));
                            }
                        }
                    },
                    "data" => data = Some(value.clone()),
                    _ => {}
                }
            }
            Ok((code, message, data, false))
        }
        _ => Ok((None, None, None, false)),
    }
}
