use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::contract::ValueKind;
use super::element::{JsonElement, JsonObject, JsonValue};
use super::message::Request;

/// One argument bound for a target invocation: a decoded value, or a
/// cancellation-token slot the live token is substituted into.
#[derive(Debug, Clone)]
pub enum BoundArg {
    Value(JsonElement),
    Token(CancellationToken),
}

impl BoundArg {
    pub fn as_element(&self) -> Option<&JsonElement> {
        match self {
            BoundArg::Value(element) => Some(element),
            BoundArg::Token(_) => None,
        }
    }

    pub fn as_token(&self) -> Option<&CancellationToken> {
        match self {
            BoundArg::Value(_) => None,
            BoundArg::Token(token) => Some(token),
        }
    }
}

pub type InvokeError = Box<dyn std::error::Error + Send + Sync>;
pub type InvokeResult = std::result::Result<Value, InvokeError>;

/// The callable registered for one method overload. Invoked synchronously
/// with the bound argument list; whatever it returns or fails with travels
/// back to the caller unmodified.
pub type Invoker = Arc<dyn Fn(&[BoundArg]) -> InvokeResult + Send + Sync>;

/// One declared parameter of a registered method.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    kind: ValueKind,
    nullable: bool,
    default: Option<JsonElement>,
    token: bool,
}

impl ParamSpec {
    pub fn of(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: false,
            default: None,
            token: false,
        }
    }

    pub fn nullable(kind: ValueKind) -> Self {
        Self {
            nullable: true,
            ..Self::of(kind)
        }
    }

    /// A cancellation-token parameter. Never bound from the payload; it
    /// receives a placeholder token the live one replaces at invocation.
    pub fn token() -> Self {
        Self {
            token: true,
            ..Self::of(ValueKind::Element)
        }
    }

    pub fn with_default(mut self, default: JsonElement) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_token(&self) -> bool {
        self.token
    }
}

/// The declared shape of one method overload.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    params: Vec<ParamSpec>,
    required: usize,
    by_ref: bool,
}

impl MethodSignature {
    /// The required count defaults to the leading run of parameters that
    /// carry no default value and are not token slots.
    pub fn new(params: Vec<ParamSpec>) -> Self {
        let required = params
            .iter()
            .take_while(|p| p.default.is_none() && !p.token)
            .count();
        Self {
            params,
            required,
            by_ref: false,
        }
    }

    pub fn with_required(params: Vec<ParamSpec>, required: usize) -> Self {
        let required = required.min(params.len());
        Self {
            params,
            required,
            by_ref: false,
        }
    }

    /// Marks a signature bridged from a host with in-out parameters. Such
    /// a candidate is never bound; it is rejected with a diagnostic.
    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn accepts_token(&self) -> bool {
        self.params.iter().any(ParamSpec::is_token)
    }

    fn total_excluding_token(&self) -> usize {
        self.params.iter().filter(|p| !p.token).count()
    }
}

/// A (signature, invoker) pair registered for a method name. The host
/// supplies these in registration order; resolution is first-match.
#[derive(Clone)]
pub struct MethodCandidate {
    target: String,
    signature: MethodSignature,
    invoker: Invoker,
}

impl fmt::Debug for MethodCandidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MethodCandidate")
            .field("target", &self.target)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl MethodCandidate {
    pub fn new(target: impl Into<String>, signature: MethodSignature, invoker: Invoker) -> Self {
        Self {
            target: target.into(),
            signature,
            invoker,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

/// No candidate bound; carries every candidate's rejection reason so the
/// caller can report useful diagnostics upstream.
#[derive(Debug, Error)]
#[error("no target method for \"{method}\" taking {supplied} argument(s): {}", .reasons.join("; "))]
pub struct ResolveError {
    method: String,
    supplied: usize,
    reasons: Vec<String>,
}

impl ResolveError {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn supplied(&self) -> usize {
        self.supplied
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

/// A fully bound, ready-to-run call.
pub struct TargetMethod {
    target: String,
    accepts_token: bool,
    args: Vec<BoundArg>,
    invoker: Invoker,
}

impl fmt::Debug for TargetMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TargetMethod")
            .field("target", &self.target)
            .field("accepts_token", &self.accepts_token)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl TargetMethod {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn accepts_token(&self) -> bool {
        self.accepts_token
    }

    pub fn args(&self) -> &[BoundArg] {
        &self.args
    }

    /// Performs the one synchronous call. A supplied token replaces the
    /// last token slot when the signature accepts one; `None` means the
    /// call cannot be canceled and the placeholder stays.
    pub fn invoke(mut self, token: Option<CancellationToken>) -> InvokeResult {
        if let Some(token) = token {
            if self.accepts_token {
                for arg in self.args.iter_mut().rev() {
                    if let BoundArg::Token(slot) = arg {
                        *slot = token;
                        break;
                    }
                }
            }
        }
        (self.invoker)(&self.args)
    }
}

/// Picks the first candidate, in registration order, whose signature the
/// request's arguments fully bind to. Later candidates are never
/// considered once an earlier one binds, even if they match more closely.
pub fn resolve_target(
    request: &Request,
    candidates: &[MethodCandidate],
) -> std::result::Result<TargetMethod, ResolveError> {
    let mut reasons = Vec::new();
    for candidate in candidates {
        if let Some(args) = try_bind(request, candidate, &mut reasons) {
            debug!(
                method = request.method(),
                target = candidate.target,
                "target method resolved"
            );
            return Ok(TargetMethod {
                target: candidate.target.clone(),
                accepts_token: candidate.signature.accepts_token(),
                args,
                invoker: Arc::clone(&candidate.invoker),
            });
        }
    }
    debug!(
        method = request.method(),
        candidates = candidates.len(),
        "no target method bound"
    );
    Err(ResolveError {
        method: request.method().to_string(),
        supplied: request.param_count(),
        reasons,
    })
}

fn try_bind(
    request: &Request,
    candidate: &MethodCandidate,
    reasons: &mut Vec<String>,
) -> Option<Vec<BoundArg>> {
    let signature = &candidate.signature;
    if signature.by_ref {
        reasons.push(format!(
            "method \"{}\" declares by-reference parameters",
            candidate.target
        ));
        return None;
    }

    if let Some(named) = request.params_by_name() {
        // A named-parameter call only binds to a method taking the whole
        // argument object as its first parameter, optionally followed by
        // a token. Shape mismatches disqualify silently.
        let first_is_object = matches!(
            signature.params.first(),
            Some(first) if first.kind == ValueKind::Object && !first.token
        );
        let tail_fits = match signature.params.len() {
            1 => true,
            2 => signature.params[1].token,
            _ => false,
        };
        if !first_is_object || !tail_fits {
            trace!(target = candidate.target, "named parameters do not fit");
            return None;
        }
        let object = JsonObject::from(named.clone());
        let mut args = vec![BoundArg::Value(JsonElement::Object(object))];
        if signature.params.len() == 2 {
            args.push(BoundArg::Token(CancellationToken::new()));
        }
        return Some(args);
    }

    let supplied = request.params_by_position().unwrap_or(&[]);
    let required = signature.required;
    let total = signature.total_excluding_token();
    if supplied.len() < required || supplied.len() > total {
        let declared = if required == total {
            required.to_string()
        } else {
            format!("{required} - {total}")
        };
        reasons.push(format!(
            "method \"{}\" expects {declared} argument(s), {} supplied",
            candidate.target,
            supplied.len()
        ));
        return None;
    }

    let mut args = Vec::with_capacity(signature.params.len());
    for (index, (arg, spec)) in supplied.iter().zip(&signature.params).enumerate() {
        if spec.token {
            reasons.push(format!(
                "method \"{}\": argument {index} targets a cancellation-token parameter",
                candidate.target
            ));
            return None;
        }
        if arg.is_null() {
            if !spec.nullable {
                reasons.push(format!(
                    "method \"{}\": argument {index} is null, parameter kind {} is not nullable",
                    candidate.target, spec.kind
                ));
                return None;
            }
            args.push(BoundArg::Value(JsonElement::NULL));
            continue;
        }
        if !assignable(arg, spec.kind) {
            reasons.push(format!(
                "method \"{}\": argument {index} of kind {} is not assignable to parameter kind {}",
                candidate.target,
                arg.kind_name(),
                spec.kind
            ));
            return None;
        }
        args.push(BoundArg::Value(arg.clone()));
    }

    for spec in signature.params.iter().skip(supplied.len()) {
        args.push(if let Some(default) = &spec.default {
            BoundArg::Value(default.clone())
        } else if spec.token {
            BoundArg::Token(CancellationToken::new())
        } else {
            BoundArg::Value(JsonElement::NULL)
        });
    }
    Some(args)
}

fn assignable(arg: &JsonElement, kind: ValueKind) -> bool {
    match kind {
        ValueKind::Element => true,
        ValueKind::Object => arg.as_object().is_some(),
        ValueKind::Array => arg.as_array().is_some(),
        _ => match arg.as_value() {
            Some(value) => match (kind, value) {
                (ValueKind::Bool, JsonValue::Bool(_)) => true,
                (ValueKind::Int, JsonValue::Int(_)) => true,
                // An integer argument widens into a float parameter.
                (ValueKind::Float, JsonValue::Float(_) | JsonValue::Int(_)) => true,
                (ValueKind::Str, JsonValue::Str(_)) => true,
                (ValueKind::Bytes, JsonValue::Bytes(_)) => true,
                (ValueKind::Bytes, JsonValue::Str(_)) => value.to_bytes().is_ok(),
                (ValueKind::Uuid, JsonValue::Str(_)) => value.to_uuid().is_ok(),
                (ValueKind::Time, JsonValue::Str(_)) => value.to_datetime().is_ok(),
                (ValueKind::Uri, JsonValue::Str(_)) => value.to_url().is_ok(),
                _ => false,
            },
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_count_stops_at_first_default_or_token() {
        let signature = MethodSignature::new(vec![
            ParamSpec::of(ValueKind::Int),
            ParamSpec::of(ValueKind::Str).with_default(JsonElement::from("x")),
            ParamSpec::token(),
        ]);
        assert_eq!(signature.required, 1);
        assert_eq!(signature.total_excluding_token(), 2);
        assert!(signature.accepts_token());
    }

    #[test]
    fn assignability_is_strict_except_numeric_widening() {
        assert!(assignable(&JsonElement::from(1i64), ValueKind::Int));
        assert!(assignable(&JsonElement::from(1i64), ValueKind::Float));
        assert!(!assignable(&JsonElement::from(1.5), ValueKind::Int));
        assert!(!assignable(&JsonElement::from("1"), ValueKind::Int));
        assert!(assignable(&JsonElement::from("x"), ValueKind::Element));
    }
}
