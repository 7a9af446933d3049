use std::sync::Arc;

use jsonwire::{
    BoundArg, Invoker, JsonElement, MessageId, MethodCandidate, MethodSignature, ParamSpec,
    Request, ValueKind, resolve_target,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn tagged(tag: &'static str) -> Invoker {
    Arc::new(move |_args| Ok(json!(tag)))
}

fn int_at(args: &[BoundArg], index: usize) -> i64 {
    match args[index].as_element() {
        Some(JsonElement::Value(jsonwire::JsonValue::Int(n))) => *n,
        other => panic!("expected an integer argument, got {other:?}"),
    }
}

#[test]
fn first_registered_candidate_wins() -> anyhow::Result<()> {
    let candidates = vec![
        MethodCandidate::new(
            "Calculator.sum_int",
            MethodSignature::new(vec![
                ParamSpec::of(ValueKind::Int),
                ParamSpec::of(ValueKind::Int),
            ]),
            Arc::new(|args| Ok(json!(int_at(args, 0) + int_at(args, 1)))),
        ),
        MethodCandidate::new(
            "Calculator.sum_float",
            MethodSignature::new(vec![
                ParamSpec::of(ValueKind::Float),
                ParamSpec::of(ValueKind::Float),
            ]),
            tagged("float"),
        ),
    ];
    let request = Request::with_positional(
        "sum",
        MessageId::Int(1),
        vec![JsonElement::from(2i64), JsonElement::from(4i64)],
    )?;
    // Both candidates structurally accept two integers; registration
    // order decides.
    let target = resolve_target(&request, &candidates).unwrap();
    assert_eq!(target.target(), "Calculator.sum_int");
    assert_eq!(target.invoke(None).unwrap(), json!(6));
    Ok(())
}

#[test]
fn float_overload_catches_what_int_rejects() -> anyhow::Result<()> {
    let candidates = vec![
        MethodCandidate::new(
            "Calculator.sum_int",
            MethodSignature::new(vec![
                ParamSpec::of(ValueKind::Int),
                ParamSpec::of(ValueKind::Int),
            ]),
            tagged("int"),
        ),
        MethodCandidate::new(
            "Calculator.sum_float",
            MethodSignature::new(vec![
                ParamSpec::of(ValueKind::Float),
                ParamSpec::of(ValueKind::Float),
            ]),
            tagged("float"),
        ),
    ];
    let request = Request::with_positional(
        "sum",
        MessageId::Int(1),
        vec![JsonElement::from(2.5), JsonElement::from(4i64)],
    )?;
    let target = resolve_target(&request, &candidates).unwrap();
    assert_eq!(target.target(), "Calculator.sum_float");
    Ok(())
}

#[test]
fn null_binds_only_to_nullable_parameters() -> anyhow::Result<()> {
    let candidates = vec![
        MethodCandidate::new(
            "Echo.strict",
            MethodSignature::new(vec![ParamSpec::of(ValueKind::Int)]),
            tagged("strict"),
        ),
        MethodCandidate::new(
            "Echo.lenient",
            MethodSignature::new(vec![ParamSpec::nullable(ValueKind::Int)]),
            tagged("lenient"),
        ),
    ];
    let request =
        Request::with_positional("echo", MessageId::Int(1), vec![JsonElement::NULL])?;
    let target = resolve_target(&request, &candidates).unwrap();
    assert_eq!(target.target(), "Echo.lenient");

    let strict_only = &candidates[..1];
    let error = resolve_target(&request, strict_only).unwrap_err();
    assert_eq!(error.method(), "echo");
    assert_eq!(error.supplied(), 1);
    assert!(error.reasons().iter().any(|r| r.contains("not nullable")));
    Ok(())
}

#[test]
fn named_params_only_match_an_object_first_parameter() -> anyhow::Result<()> {
    let candidates = vec![
        MethodCandidate::new(
            "Widget.move_xy",
            MethodSignature::new(vec![
                ParamSpec::of(ValueKind::Int),
                ParamSpec::of(ValueKind::Int),
            ]),
            tagged("positional"),
        ),
        MethodCandidate::new(
            "Widget.move",
            MethodSignature::new(vec![ParamSpec::of(ValueKind::Object)]),
            tagged("object"),
        ),
    ];
    let request = Request::with_named(
        "move",
        MessageId::Int(1),
        [("x".to_string(), JsonElement::from(1i64))]
            .into_iter()
            .collect(),
    )?;
    let target = resolve_target(&request, &candidates).unwrap();
    assert_eq!(target.target(), "Widget.move");
    let object = target.args()[0].as_element().unwrap().as_object().unwrap();
    assert_eq!(object.member("x"), &JsonElement::from(1i64));
    Ok(())
}

#[test]
fn named_params_allow_a_trailing_token_parameter() -> anyhow::Result<()> {
    let candidates = vec![MethodCandidate::new(
        "Widget.move",
        MethodSignature::new(vec![ParamSpec::of(ValueKind::Object), ParamSpec::token()]),
        tagged("object"),
    )];
    let request = Request::with_named(
        "move",
        MessageId::Int(1),
        [("x".to_string(), JsonElement::from(1i64))]
            .into_iter()
            .collect(),
    )?;
    let target = resolve_target(&request, &candidates).unwrap();
    assert_eq!(target.args().len(), 2);
    assert!(target.args()[1].as_token().is_some());

    // Three declared parameters never fit a named-parameter call.
    let three = vec![MethodCandidate::new(
        "Widget.move",
        MethodSignature::new(vec![
            ParamSpec::of(ValueKind::Object),
            ParamSpec::token(),
            ParamSpec::of(ValueKind::Int),
        ]),
        tagged("object"),
    )];
    assert!(resolve_target(&request, &three).is_err());
    Ok(())
}

#[test]
fn trailing_parameters_are_defaulted() -> anyhow::Result<()> {
    let candidates = vec![MethodCandidate::new(
        "Greeter.greet",
        MethodSignature::new(vec![
            ParamSpec::of(ValueKind::Str),
            ParamSpec::of(ValueKind::Str).with_default(JsonElement::from("en")),
            ParamSpec::nullable(ValueKind::Element),
        ]),
        tagged("greet"),
    )];
    let request =
        Request::with_positional("greet", MessageId::Int(1), vec![JsonElement::from("ada")])?;
    let target = resolve_target(&request, &candidates).unwrap();
    let args = target.args();
    assert_eq!(args.len(), 3);
    assert_eq!(args[1].as_element(), Some(&JsonElement::from("en")));
    assert_eq!(args[2].as_element(), Some(&JsonElement::NULL));
    Ok(())
}

#[test]
fn live_token_replaces_the_placeholder() -> anyhow::Result<()> {
    let invoker: Invoker = Arc::new(|args| {
        let token = args[1].as_token().unwrap();
        Ok(json!(token.is_cancelled()))
    });
    let candidates = vec![MethodCandidate::new(
        "Job.run",
        MethodSignature::new(vec![ParamSpec::of(ValueKind::Int), ParamSpec::token()]),
        invoker,
    )];
    let request =
        Request::with_positional("run", MessageId::Int(1), vec![JsonElement::from(5i64)])?;

    let target = resolve_target(&request, &candidates).unwrap();
    assert!(target.accepts_token());
    assert_eq!(target.invoke(None).unwrap(), json!(false));

    let live = CancellationToken::new();
    live.cancel();
    let target = resolve_target(&request, &candidates).unwrap();
    assert_eq!(target.invoke(Some(live)).unwrap(), json!(true));
    Ok(())
}

#[test]
fn by_ref_signatures_are_rejected_with_a_diagnostic() -> anyhow::Result<()> {
    let candidates = vec![MethodCandidate::new(
        "Legacy.swap",
        MethodSignature::new(vec![ParamSpec::of(ValueKind::Int)]).by_ref(),
        tagged("swap"),
    )];
    let request =
        Request::with_positional("swap", MessageId::Int(1), vec![JsonElement::from(1i64)])?;
    let error = resolve_target(&request, &candidates).unwrap_err();
    assert!(
        error
            .reasons()
            .iter()
            .any(|r| r.contains("by-reference"))
    );
    Ok(())
}

#[test]
fn arity_mismatch_reports_the_declared_range() -> anyhow::Result<()> {
    let candidates = vec![MethodCandidate::new(
        "Calculator.sum",
        MethodSignature::new(vec![
            ParamSpec::of(ValueKind::Int),
            ParamSpec::of(ValueKind::Int).with_default(JsonElement::from(0i64)),
        ]),
        tagged("sum"),
    )];
    let request = Request::with_positional(
        "sum",
        MessageId::Int(1),
        vec![
            JsonElement::from(1i64),
            JsonElement::from(2i64),
            JsonElement::from(3i64),
        ],
    )?;
    let error = resolve_target(&request, &candidates).unwrap_err();
    assert!(error.reasons().iter().any(|r| r.contains("1 - 2")));
    Ok(())
}

#[test]
fn invoker_failures_propagate_unmodified() -> anyhow::Result<()> {
    let invoker: Invoker = Arc::new(|_args| Err("overflow".into()));
    let candidates = vec![MethodCandidate::new(
        "Calculator.sum",
        MethodSignature::new(vec![]),
        invoker,
    )];
    let request = Request::new("sum", MessageId::Int(1))?;
    let target = resolve_target(&request, &candidates).unwrap();
    let error = target.invoke(None).unwrap_err();
    assert_eq!(error.to_string(), "overflow");
    Ok(())
}
