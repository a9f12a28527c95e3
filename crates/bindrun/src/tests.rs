//! Tests for the registry and the dispatcher, without a transport.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use bindwire::CallRequest;
use bindwire::CallResponse;
use bindwire::Failure;
use bindwire::FailureKind;
use bindwire::Frame;
use bindwire::Kind;
use bindwire::TypeDef;
use bindwire::Value;

use crate::bind::Args;
use crate::bind::Bindable;
use crate::bind::Functions;
use crate::bind::InvokeError;
use crate::bind::MethodSpec;
use crate::dispatch::Dispatcher;
use crate::registry;
use crate::registry::Catalog;
use crate::registry::Registry;

/// Math service that counts how often it is entered.
#[derive(Default)]
struct Math {
    invocations: AtomicUsize,
}

#[async_trait::async_trait]
impl Bindable for Math {
    fn qualifier(&self) -> String {
        "math".into()
    }

    fn methods(&self) -> Vec<MethodSpec> {
        vec![
            MethodSpec::new("add").param("a", Kind::Integer).param("b", Kind::Integer).returns(Kind::Integer),
            MethodSpec::new("div").param("a", Kind::Float).param("b", Kind::Float).returns(Kind::Float),
            MethodSpec::new("explode"),
            MethodSpec::new("liar").returns(Kind::Integer),
        ]
    }

    async fn invoke(&self, method: &str, args: Args) -> Result<Value, InvokeError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match method {
            "add" => Ok(Value::Int(args.decode::<i64>(0)? + args.decode::<i64>(1)?)),
            "div" => {
                let (a, b) = (args.decode::<f64>(0)?, args.decode::<f64>(1)?);
                if b == 0.0 {
                    return Err(InvokeError::new("division by zero"));
                }
                Ok(Value::Float(a / b))
            }
            "explode" => panic!("boom"),
            "liar" => Ok(Value::from("not a number")),
            other => Err(InvokeError::new(format!("unhandled {}", other))),
        }
    }
}

fn math_dispatcher() -> (Arc<Math>, Dispatcher) {
    let math = Arc::new(Math::default());
    let registry = Registry::build(vec![math.clone() as Arc<dyn Bindable>]).expect("registry");
    (math, Dispatcher::new(registry))
}

fn call(id: u64, qualifier: &str, method: &str, args: Vec<Value>) -> Vec<u8> {
    Frame::Call(CallRequest::new(id, qualifier, method, args))
        .encode()
        .expect("encode")
}

async fn noop(_args: Args) -> Result<Value, InvokeError> {
    Ok(Value::Null)
}

fn bound(object: impl Bindable) -> Vec<Arc<dyn Bindable>> {
    vec![Arc::new(object)]
}

fn failure(response: &CallResponse) -> &Failure {
    response.outcome.as_ref().expect_err("expected a failure")
}

// --- Registry ---

#[test]
fn test_duplicate_qualifier_rejected() {
    let a: Arc<dyn Bindable> = Arc::new(Functions::new("math"));
    let b: Arc<dyn Bindable> = Arc::new(Functions::new("math"));

    let err = Registry::build(vec![a, b]).unwrap_err();
    assert_eq!(err, registry::Error::DuplicateQualifier("math".into()));
}

#[test]
fn test_ambiguous_method_rejected() {
    let object = Functions::new("store")
        .func(MethodSpec::new("get").param("key", Kind::String), noop)
        .func(MethodSpec::new("get").param("id", Kind::Integer), noop);

    let err = Catalog::build(&bound(object)).unwrap_err();
    assert_eq!(
        err,
        registry::Error::AmbiguousMethod {
            qualifier: "store".into(),
            method: "get".into(),
            arity: 1,
        }
    );
}

#[test]
fn test_same_name_different_arity_allowed() {
    let object = Functions::new("store")
        .func(MethodSpec::new("get").param("key", Kind::String).param("fallback", Kind::Any), noop)
        .func(MethodSpec::new("get").param("key", Kind::String), noop);

    let catalog = Catalog::build(&bound(object)).unwrap();
    let schema = catalog.object("store").unwrap();
    let arities: Vec<usize> = schema.overloads("get").map(|m| m.arity()).collect();
    assert_eq!(arities, [1, 2]);
    assert_eq!(schema.method_names(), ["get"]);
}

#[test]
fn test_undeclared_and_conflicting_types() {
    let missing = Functions::new("geo").func(MethodSpec::new("origin").returns(Kind::named("Point")), noop);
    assert!(matches!(
        Catalog::build(&bound(missing)),
        Err(registry::Error::UnknownType { type_name, .. }) if type_name == "Point"
    ));

    let a = Functions::new("a").type_def(TypeDef::new("Point").field("x", Kind::Float));
    let b = Functions::new("b").type_def(TypeDef::new("Point").field("x", Kind::Integer));
    assert_eq!(
        Catalog::build(&[bound(a), bound(b)].concat()).unwrap_err(),
        registry::Error::ConflictingType("Point".into())
    );

    let a = Functions::new("a").type_def(TypeDef::new("Point").field("x", Kind::Float));
    let b = Functions::new("b").type_def(TypeDef::new("Point").field("x", Kind::Float));
    assert!(Catalog::build(&[bound(a), bound(b)].concat()).is_ok());
}

#[test]
fn test_invalid_identifiers_rejected() {
    let bad_method = Functions::new("ok").func(MethodSpec::new("do-it"), noop);
    assert!(matches!(
        Catalog::build(&bound(bad_method)),
        Err(registry::Error::InvalidIdentifier { .. })
    ));

    let reserved = Functions::new("class");
    assert!(matches!(
        Catalog::build(&bound(reserved)),
        Err(registry::Error::InvalidIdentifier { .. })
    ));
}

fn clash_of(object: Functions) -> (String, String) {
    match Catalog::build(&bound(object)) {
        Err(registry::Error::NameClash { name, context, .. }) => (name, context),
        other => panic!("expected a name clash, got {:?}", other),
    }
}

#[test]
fn test_names_that_break_stubs_rejected() {
    assert_eq!(clash_of(Functions::new("on")), ("on".into(), "qualifier".into()));
    assert_eq!(clash_of(Functions::new("BridgeError")), ("BridgeError".into(), "qualifier".into()));

    let same_as_type = Functions::new("Point").type_def(TypeDef::new("Point").field("x", Kind::Float));
    assert_eq!(clash_of(same_as_type), ("Point".into(), "qualifier".into()));

    let repeated_param = Functions::new("math").func(
        MethodSpec::new("add").param("a", Kind::Integer).param("a", Kind::Integer),
        noop,
    );
    assert_eq!(clash_of(repeated_param), ("a".into(), "parameter".into()));

    let repeated_field = Functions::new("geo").type_def(
        TypeDef::new("Point").field("x", Kind::Float).field("x", Kind::Float),
    );
    assert_eq!(clash_of(repeated_field), ("x".into(), "field".into()));

    let call_method = Functions::new("rpc").func(MethodSpec::new("__bridgeCall"), noop);
    assert_eq!(clash_of(call_method), ("__bridgeCall".into(), "method".into()));

    let call_param = Functions::new("rpc").func(MethodSpec::new("send").param("__bridgeCall", Kind::Any), noop);
    assert_eq!(clash_of(call_param), ("__bridgeCall".into(), "parameter".into()));

    let method_as_type = Functions::new("geo")
        .type_def(TypeDef::new("Point").field("x", Kind::Float))
        .func(MethodSpec::new("Point"), noop);
    assert_eq!(clash_of(method_as_type), ("Point".into(), "method".into()));
}

fn geo_catalog() -> Catalog {
    let geo = Functions::new("geo")
        .type_def(TypeDef::new("Point").field("x", Kind::Float))
        .func(MethodSpec::new("origin").returns(Kind::named("Point")), noop)
        .func(MethodSpec::new("move").param("by", Kind::Float), noop);
    Catalog::build(&bound(geo)).unwrap()
}

#[test]
fn test_manifest_is_validated_on_load() {
    let valid = geo_catalog();
    assert_eq!(Catalog::from_manifest(&valid.to_manifest().unwrap()).unwrap(), valid);

    // A qualifier that would escape the stub directory.
    let mut escaped = valid.clone();
    let mut schema = escaped.objects.remove("geo").unwrap();
    schema.qualifier = "../escaped".into();
    for sig in &mut schema.methods {
        sig.qualifier = "../escaped".into();
    }
    escaped.objects.insert("../escaped".into(), schema);
    assert!(matches!(
        Catalog::from_manifest(&escaped.to_manifest().unwrap()),
        Err(registry::Error::InvalidIdentifier { name, .. }) if name == "../escaped"
    ));

    let mut repeated = valid.clone();
    let methods = &mut repeated.objects.get_mut("geo").unwrap().methods;
    let again = methods[0].clone();
    methods.push(again);
    assert!(matches!(
        Catalog::from_manifest(&repeated.to_manifest().unwrap()),
        Err(registry::Error::AmbiguousMethod { .. })
    ));

    let mut untyped = valid.clone();
    untyped.types.clear();
    assert!(matches!(
        Catalog::from_manifest(&untyped.to_manifest().unwrap()),
        Err(registry::Error::UnknownType { type_name, .. }) if type_name == "Point"
    ));

    let mut misfiled = valid.clone();
    let schema = misfiled.objects.remove("geo").unwrap();
    misfiled.objects.insert("maps".into(), schema);
    assert!(matches!(
        Catalog::from_manifest(&misfiled.to_manifest().unwrap()),
        Err(registry::Error::Manifest(_))
    ));
}

#[test]
fn test_manifest_methods_are_reordered() {
    let valid = geo_catalog();
    let mut shuffled = valid.clone();
    shuffled.objects.get_mut("geo").unwrap().methods.reverse();

    let loaded = Catalog::from_manifest(&shuffled.to_manifest().unwrap()).unwrap();
    assert_eq!(loaded, valid);
}

#[test]
fn test_catalog_is_deterministic() {
    let build = |order: &[&str]| {
        let objects: Vec<Arc<dyn Bindable>> = order
            .iter()
            .map(|q| {
                Arc::new(
                    Functions::new(*q)
                        .func(MethodSpec::new("zeta"), noop)
                        .func(MethodSpec::new("alpha").param("x", Kind::Any), noop),
                ) as Arc<dyn Bindable>
            })
            .collect();
        Catalog::build(&objects).unwrap()
    };

    let one = build(&["files", "math", "clock"]);
    let two = build(&["clock", "files", "math"]);
    assert_eq!(one, two);
    assert_eq!(one.to_manifest().unwrap(), two.to_manifest().unwrap());

    let names: Vec<&str> = one.object("math").unwrap().methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["alpha", "zeta"]);
}

#[test]
fn test_registry_never_invokes() {
    let math = Arc::new(Math::default());
    let _ = Registry::build(vec![math.clone() as Arc<dyn Bindable>]).unwrap();
    assert_eq!(math.invocations.load(Ordering::SeqCst), 0);
}

// --- Dispatcher ---

#[tokio::test]
async fn test_add_scenario() {
    let (_, dispatcher) = math_dispatcher();
    let response = dispatcher.dispatch(&call(1, "math", "add", vec![2.into(), 3.into()])).await;

    assert_eq!(response, CallResponse::ok(1, Value::Int(5)));
    let json: serde_json::Value = serde_json::from_slice(&Frame::Reply(response).encode().unwrap()).unwrap();
    assert_eq!(json, serde_json::json!({"type": "reply", "correlationId": 1, "ok": true, "value": 5}));
}

#[tokio::test]
async fn test_argument_type_error_skips_invocation() {
    let (math, dispatcher) = math_dispatcher();
    let response = dispatcher.dispatch(&call(2, "math", "add", vec!["x".into(), 3.into()])).await;

    assert_eq!(response.correlation_id, 2);
    let failure = failure(&response);
    assert_eq!(failure.kind, FailureKind::ArgumentTypeError);
    assert_eq!(failure.index, Some(0));
    assert_eq!(math.invocations.load(Ordering::SeqCst), 0);

    let response = dispatcher.dispatch(&call(3, "math", "add", vec![2.into(), Value::Float(3.5)])).await;
    assert_eq!(failure_index(&response), Some(1));
}

fn failure_index(response: &CallResponse) -> Option<usize> {
    failure(response).index
}

#[tokio::test]
async fn test_lossless_coercion_reaches_method() {
    let (_, dispatcher) = math_dispatcher();

    let response = dispatcher.dispatch(&call(4, "math", "add", vec!["40".into(), Value::Float(2.0)])).await;
    assert_eq!(response, CallResponse::ok(4, Value::Int(42)));

    let response = dispatcher.dispatch(&call(5, "math", "div", vec![Value::Int(3), Value::Int(2)])).await;
    assert_eq!(response, CallResponse::ok(5, Value::Float(1.5)));
}

#[tokio::test]
async fn test_unknown_object_and_method() {
    let (math, dispatcher) = math_dispatcher();

    let response = dispatcher.dispatch(&call(6, "nope", "add", vec![])).await;
    assert_eq!(failure(&response).kind, FailureKind::UnknownObject);

    let response = dispatcher.dispatch(&call(7, "math", "mul", vec![1.into(), 2.into()])).await;
    assert_eq!(failure(&response).kind, FailureKind::UnknownMethod);

    // Arity is matched exactly.
    let response = dispatcher.dispatch(&call(8, "math", "add", vec![1.into()])).await;
    assert_eq!(failure(&response).kind, FailureKind::UnknownMethod);
    let response = dispatcher.dispatch(&call(9, "math", "add", vec![1.into(), 2.into(), 3.into()])).await;
    assert_eq!(failure(&response).kind, FailureKind::UnknownMethod);

    assert_eq!(math.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_native_failure_then_next_call_served() {
    let (_, dispatcher) = math_dispatcher();

    let response = dispatcher.dispatch(&call(10, "math", "div", vec![1.into(), 0.into()])).await;
    let failure = failure(&response);
    assert_eq!(failure.kind, FailureKind::InvocationError);
    assert_eq!(failure.message, "division by zero");

    let response = dispatcher.dispatch(&call(11, "math", "add", vec![1.into(), 1.into()])).await;
    assert_eq!(response, CallResponse::ok(11, Value::Int(2)));
}

#[tokio::test]
async fn test_panic_becomes_invocation_error() {
    let (_, dispatcher) = math_dispatcher();

    let response = dispatcher.dispatch(&call(12, "math", "explode", vec![])).await;
    let failure = failure(&response);
    assert_eq!(failure.kind, FailureKind::InvocationError);
    assert!(failure.message.contains("boom"));

    let response = dispatcher.dispatch(&call(13, "math", "add", vec![2.into(), 2.into()])).await;
    assert_eq!(response, CallResponse::ok(13, Value::Int(4)));
}

#[tokio::test]
async fn test_return_value_checked_against_declaration() {
    let (_, dispatcher) = math_dispatcher();
    let response = dispatcher.dispatch(&call(14, "math", "liar", vec![])).await;
    assert_eq!(failure(&response).kind, FailureKind::InvocationError);
}

#[tokio::test]
async fn test_malformed_requests() {
    let (_, dispatcher) = math_dispatcher();

    let response = dispatcher
        .dispatch(br#"{"type":"call","correlationId":15,"qualifier":"math","method":"add"}"#)
        .await;
    assert_eq!(response.correlation_id, 15);
    assert_eq!(failure(&response).kind, FailureKind::MalformedRequest);

    let response = dispatcher.dispatch(b"}{").await;
    assert_eq!(response.correlation_id, crate::dispatch::UNADDRESSED);
    assert_eq!(failure(&response).kind, FailureKind::MalformedRequest);

    let response = dispatcher.dispatch(br#"{"type":"event","event":"x","payload":1}"#).await;
    assert_eq!(failure(&response).kind, FailureKind::MalformedRequest);
}

#[tokio::test]
async fn test_named_argument_shape_checked() {
    let geo = Functions::new("geo")
        .type_def(TypeDef::new("Point").field("x", Kind::Float).field("y", Kind::Float))
        .func(
            MethodSpec::new("norm").param("p", Kind::named("Point")).returns(Kind::Float),
            |args| async move {
                let p = args.get(0).and_then(Value::as_object).ok_or_else(|| InvokeError::new("no point"))?;
                let x = p.get("x").and_then(Value::as_f64).unwrap_or_default();
                let y = p.get("y").and_then(Value::as_f64).unwrap_or_default();
                Ok(Value::Float((x * x + y * y).sqrt()))
            },
        );
    let dispatcher = Dispatcher::new(Registry::build(bound(geo)).unwrap());

    let point = Value::from_serialize(&serde_json::json!({"x": 3, "y": "4"})).unwrap();
    let response = dispatcher.dispatch(&call(16, "geo", "norm", vec![point])).await;
    assert_eq!(response, CallResponse::ok(16, Value::Float(5.0)));

    let partial = Value::from_serialize(&serde_json::json!({"x": 3})).unwrap();
    let response = dispatcher.dispatch(&call(17, "geo", "norm", vec![partial])).await;
    assert_eq!(failure(&response).kind, FailureKind::ArgumentTypeError);
    assert_eq!(failure(&response).index, Some(0));
}

#[tokio::test]
async fn test_concurrency_limit_still_serves_everything() {
    let gauge = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (g, p) = (gauge.clone(), peak.clone());
    let slow = Functions::new("slow").func(MethodSpec::new("work").returns(Kind::Unit), move |_args| {
        let (gauge, peak) = (g.clone(), p.clone());
        async move {
            let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            gauge.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    });
    let dispatcher = Dispatcher::new(Registry::build(bound(slow)).unwrap()).with_limit(Some(2));

    let calls = (1..=8).map(|id| {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(&call(id, "slow", "work", vec![])).await })
    });
    let responses = futures::future::join_all(calls).await;

    for (i, response) in responses.into_iter().enumerate() {
        assert_eq!(response.unwrap(), CallResponse::ok(i as u64 + 1, Value::Null));
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
}
