//! Recreate pipeline integration tests

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jig_codec::{CreationKind, CreationRef, ObjectRef, Props, Value};
use jig_kernel::{
    hash_state, CacheLoader, CachedState, Class, Hydration, Kernel, KernelConfig, KernelError,
    KernelEvent, Loader, Location, MemoryStateStore, SlotStatus, VerifyPolicy,
};
use jig_membrane::{Caller, MembraneError, MethodScope, Property};
use serde_json::json;

const COUNTER_SRC: &str = "class Counter extends Jig { increment() { this.count += 1 } }";

struct Counter;

impl Class for Counter {
    fn methods(&self) -> Vec<String> {
        vec!["increment".into(), "peek".into(), "store".into()]
    }

    fn call(&self, scope: MethodScope<'_>, method: &str, args: &[Value]) -> Result<Value, MembraneError> {
        let this = scope.this()?;
        match method {
            "increment" => {
                let count = this
                    .get(scope.caller(), "count")?
                    .and_then(|property| property.value().and_then(Value::as_f64))
                    .unwrap_or(0.0);
                this.set(scope.caller(), "count", Value::from(count + 1.0))?;
                Ok(Value::from(count + 1.0))
            }
            "peek" => Ok(this
                .get(scope.caller(), "_secret")?
                .and_then(Property::into_value)
                .unwrap_or(Value::Undefined)),
            "store" => {
                let held = args.first().cloned().unwrap_or(Value::Undefined);
                this.set(scope.caller(), "held", held)?;
                Ok(Value::Undefined)
            }
            _ => Ok(Value::Undefined),
        }
    }
}

const CLOCK_SRC: &str = "class Clock { static now() { return 42 } }";

/// Static-only code: methods never look at `this`.
struct Clock;

impl Class for Clock {
    fn methods(&self) -> Vec<String> {
        vec!["now".into(), "touch".into()]
    }

    fn call(&self, scope: MethodScope<'_>, method: &str, _args: &[Value]) -> Result<Value, MembraneError> {
        match method {
            "now" => Ok(Value::from(42)),
            _ => {
                scope.this()?;
                Ok(Value::Undefined)
            }
        }
    }
}

/// Knows nothing; every reference must come from the kernel itself.
struct NoLoader;

#[async_trait]
impl Loader for NoLoader {
    async fn load(&self, _: &Kernel, _: &Location) -> jig_kernel::Result<Option<CreationRef>> {
        Ok(None)
    }
}

/// Never answers.
struct StallingLoader;

#[async_trait]
impl Loader for StallingLoader {
    async fn load(&self, _: &Kernel, _: &Location) -> jig_kernel::Result<Option<CreationRef>> {
        std::future::pending().await
    }
}

fn trusting_kernel() -> Kernel {
    Kernel::new(KernelConfig::default().trusting("*"))
}

fn loc(s: &str) -> Location {
    Location::parse(s).unwrap()
}

fn code_state() -> CachedState {
    CachedState::new(CreationKind::Code, json!({ "deps": {} })).with_src(COUNTER_SRC)
}

fn jig_state(props: serde_json::Value) -> CachedState {
    CachedState::new(CreationKind::Jig, props).with_cls("_o1")
}

fn states(entries: Vec<(&str, CachedState)>) -> BTreeMap<String, CachedState> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn peer_of(kernel: &Kernel, creation: &CreationRef) -> Option<CreationRef> {
    kernel
        .membrane(creation)
        .unwrap()
        .get(Caller::External, "peer")
        .unwrap()
        .and_then(|property| property.value().and_then(Value::as_creation))
}

fn read(kernel: &Kernel, creation: &CreationRef, key: &str) -> Option<Value> {
    kernel
        .membrane(creation)
        .unwrap()
        .get(Caller::External, key)
        .unwrap()
        .and_then(Property::into_value)
}

/// `outer.key` from outside any method.
fn read_nested(kernel: &Kernel, creation: &CreationRef, outer: &str, key: &str) -> Option<Value> {
    let outer = kernel
        .membrane(creation)
        .unwrap()
        .get(Caller::External, outer)
        .unwrap()
        .unwrap();
    outer
        .member()
        .unwrap()
        .get(Caller::External, key)
        .unwrap()
        .and_then(Property::into_value)
}

async fn counter_graph(kernel: &Kernel, props: serde_json::Value) -> CreationRef {
    kernel.classes().register(COUNTER_SRC, Arc::new(Counter)).unwrap();
    let created = kernel
        .recreate_graph_from_states(
            states(vec![("aa_o1", code_state()), ("aa_o2", jig_state(props))]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    created["aa_o2"]
}

// =============================================================================
// Graphs
// =============================================================================

#[tokio::test]
async fn test_cyclic_graph_recreates_with_identity() {
    let kernel = trusting_kernel();
    let created = kernel
        .recreate_graph_from_states(
            states(vec![
                ("aa_o1", code_state()),
                ("aa_o2", jig_state(json!({ "peer": { "$jig": "_o3" } }))),
                ("aa_o3", jig_state(json!({ "peer": { "$jig": "_o2" } }))),
            ]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();

    let a = created["aa_o2"];
    let b = created["aa_o3"];
    assert_eq!(peer_of(&kernel, &a), Some(b));
    assert_eq!(peer_of(&kernel, &b), Some(a));

    let class = kernel
        .membrane(&a)
        .unwrap()
        .class(Caller::External)
        .unwrap();
    assert_eq!(class, Some(created["aa_o1"]));
    assert_eq!(read(&kernel, &a, "location"), Some(Value::from("aa_o2")));
    assert_eq!(read(&kernel, &a, "origin"), Some(Value::from("aa_o2")));
    assert_eq!(read(&kernel, &a, "nonce"), Some(Value::from(0)));
}

#[tokio::test]
async fn test_concurrent_recreates_share_one_partial() {
    let kernel = trusting_kernel();
    let location = loc("aa_o1");
    let loader: Arc<dyn Loader> = Arc::new(NoLoader);
    let (first, second) = tokio::join!(
        kernel.recreate(&location, code_state(), None, loader.clone()),
        kernel.recreate(&location, code_state(), None, loader.clone()),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.creation(), second.creation());
    assert_eq!(first.ready().await.unwrap(), second.ready().await.unwrap());
    assert_eq!(kernel.status(&first.creation()), Some(SlotStatus::Ready));
}

#[tokio::test]
async fn test_missing_reference_names_the_location() {
    let kernel = trusting_kernel();
    let mut events = kernel.subscribe();
    let err = kernel
        .recreate_graph_from_states(
            states(vec![
                ("aa_o1", code_state()),
                ("aa_o2", jig_state(json!({ "peer": { "$jig": "bb_o1" } }))),
            ]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap_err();
    assert_eq!(err, KernelError::MissingReference("bb_o1".into()));

    let jig = kernel.partial(&loc("aa_o2")).unwrap().creation();
    assert!(matches!(kernel.status(&jig), Some(SlotStatus::Failed(_))));
    assert!(matches!(kernel.membrane(&jig), Err(KernelError::Unusable(_))));

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        if let KernelEvent::Failed { location, .. } = event {
            assert_eq!(location, "aa_o2");
            failed = true;
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn test_cache_loader_follows_references() {
    let store = Arc::new(MemoryStateStore::new());
    store.insert(&loc("aa_o1"), code_state()).await;
    store
        .insert(&loc("aa_o2"), jig_state(json!({ "peer": { "$jig": "_o3" } })))
        .await;
    store
        .insert(&loc("aa_o3"), jig_state(json!({ "peer": { "$jig": "_o2" } })))
        .await;
    assert_eq!(store.len().await, 3);

    let kernel = trusting_kernel();
    let loader = CacheLoader::new(store.clone());
    let a = kernel.load(&loc("aa_o2"), loader.clone()).await.unwrap();
    let b = peer_of(&kernel, &a).unwrap();
    assert_eq!(peer_of(&kernel, &b), Some(a));
    assert_eq!(kernel.location_of(&b), Some(loc("aa_o3")));

    // Loading again answers from the kernel
    assert_eq!(kernel.load(&loc("aa_o2"), loader).await.unwrap(), a);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_unknown_kind_and_version() {
    let kernel = trusting_kernel();
    let widget = CachedState::from_json(r#"{"kind":"widget","version":"04","props":{}}"#).unwrap();
    let err = kernel
        .recreate(&loc("aa_o1"), widget, None, Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert_eq!(err, KernelError::UnknownKind("widget".into()));

    let mut old = code_state();
    old.version = "03".into();
    let err = kernel
        .recreate(&loc("aa_o1"), old, None, Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert_eq!(err, KernelError::UnsupportedVersion("03".into()));

    // Nothing was left behind, so a valid state still loads
    let partial = kernel
        .recreate(&loc("aa_o1"), code_state(), None, Arc::new(NoLoader))
        .await
        .unwrap();
    partial.ready().await.unwrap();
}

#[tokio::test]
async fn test_untrusted_code_is_refused() {
    let kernel = Kernel::new(KernelConfig::default());
    let err = kernel
        .recreate(&loc("aa_o1"), code_state(), None, Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert_eq!(err, KernelError::Trust("aa_o1".into()));

    let by_txid = Kernel::new(KernelConfig::default().trusting("aa"));
    let partial = by_txid
        .recreate(&loc("aa_o1"), code_state(), None, Arc::new(NoLoader))
        .await
        .unwrap();
    partial.ready().await.unwrap();
}

#[tokio::test]
async fn test_berry_hash_is_verified_and_stamped() {
    let kernel = trusting_kernel();
    let code = kernel
        .recreate(&loc("aa_o1"), code_state(), None, Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();

    let berry = CachedState::new(CreationKind::Berry, json!({ "text": "hi" })).with_cls("aa_o1");
    let wrong = "0".repeat(64);
    let err = kernel
        .recreate(&loc("bb_o1?berry=post"), berry.clone(), Some(&wrong), Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::HashMismatch { expected, .. } if expected == wrong));

    let partial = kernel
        .recreate(&loc("bb_o1?berry=post"), berry.clone(), None, Arc::new(NoLoader))
        .await
        .unwrap();
    let hash = hash_state(&berry).unwrap();
    assert_eq!(partial.location().hash(), Some(hash.as_str()));

    let creation = partial.ready().await.unwrap();
    let stamped = format!("bb_o1?berry=post&hash={hash}");
    assert_eq!(read(&kernel, &creation, "location"), Some(Value::from(stamped.as_str())));
    assert_eq!(read(&kernel, &creation, "origin"), Some(Value::from(stamped.as_str())));
    assert!(matches!(
        kernel.membrane(&creation).unwrap().get(Caller::External, "nonce"),
        Err(MembraneError::Bindings(_))
    ));
    assert_eq!(
        kernel.membrane(&creation).unwrap().class(Caller::External).unwrap(),
        Some(code)
    );
}

#[tokio::test]
async fn test_berry_state_changed_after_hashing_is_refused() {
    let kernel = trusting_kernel();
    kernel
        .recreate(&loc("aa_o1"), code_state(), None, Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();

    let berry = CachedState::new(CreationKind::Berry, json!({ "text": "hi" })).with_cls("aa_o1");
    let hash = hash_state(&berry).unwrap();
    let at = loc(&format!("bb_o1?berry=post&hash={hash}"));

    let mut tampered = berry.clone();
    tampered.props = json!({ "text": "hj" });
    let err = kernel
        .recreate(&at, tampered, None, Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KernelError::HashMismatch { ref expected, ref actual, .. } if *expected == hash && *actual != hash
    ));
    assert!(kernel.partial(&at).is_none());

    let creation = kernel
        .recreate(&at, berry, None, Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();
    assert_eq!(read(&kernel, &creation, "location"), Some(Value::from(at.to_string())));
}

#[tokio::test]
async fn test_verify_policy_decides_for_code_and_jigs() {
    let wrong = "0".repeat(64);

    let strict = trusting_kernel();
    let err = strict
        .recreate(&loc("aa_o1"), code_state(), Some(&wrong), Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::HashMismatch { .. }));
    let right = hash_state(&code_state()).unwrap();
    strict
        .recreate(&loc("aa_o1"), code_state(), Some(&right), Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();
    let err = strict
        .recreate(&loc("aa_o2"), jig_state(json!({})), Some(&wrong), Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::HashMismatch { .. }));

    let lenient = Kernel::new(KernelConfig {
        verify: VerifyPolicy::BerriesOnly,
        ..KernelConfig::default().trusting("*")
    });
    lenient
        .recreate(&loc("aa_o1"), code_state(), Some(&wrong), Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();
    lenient
        .recreate(&loc("aa_o2"), jig_state(json!({})), Some(&wrong), Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();

    let berry = CachedState::new(CreationKind::Berry, json!({ "text": "hi" })).with_cls("aa_o1");
    let err = lenient
        .recreate(&loc("bb_o1?berry=post"), berry, Some(&wrong), Arc::new(NoLoader))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::HashMismatch { .. }));
}

#[tokio::test]
async fn test_worldview_divergence() {
    let kernel = trusting_kernel();
    let created = kernel
        .recreate_graph_from_states(
            states(vec![
                ("aa_o1", code_state()),
                ("aa_o2", jig_state(json!({ "origin": "cc_o1" }))),
            ]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    assert_eq!(read(&kernel, &created["aa_o2"], "origin"), Some(Value::from("cc_o1")));

    let second = kernel
        .recreate(
            &loc("dd_o1"),
            jig_state(json!({ "origin": "cc_o1" })).with_cls("aa_o1"),
            None,
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    assert_eq!(
        second.ready().await.unwrap_err(),
        KernelError::InconsistentWorldview {
            origin: "cc_o1".into(),
            existing: "aa_o2".into(),
            claimed: "dd_o1".into(),
        }
    );

    kernel.worldview().reconcile("cc_o1", "ee_o1");
    let third = kernel
        .recreate(
            &loc("ee_o1"),
            jig_state(json!({ "origin": "cc_o1" })).with_cls("aa_o1"),
            None,
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    third.ready().await.unwrap();
}

// =============================================================================
// Methods
// =============================================================================

#[tokio::test]
async fn test_methods_through_the_membrane() {
    let kernel = trusting_kernel();
    kernel.classes().register(COUNTER_SRC, Arc::new(Counter)).unwrap();
    let created = kernel
        .recreate_graph_from_states(
            states(vec![
                ("aa_o1", code_state()),
                ("aa_o2", jig_state(json!({ "count": 0, "owner": "alice", "_secret": "s" }))),
            ]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    let jig = created["aa_o2"];
    let membrane = kernel.membrane(&jig).unwrap();

    assert!(matches!(
        membrane.set(Caller::External, "count", Value::from(5)),
        Err(MembraneError::OutsideMethod(_))
    ));
    assert!(matches!(
        membrane.set(Caller::External, "owner", Value::from("mallory")),
        Err(MembraneError::Bindings(_))
    ));
    assert!(matches!(
        membrane.get(Caller::External, "_secret"),
        Err(MembraneError::Privacy(_))
    ));

    let outcome = kernel.call(&jig, "increment", vec![]).unwrap();
    assert_eq!(outcome.value.value(), Some(&Value::from(1)));
    assert!(outcome.actions.iter().any(|action| action.is_update()));
    assert_eq!(read(&kernel, &jig, "count"), Some(Value::from(1)));
    assert_eq!(read(&kernel, &jig, "nonce"), Some(Value::from(1)));

    let peek = kernel.call(&jig, "peek", vec![]).unwrap();
    assert_eq!(peek.value.value(), Some(&Value::from("s")));
    // Reads change nothing
    assert_eq!(read(&kernel, &jig, "nonce"), Some(Value::from(1)));

    assert_eq!(
        kernel.call(&jig, "explode", vec![]).unwrap_err(),
        KernelError::UnknownMethod("explode".into())
    );
}

#[tokio::test]
async fn test_arguments_are_copied_into_the_jig() {
    let kernel = trusting_kernel();
    let jig = counter_graph(&kernel, json!({})).await;

    let arg = ObjectRef::object();
    arg.write().set("n", Value::from(1)).unwrap();
    kernel.call(&jig, "store", vec![Value::Object(arg.clone())]).unwrap();
    assert_eq!(read(&kernel, &jig, "nonce"), Some(Value::from(1)));

    arg.write().set("n", Value::from(666)).unwrap();
    assert_eq!(read_nested(&kernel, &jig, "held", "n"), Some(Value::from(1)));
    assert_eq!(read(&kernel, &jig, "nonce"), Some(Value::from(1)));
}

#[tokio::test]
async fn test_scratch_view_never_reaches_the_jig() {
    let kernel = trusting_kernel();
    let jig = counter_graph(&kernel, json!({ "inner": { "n": 1 }, "_secret": "s" })).await;

    let scratch = kernel.scratch(&jig).unwrap();
    let inner = scratch.get(Caller::External, "inner").unwrap().unwrap();
    inner.member().unwrap().set(Caller::External, "n", Value::from(2)).unwrap();
    scratch.set(Caller::External, "extra", Value::from(true)).unwrap();

    let again = scratch.get(Caller::External, "inner").unwrap().unwrap();
    let n = again.member().unwrap().get(Caller::External, "n").unwrap();
    assert_eq!(n.and_then(Property::into_value), Some(Value::from(2)));
    assert!(matches!(
        scratch.get(Caller::External, "_secret"),
        Err(MembraneError::Privacy(_))
    ));

    assert_eq!(read_nested(&kernel, &jig, "inner", "n"), Some(Value::from(1)));
    assert_eq!(read(&kernel, &jig, "extra"), None);
    assert_eq!(read(&kernel, &jig, "nonce"), Some(Value::from(0)));
}

#[tokio::test]
async fn test_builtin_code_runs_without_this() {
    let kernel = trusting_kernel();
    kernel.classes().register(CLOCK_SRC, Arc::new(Clock)).unwrap();
    let native = loc("native://Clock");
    let code = kernel.install_builtin(&native, CLOCK_SRC, Props::new()).unwrap();

    let now = kernel.call(&code, "now", vec![]).unwrap();
    assert_eq!(now.value.value(), Some(&Value::from(42)));
    assert_eq!(
        kernel.call(&code, "touch", vec![]).unwrap_err(),
        KernelError::Membrane(MembraneError::Thisless("touch".into()))
    );
    assert!(matches!(
        kernel.membrane(&code).unwrap().set(Caller::External, "x", Value::Null),
        Err(MembraneError::Immutable(_))
    ));

    let state = CachedState::new(CreationKind::Jig, json!({ "n": 1 })).with_cls("native://Clock");
    let jig = kernel
        .recreate(&loc("aa_o2"), state, None, Arc::new(NoLoader))
        .await
        .unwrap()
        .ready()
        .await
        .unwrap();
    assert_eq!(kernel.membrane(&jig).unwrap().class(Caller::External).unwrap(), Some(code));
    let captured = kernel.capture_state(&jig).unwrap();
    assert_eq!(captured.cls, Some(json!({ "$jig": "native://Clock" })));
}

#[tokio::test]
async fn test_unregistered_class() {
    let kernel = trusting_kernel();
    let created = kernel
        .recreate_graph_from_states(
            states(vec![("aa_o1", code_state()), ("aa_o2", jig_state(json!({})))]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    assert_eq!(
        kernel.call(&created["aa_o2"], "increment", vec![]).unwrap_err(),
        KernelError::UnknownClass(COUNTER_SRC.into())
    );
}

#[test]
fn test_reserved_method_registration_fails() {
    struct Destroyer;

    impl Class for Destroyer {
        fn methods(&self) -> Vec<String> {
            vec!["destroy".into()]
        }

        fn call(&self, _: MethodScope<'_>, _: &str, _: &[Value]) -> Result<Value, MembraneError> {
            Ok(Value::Undefined)
        }
    }

    let kernel = trusting_kernel();
    let err = kernel
        .classes()
        .register("class D {}", Arc::new(Destroyer))
        .unwrap_err();
    assert_eq!(err, KernelError::Membrane(MembraneError::Reserved("destroy".into())));
    assert!(kernel.classes().is_empty());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_capture_then_recreate_in_fresh_kernel() {
    let graph = || {
        states(vec![
            ("aa_o1", code_state()),
            (
                "aa_o2",
                jig_state(json!({
                    "count": 2,
                    "owner": "alice",
                    "nested": { "list": [1, "a"], "tags": { "$set": ["x", "y"] } },
                    "self": { "$jig": "_o2" },
                })),
            ),
        ])
    };

    let first = trusting_kernel();
    let created = first.recreate_graph_from_states(graph(), Arc::new(NoLoader)).await.unwrap();
    let captured = first.capture_state(&created["aa_o2"]).unwrap();
    assert_eq!(captured.cls, Some(json!({ "$jig": "aa_o1" })));
    assert_eq!(captured.props["count"], json!(2));
    assert_eq!(captured.props["self"], json!({ "$jig": "aa_o2" }));
    assert_eq!(captured.props["location"], json!("aa_o2"));
    assert_eq!(captured.props["nested"]["tags"], json!({ "$set": ["x", "y"] }));

    let code = first.capture_state(&created["aa_o1"]).unwrap();
    assert_eq!(code.src.as_deref(), Some(COUNTER_SRC));

    let second = trusting_kernel();
    let recreated = second
        .recreate_graph_from_states(
            states(vec![("aa_o1", code), ("aa_o2", captured.clone())]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    assert_eq!(second.capture_state(&recreated["aa_o2"]).unwrap(), captured);
}

#[tokio::test]
async fn test_timed_out_load_leaves_shell_unusable() {
    let mut config = KernelConfig::default().trusting("*");
    config.load_timeout_ms = Some(50);
    let kernel = Kernel::new(config);
    let loader: Arc<dyn Loader> = Arc::new(StallingLoader);

    // The class reference can only come from the loader, which never answers
    let partial = kernel
        .recreate(&loc("aa_o2"), jig_state(json!({})), None, loader.clone())
        .await
        .unwrap();
    let err = kernel.load(&loc("aa_o2"), loader).await.unwrap_err();
    assert_eq!(err, KernelError::Timeout("aa_o2".into()));

    let jig = partial.creation();
    assert!(matches!(kernel.status(&jig), Some(SlotStatus::Failed(_))));
    assert!(matches!(kernel.membrane(&jig), Err(KernelError::Unusable(_))));
}

#[tokio::test]
async fn test_second_hydration_is_a_no_op() {
    let kernel = trusting_kernel();
    let created = kernel
        .recreate_graph_from_states(
            states(vec![("aa_o1", code_state()), ("aa_o2", jig_state(json!({ "count": 0 })))]),
            Arc::new(NoLoader),
        )
        .await
        .unwrap();
    let jig = created["aa_o2"];

    let mut props = Props::new();
    props.insert("count".into(), Value::from(99));
    kernel
        .hydrate(
            jig,
            Hydration {
                location: loc("aa_o2"),
                cls: Some(created["aa_o1"]),
                src: None,
                props,
            },
        )
        .unwrap();
    assert_eq!(read(&kernel, &jig, "count"), Some(Value::from(0)));
}
