//! Integration Tests for the Propagation Engine
//!
//! These tests drive streams, signals, combinators and middleware together
//! through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use cascade_core::prelude::*;
use cascade_core::stream::StreamStatus;

/// Install a log subscriber once; `RUST_LOG=cascade_core=trace` shows the
/// engine's internals.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn record<T, S>(source: &S) -> (Arc<Mutex<Vec<T>>>, Subscription)
where
    T: Clone + Send + Sync + 'static,
    S: Observable<T>,
{
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let sub = source.subscribe(move |v: &T| sink.lock().push(v.clone()));
    (log, sub)
}

/// Test that a cell delivers its initial value once, whatever its comparator.
#[test]
fn initial_value_is_delivered_exactly_once() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let by_eq = Signal::new(5);
    let unchecked = Signal::builder(5).no_comparator().build();
    let always_equal = Signal::builder(5).comparator(|_: &i32, _: &i32| true).build();

    let (a, _s1) = record(&by_eq);
    let (b, _s2) = record(&unchecked);
    let (c, _s3) = record(&always_equal);
    lp.run_until_idle().unwrap();

    assert_eq!(*a.lock(), vec![5]);
    assert_eq!(*b.lock(), vec![5]);
    assert_eq!(*c.lock(), vec![5]);
}

/// Scenario: setting the value a cell already holds notifies nobody.
#[test]
fn setting_an_equal_value_is_silent() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let cell = Signal::new(0);
    let (log, _sub) = record(&cell);

    lp.tick();
    assert_eq!(*log.lock(), vec![0]);

    cell.set(0);
    lp.tick();
    assert_eq!(*log.lock(), vec![0]);
    assert_eq!(cell.get(), 0);
}

/// Test that values are readable at once but delivered after the turn.
#[test]
fn delivery_is_deferred_to_the_next_tick() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let cell = Signal::new("draft".to_string());
    let (log, _sub) = record(&cell);
    lp.run_until_idle().unwrap();

    cell.set("final".into());
    assert_eq!(cell.get(), "final");
    assert_eq!(*log.lock(), vec!["draft"]);

    lp.tick();
    assert_eq!(*log.lock(), vec!["draft", "final"]);
}

/// Test that nothing happens after a stream terminates.
#[test]
fn terminated_streams_are_inert() {
    init_tracing();
    let (emitter, stream) = channel::<i32>();

    let events = Arc::new(Mutex::new(Vec::new()));
    let (on_next, on_error, on_complete) = (events.clone(), events.clone(), events.clone());
    let _sub = stream.subscribe(
        ObserverFns::new(move |v: &i32| on_next.lock().push(format!("next {v}")))
            .on_error(move |e| on_error.lock().push(format!("error {e}")))
            .on_complete(move || on_complete.lock().push("complete".to_string())),
    );

    emitter.next(1);
    emitter.complete();
    emitter.next(2);
    emitter.error("late");
    emitter.complete();

    assert_eq!(*events.lock(), vec!["next 1", "complete"]);
    assert!(matches!(stream.status(), StreamStatus::Completed));

    let late = stream.subscribe(|_: &i32| {});
    assert!(!late.is_active());
}

/// Scenario: two sources changing in one turn cost one recompute.
#[test]
fn computed_sees_both_changes_together() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let runs = Arc::new(AtomicI32::new(0));
    let counter = runs.clone();
    let a = Signal::new(1);
    let b = Signal::new(2);
    let sum = computed((a.clone(), b.clone()), move |(a, b)| {
        counter.fetch_add(1, Ordering::SeqCst);
        a + b
    });
    assert_eq!(sum.get(), 3);

    let (log, _sub) = record(&sum);
    lp.tick();

    a.set(3);
    b.set(4);
    lp.tick();
    lp.tick();

    assert_eq!(sum.get(), 7);
    lp.run_until_idle().unwrap();
    assert_eq!(*log.lock(), vec![3, 7]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that derived cells chain: computed feeding map feeding subscribers.
#[test]
fn derived_cells_compose() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let price = Signal::new(10);
    let quantity = Signal::new(2);
    let total = computed((price.clone(), quantity.clone()), |(p, q)| p * q);
    let label = total.map(|t| format!("${t}"));

    quantity.set(3);
    lp.run_until_idle().unwrap();

    assert_eq!(total.get(), 30);
    assert_eq!(label.get(), "$30");
}

/// Scenario: a burst inside one window is delivered as a single batch.
#[test]
fn buffer_groups_a_burst() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let (emitter, stream) = channel::<i32>();
    let batches = stream.buffer(Duration::from_millis(50)).unwrap();
    let (log, _sub) = record(&batches);

    emitter.next(1);
    emitter.next(2);
    lp.advance(Duration::from_millis(75)).unwrap();

    assert_eq!(*log.lock(), vec![vec![1, 2]]);
}

/// Test that a buffer flushes before forwarding completion and never emits
/// an empty batch.
#[test]
fn buffer_flushes_on_completion() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let (emitter, stream) = channel::<i32>();
    let batches = buffer(&stream, Duration::from_millis(50)).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let (on_next, on_complete) = (events.clone(), events.clone());
    let _sub = batches.subscribe(
        ObserverFns::new(move |b: &Vec<i32>| on_next.lock().push(format!("{b:?}")))
            .on_complete(move || on_complete.lock().push("complete".to_string())),
    );

    emitter.next(1);
    lp.advance(Duration::from_millis(100)).unwrap();
    emitter.next(2);
    emitter.complete();
    lp.advance(Duration::from_millis(100)).unwrap();

    assert_eq!(*events.lock(), vec!["[1]", "[2]", "complete"]);
}

/// Test that a merge completes with its last source and fails with its
/// first error.
#[test]
fn merge_completion_and_failure() {
    init_tracing();
    let (e1, s1) = channel::<i32>();
    let (e2, s2) = channel::<i32>();
    let (e3, s3) = channel::<i32>();

    let merged = merge([s1, s2, s3]);
    e1.complete();
    e2.complete();
    assert!(!merged.is_terminated());
    e3.complete();
    assert!(matches!(merged.status(), StreamStatus::Completed));

    let (f1, t1) = channel::<i32>();
    let (_f2, t2) = channel::<i32>();
    let failing = merge([t1, t2]);
    f1.error("first source failed");
    assert!(matches!(failing.status(), StreamStatus::Errored(_)));
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Number(i32),
    Letter(&'static str),
}

/// Scenario: merged values arrive in emission order across sources.
#[test]
fn merge_preserves_interleaving() {
    init_tracing();
    let (numbers, s1) = channel::<i32>();
    let (letters, s2) = channel::<&'static str>();

    let merged = merge([s1.map(|n| Item::Number(*n)), s2.map(|l| Item::Letter(*l))]);
    let (log, _sub) = record(&merged);

    numbers.next(1);
    letters.next("a");
    numbers.next(2);
    letters.next("b");

    assert_eq!(
        *log.lock(),
        vec![
            Item::Number(1),
            Item::Letter("a"),
            Item::Number(2),
            Item::Letter("b"),
        ]
    );
}

/// Test that a signal feeds a stream pipeline.
#[test]
fn signal_drives_a_stream_pipeline() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let reading = Signal::new(0);
    let alerts = filter(&reading, |v: &i32| *v > 100).map(|v| format!("high: {v}"));
    let (log, _sub) = record(&alerts);

    for v in [50, 150, 80, 300] {
        reading.set(v);
        lp.run_until_idle().unwrap();
    }

    assert_eq!(*log.lock(), vec!["high: 150", "high: 300"]);
}

/// Test that a selected cell can be switched out from under a subscriber.
#[test]
fn unwrapped_switches_between_cells() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let english = Signal::new("hello".to_string());
    let french = Signal::new("bonjour".to_string());
    let language = Signal::new(Some(english.clone()));
    let greeting = unwrapped(&language, |cell: &Signal<String>| cell.clone(), String::new());
    lp.run_until_idle().unwrap();
    assert_eq!(greeting.get(), "hello");

    language.set(Some(french.clone()));
    lp.run_until_idle().unwrap();
    assert_eq!(greeting.get(), "bonjour");

    english.set("hi".into());
    french.set("salut".into());
    lp.run_until_idle().unwrap();
    assert_eq!(greeting.get(), "salut");
}

/// Test that a registry tears down subscriptions across sources.
#[test]
fn registry_releases_a_component() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let width = Signal::new(100);
    let height = Signal::new(50);
    let registry = SubscriptionRegistry::new();
    let (log, sub) = record(&width);
    registry.add(sub);
    registry.add(height.subscribe(|_: &i32| {}));
    lp.run_until_idle().unwrap();

    registry.unsubscribe_all();
    width.set(200);
    lp.run_until_idle().unwrap();

    assert_eq!(*log.lock(), vec![100]);
    assert_eq!(width.subscriber_count(), 0);
    assert_eq!(height.subscriber_count(), 0);
}

/// Test that the interop view keeps forgotten registrations alive.
#[test]
fn interop_view_holds_observers() {
    init_tracing();
    let lp = EventLoop::new();
    let _ctx = lp.enter();

    let cell = Signal::new(1);
    let view = cell.as_interop();
    let seen = Arc::new(AtomicI32::new(0));
    let sink = seen.clone();
    let handle = view.subscribe(move |v: &i32| sink.store(*v, Ordering::SeqCst));

    cell.set(2);
    lp.run_until_idle().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    handle.unsubscribe();
    cell.set(3);
    lp.run_until_idle().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

/// Test that chained handlers compose left to right.
#[tokio::test]
async fn middleware_chain_composes() {
    init_tracing();
    let executor = ChainExecutor::new();
    executor.add("fetch", handler(|v: i32| async move { Some(v + 1) }));
    executor.add("fetch", handler(|v: i32| async move { Some(v * 2) }));

    assert_eq!(executor.chain(&"fetch", 1).await, 4);
}

/// Scenario: the same handler cannot be registered twice for one kind.
#[test]
fn middleware_rejects_duplicates() {
    init_tracing();
    let executor: ChainExecutor<&str, i32> = ChainExecutor::new();
    let h1 = handler(|v: i32| async move { Some(v) });

    executor.add("fetch", h1.clone());
    executor.add("fetch", h1);
    assert_eq!(executor.len(), 1);
}

/// Test that a request pipeline falls through to the final handler.
#[tokio::test]
async fn middleware_dispatch_with_fallback() {
    init_tracing();
    let executor: ChainExecutor<&str, Exchange<String, u16>> = ChainExecutor::new();
    executor.add(
        "request",
        handler(|mut ex: Exchange<String, u16>| async move {
            ex.request = ex.request.trim_start_matches('/').to_string();
            Some(ex)
        }),
    );
    executor.add(
        "request",
        handler(|ex: Exchange<String, u16>| async move {
            (ex.request == "health").then(|| ex.clone().respond(204))
        }),
    );

    let health = executor
        .dispatch(&"request", "/health".into(), |_| async { 500 })
        .await;
    let other = executor
        .dispatch(&"request", "/users".into(), |path| async move {
            if path == "users" {
                200
            } else {
                404
            }
        })
        .await;

    assert_eq!(health, 204);
    assert_eq!(other, 200);
}

/// Test that signals run on tokio and settle futures.
#[tokio::test]
async fn signals_on_tokio_settle_futures() {
    init_tracing();
    let scheduler = TokioScheduler::new().unwrap();
    let _ctx = scheduler.enter();

    let status = Signal::new("starting");
    let ready = status.to_future(ResolveOptions::new().resolve_when(|s: &&str| *s == "ready"));

    status.set("loading");
    status.set("ready");
    assert_eq!(ready.await.unwrap(), "ready");
}

/// Test that cells built on a runtime notify with no scheduler entered.
#[tokio::test]
async fn signals_notify_on_the_runtime_by_default() {
    init_tracing();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let signal = Signal::new(1);
    let _sub = signal.subscribe(move |v: &i32| {
        let _ = tx.send(*v);
    });
    signal.set(2);

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        seen.push(next.unwrap().unwrap());
    }
    assert_eq!(seen, vec![1, 2]);
}

/// Test that buffer windows run on the runtime's timers by default.
#[tokio::test(start_paused = true)]
async fn buffer_flushes_on_the_runtime_by_default() {
    init_tracing();
    let (emitter, stream) = channel::<i32>();
    let batches = stream.buffer(Duration::from_millis(50)).unwrap();
    let flushed = batches.to_future(ResolveOptions::new());

    emitter.next(1);
    emitter.next(2);
    assert_eq!(flushed.await.unwrap(), vec![1, 2]);
}

/// Test that a future round-trips through a stream.
#[tokio::test]
async fn future_to_stream_to_future() {
    init_tracing();
    let stream = from_future(async {
        tokio::task::yield_now().await;
        Ok::<_, StreamError>(42)
    })
    .unwrap();

    let doubled = stream.map(|v| v * 2);
    let value = to_future(&doubled, ResolveOptions::new()).await;
    assert_eq!(value.unwrap(), 84);
}

/// Test that the event loop can be configured from JSON.
#[test]
fn configured_event_loop_bounds_runaway_updates() {
    init_tracing();
    let config = EngineConfig::from_json(r#"{ "max_ticks": 8 }"#).unwrap();
    let lp = EventLoop::with_config(config);
    let _ctx = lp.enter();

    let counter = Signal::new(0);
    let writer = counter.clone();
    let _sub = counter.subscribe(move |v: &i32| writer.set(v + 1));

    assert!(matches!(
        lp.run_until_idle(),
        Err(EngineError::TickLimitExceeded { limit: 8 })
    ));
}
