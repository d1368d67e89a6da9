use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tether_core::{
    Action, ActionKind, ActionType, Dispatcher, DispatcherConfig, Effect, Error, Event,
    HandlerContext, HandlerMap, Store, StoreKey, StoreUpdate,
};

fn kinds(trace: &[ActionKind]) -> Vec<&str> {
    trace.iter().map(ActionKind::as_str).collect()
}

fn errors(events: &[Event]) -> Vec<&Error> {
    events.iter().filter_map(Event::as_error).collect()
}

#[test]
fn test_dispatch_event_precedes_effects() {
    let first: StoreKey<u32> = StoreKey::new("first");
    let second: StoreKey<u32> = StoreKey::new("second");
    let outer: ActionType<()> = ActionType::new("outer");
    let inner: ActionType<()> = ActionType::new("inner");

    let handlers = HandlerMap::new()
        .on(&outer, {
            let first = first.clone();
            let inner = inner.clone();
            move |ctx: HandlerContext, _: ()| {
                ctx.set(&first, 1);
                ctx.dispatch(inner.create(()));
            }
        })
        .on(&inner, {
            let second = second.clone();
            move |ctx: HandlerContext, _: ()| ctx.set(&second, 2)
        });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(outer.create(()));

    let events = events.drain();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].as_action().map(|a| a.kind().as_str()), Some("outer"));
    let updates = events[1].as_updates().expect("outer updates");
    assert_eq!(updates[0].key(), first.path());
    let derived = events[2].as_action().expect("derived action");
    assert_eq!(derived.kind().as_str(), "inner");
    assert_eq!(kinds(derived.trace()), vec!["outer"]);
    let updates = events[3].as_updates().expect("inner updates");
    assert_eq!(kinds(updates[0].trace()), vec!["inner", "outer"]);

    assert_eq!(dispatcher.store().get(&first), Some(1));
    assert_eq!(dispatcher.store().get(&second), Some(2));
}

#[test]
fn test_unknown_action_single_error_no_mutation() {
    let (dispatcher, mut events) = Dispatcher::create(Store::new(), HandlerMap::new());
    dispatcher.dispatch(Action::new("nobody/handles/this", 1u8));

    let events = events.drain();
    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_handler_not_found());
    assert!(events.iter().all(|e| !e.is_updates()));
    assert!(dispatcher.store().snap().is_empty());
}

#[test]
fn test_nested_dispatch_grows_trace() {
    let leaf: StoreKey<&'static str> = StoreKey::new("leaf");
    let a: ActionType<()> = ActionType::new("a");
    let b: ActionType<()> = ActionType::new("b");
    let c: ActionType<()> = ActionType::new("c");

    let handlers = HandlerMap::new()
        .on(&a, {
            let b = b.clone();
            move |ctx: HandlerContext, _: ()| ctx.dispatch(b.create(()))
        })
        .on(&b, {
            let c = c.clone();
            move |_ctx: HandlerContext, _: ()| c.create(())
        })
        .on(&c, {
            let leaf = leaf.clone();
            move |_ctx: HandlerContext, _: ()| StoreUpdate::set(&leaf, "done")
        });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(a.create(()));

    let update = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::Updates(updates) => updates.into_iter().next(),
            _ => None,
        })
        .next()
        .expect("leaf update");
    assert_eq!(kinds(update.trace()), vec!["c", "b", "a"]);
    assert_eq!(dispatcher.store().get(&leaf), Some("done"));
}

#[test]
fn test_panicking_handler_is_reported() {
    let count: StoreKey<u32> = StoreKey::new("count");
    let boom: ActionType<()> = ActionType::new("boom");
    let bump: ActionType<()> = ActionType::new("bump");

    let handlers = HandlerMap::new()
        .on(&boom, |_ctx: HandlerContext, _: ()| -> () { panic!("kaboom") })
        .on(&bump, {
            let count = count.clone();
            move |ctx: HandlerContext, _: ()| {
                let n = ctx.get_or_else(&count, 0);
                ctx.set(&count, n + 1);
            }
        });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(boom.create(()));
    dispatcher.dispatch(bump.create(()));

    let events = events.drain();
    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Error::HandlerThrew { .. }));
    assert!(errors[0].to_string().contains("kaboom"));
    assert_eq!(dispatcher.store().get(&count), Some(1));
}

#[test]
fn test_error_channel_survives_repeated_failures() {
    let ok: ActionType<()> = ActionType::new("ok");
    let flag: StoreKey<bool> = StoreKey::new("flag");
    let handlers = HandlerMap::new().on(&ok, {
        let flag = flag.clone();
        move |ctx: HandlerContext, _: ()| ctx.set(&flag, true)
    });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    for _ in 0..3 {
        dispatcher.dispatch(Action::new("missing", ()));
    }
    dispatcher.dispatch(ok.create(()));

    let events = events.drain();
    assert_eq!(errors(&events).len(), 3);
    assert!(events.last().map_or(false, Event::is_updates));
    assert_eq!(dispatcher.store().get(&flag), Some(true));
}

#[test]
fn test_payload_mismatch_is_reported() {
    let typed: ActionType<u32> = ActionType::new("typed");
    let handlers = HandlerMap::new().on(&typed, |_ctx: HandlerContext, _n: u32| ());
    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);

    dispatcher.dispatch(Action::new("typed", "text"));
    let events = events.drain();
    assert!(matches!(errors(&events)[..], [Error::PayloadMismatch { .. }]));
}

#[test]
fn test_dispatch_depth_limit() {
    let count: StoreKey<usize> = StoreKey::new("count");
    let again: ActionType<()> = ActionType::new("again");
    let handlers = HandlerMap::new().on(&again, {
        let count = count.clone();
        let again = again.clone();
        move |ctx: HandlerContext, _: ()| {
            ctx.set(&count, ctx.get_or_else(&count, 0) + 1);
            ctx.dispatch(again.create(()));
        }
    });

    let config = DispatcherConfig::default().with_max_dispatch_depth(5);
    let (dispatcher, mut events) = Dispatcher::with_config(Store::new(), handlers, config);
    dispatcher.dispatch(again.create(()));

    let events = events.drain();
    let errors = errors(&events);
    assert!(matches!(errors[..], [Error::DispatchDepthExceeded { limit: 5, .. }]));
    assert_eq!(events.iter().filter(|e| e.is_action()).count(), 7);
    assert_eq!(dispatcher.store().get(&count), Some(6));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_if_changed_suppresses_late_write() {
    let text: StoreKey<String> = StoreKey::new("text");
    let done: StoreKey<bool> = StoreKey::new("done");
    let slow: ActionType<()> = ActionType::new("slow");
    let edit: ActionType<String> = ActionType::new("edit");

    let handlers = HandlerMap::new()
        .on(&slow, {
            let text = text.clone();
            let done = done.clone();
            move |ctx: HandlerContext, _: ()| {
                ctx.cancel_if_changed(&[&text]);
                let done = done.clone();
                Effect::deferred(async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    (!ctx.is_cancelled()).then(|| StoreUpdate::set(&done, true))
                })
            }
        })
        .on(&edit, {
            let text = text.clone();
            move |ctx: HandlerContext, value: String| ctx.set(&text, value)
        });

    let store = Store::new();
    store.set(&text, "before".to_string());
    let (dispatcher, _events) = Dispatcher::create(store, handlers);

    dispatcher.dispatch(slow.create(()));
    dispatcher.dispatch(edit.create("after".to_string()));
    dispatcher.settled().await;
    assert_eq!(dispatcher.store().get(&done), None);

    dispatcher.dispatch(slow.create(()));
    dispatcher.settled().await;
    assert_eq!(dispatcher.store().get(&done), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_deferred_effect_flushes_sync_writes_first() {
    let loading: StoreKey<bool> = StoreKey::new("loading");
    let load: ActionType<()> = ActionType::new("load");
    let handlers = HandlerMap::new().on(&load, {
        let loading = loading.clone();
        move |ctx: HandlerContext, _: ()| {
            ctx.set(&loading, true);
            let loading = loading.clone();
            Effect::deferred(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                StoreUpdate::set(&loading, false)
            })
        }
    });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(load.create(()));
    assert_eq!(dispatcher.store().get(&loading), Some(true));
    assert_eq!(dispatcher.in_flight(), 1);

    dispatcher.settled().await;
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(dispatcher.store().get(&loading), Some(false));
    assert_eq!(events.drain().iter().filter(|e| e.is_updates()).count(), 2);
}

#[tokio::test]
async fn test_stream_effect_emits_each_batch() {
    let tick: StoreKey<u32> = StoreKey::new("tick");
    let run: ActionType<u32> = ActionType::new("run");
    let handlers = HandlerMap::new().on(&run, {
        let tick = tick.clone();
        move |_ctx: HandlerContext, n: u32| {
            let tick = tick.clone();
            Effect::stream(futures::stream::iter(
                (1..=n).map(move |i| StoreUpdate::set(&tick, i)),
            ))
        }
    });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    let mut watched = dispatcher.store().get_stream(&tick);
    dispatcher.dispatch(run.create(3));
    dispatcher.settled().await;

    assert_eq!(events.drain().iter().filter(|e| e.is_updates()).count(), 3);
    assert_eq!(watched.drain(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_rejected_effect_is_reported() {
    let partial: StoreKey<u32> = StoreKey::new("partial");
    let fetch: ActionType<()> = ActionType::new("fetch");
    let handlers = HandlerMap::new().on(&fetch, {
        let partial = partial.clone();
        move |ctx: HandlerContext, _: ()| {
            let partial = partial.clone();
            Effect::deferred(async move {
                ctx.set(&partial, 1);
                tokio::task::yield_now().await;
                Err::<(), _>("connection reset")
            })
        }
    });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(fetch.create(()));
    dispatcher.settled().await;

    let events = events.drain();
    match errors(&events)[..] {
        [Error::HandlerRejected { kind, source }] => {
            assert_eq!(kind.as_str(), "fetch");
            assert_eq!(source.to_string(), "connection reset");
        }
        ref other => panic!("Expected one HandlerRejected, got {:?}", other),
    }
    assert_eq!(dispatcher.store().get(&partial), Some(1));
}

#[tokio::test]
async fn test_async_effect_dispatches_derived_action() {
    let seen: StoreKey<String> = StoreKey::new("seen");
    let start: ActionType<()> = ActionType::new("start");
    let finish: ActionType<String> = ActionType::new("finish");

    let handlers = HandlerMap::new()
        .on(&start, {
            let finish = finish.clone();
            move |_ctx: HandlerContext, _: ()| {
                let finish = finish.clone();
                Effect::deferred(async move { finish.create("from start".to_string()) })
            }
        })
        .on(&finish, {
            let seen = seen.clone();
            move |ctx: HandlerContext, text: String| ctx.set(&seen, text)
        });

    let (dispatcher, _events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(start.create(()));
    dispatcher.settled().await;
    assert_eq!(dispatcher.store().get(&seen).as_deref(), Some("from start"));
}

#[tokio::test(start_paused = true)]
async fn test_async_effects_publish_in_completion_order() {
    let value: StoreKey<&'static str> = StoreKey::new("value");
    let delayed: ActionType<(u64, &'static str)> = ActionType::new("delayed");
    let handlers = HandlerMap::new().on(&delayed, {
        let value = value.clone();
        move |_ctx: HandlerContext, (ms, label): (u64, &'static str)| {
            let value = value.clone();
            Effect::deferred(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                StoreUpdate::set(&value, label)
            })
        }
    });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(delayed.create((100, "slow")));
    dispatcher.dispatch(delayed.create((10, "fast")));
    dispatcher.settled().await;

    let labels: Vec<&str> = events
        .drain()
        .iter()
        .filter_map(Event::as_updates)
        .flat_map(|updates| updates.iter().filter_map(|u| u.value::<&'static str>().copied()))
        .collect();
    assert_eq!(labels, vec!["fast", "slow"]);
    assert_eq!(dispatcher.store().get(&value), Some("slow"));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cancel_predicate_is_reported_on_its_action() {
    let value: StoreKey<u32> = StoreKey::new("value");
    let watch: ActionType<()> = ActionType::new("watch");
    let write: ActionType<u32> = ActionType::new("write");
    let handlers = HandlerMap::new()
        .on(&watch, {
            let value = value.clone();
            move |ctx: HandlerContext, _: ()| {
                ctx.cancel_if_changed_with(&[&value], |_, _| panic!("predicate failed"));
                Effect::deferred(tokio::time::sleep(Duration::from_secs(1)))
            }
        })
        .on(&write, {
            let value = value.clone();
            move |ctx: HandlerContext, n: u32| ctx.set(&value, n)
        });

    let (dispatcher, mut events) = Dispatcher::create(Store::new(), handlers);
    dispatcher.dispatch(watch.create(()));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(write.create(7))));
    assert!(outcome.is_ok());
    assert_eq!(dispatcher.store().get(&value), Some(7));

    let written = events.drain();
    assert!(errors(&written).is_empty());
    let applied = written
        .iter()
        .filter_map(Event::as_updates)
        .flatten()
        .find(|u| u.key() == value.path())
        .expect("write published");
    assert_eq!(kinds(applied.trace()), vec!["write"]);

    dispatcher.settled().await;
    let finished = events.drain();
    match errors(&finished)[..] {
        [Error::HandlerRejected { kind, source }] => {
            assert_eq!(kind.as_str(), "watch");
            assert!(source.to_string().contains("predicate failed"));
        }
        ref other => panic!("Expected one HandlerRejected, got {:?}", other),
    }
}
