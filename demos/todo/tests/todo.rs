use std::time::Duration;
use tether_core::{assert_emissions, set_value, HandlerHarness, SetValue, StoreUpdate};
use todo::{
    add_item, complete_item, complete_item_later, delete_item, todo_slice, todo_slice_with_ids,
    todos, CompleteLater, TodoActions, TodoItem, TodoKeys,
};

const ITEM_KEY: &str = "key";

fn fixed_id() -> String {
    ITEM_KEY.to_string()
}

#[tokio::test]
async fn test_set_handler() {
    let keys = TodoKeys::new();
    let emitted = HandlerHarness::new()
        .run(
            &set_value::<String>(),
            SetValue::new(keys.text.clone(), "text".to_string()),
        )
        .await
        .expect("set runs");
    assert_emissions(
        &emitted,
        &[StoreUpdate::set(&keys.text, "text".to_string()).into()],
    );
}

#[tokio::test]
async fn test_add_item_handler() {
    let keys = TodoKeys::new();
    let emitted = HandlerHarness::new()
        .run(&add_item(keys.clone(), fixed_id), ())
        .await
        .expect("add runs");
    assert_emissions(
        &emitted,
        &[
            StoreUpdate::set(&keys.item(ITEM_KEY), TodoItem::new(ITEM_KEY)).into(),
            StoreUpdate::set(&keys.list, vec![ITEM_KEY.to_string()]).into(),
            StoreUpdate::set(&keys.text, String::new()).into(),
        ],
    );
}

#[tokio::test]
async fn test_complete_item_handler() {
    let keys = TodoKeys::new();
    let emitted = HandlerHarness::new()
        .setup([StoreUpdate::set(&keys.item("1"), TodoItem::new("1"))])
        .run(&complete_item(keys.clone()), "1".to_string())
        .await
        .expect("complete runs");
    assert_emissions(
        &emitted,
        &[StoreUpdate::set(
            &keys.item("1"),
            TodoItem {
                completed: true,
                ..TodoItem::new("1")
            },
        )
        .into()],
    );
}

#[tokio::test]
async fn test_complete_unknown_item_emits_nothing() {
    let keys = TodoKeys::new();
    let emitted = HandlerHarness::new()
        .run(&complete_item(keys), "missing".to_string())
        .await
        .expect("complete runs");
    assert!(emitted.is_empty());
}

#[tokio::test]
async fn test_delete_item_handler() {
    let keys = TodoKeys::new();
    let emitted = HandlerHarness::new()
        .setup([StoreUpdate::set(
            &keys.list,
            vec!["1".to_string(), "2".to_string()],
        )])
        .run(&delete_item(keys.clone()), "1".to_string())
        .await
        .expect("delete runs");
    assert_emissions(
        &emitted,
        &[
            StoreUpdate::del(&keys.item("1")).into(),
            StoreUpdate::set(&keys.list, vec!["2".to_string()]).into(),
        ],
    );
}

#[test]
fn test_add_item_end_to_end() {
    let slice = todo_slice_with_ids(fixed_id).expect("valid slice");
    let actions = TodoActions::from_slice(&slice).expect("typed actions");
    let keys = TodoKeys::new();
    let mut runtime = slice.init(None);

    assert_eq!(runtime.store.get(&keys.text).as_deref(), Some(""));
    runtime.dispatcher.dispatch(
        actions
            .set
            .create(SetValue::new(keys.text.clone(), "buy milk".to_string())),
    );
    runtime.dispatcher.dispatch(actions.add.create(()));

    assert_eq!(runtime.store.get(&keys.text).as_deref(), Some(""));
    assert_eq!(
        runtime.store.get(&keys.list),
        Some(vec![ITEM_KEY.to_string()])
    );
    assert_eq!(
        todos(&runtime.store, &keys),
        vec![TodoItem {
            key: ITEM_KEY.to_string(),
            description: "buy milk".to_string(),
            completed: false,
        }]
    );

    let events = runtime.events.drain();
    assert!(events.iter().all(|e| !e.is_error()));
    let add_updates = events
        .iter()
        .filter_map(|e| e.as_updates())
        .last()
        .expect("add updates");
    assert_eq!(add_updates.len(), 3);
    assert!(add_updates
        .iter()
        .all(|u| u.trace().iter().map(|k| k.as_str()).eq(["addTodoItem"])));
}

#[test]
fn test_random_ids_are_distinct() {
    let slice = todo_slice().expect("valid slice");
    let actions = TodoActions::from_slice(&slice).expect("typed actions");
    let keys = TodoKeys::new();
    let runtime = slice.init(None);

    runtime.dispatcher.dispatch(actions.add.create(()));
    runtime.dispatcher.dispatch(actions.add.create(()));
    let ids = runtime.store.get(&keys.list).unwrap_or_default();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_completion() {
    let slice = todo_slice_with_ids(fixed_id).expect("valid slice");
    let actions = TodoActions::from_slice(&slice).expect("typed actions");
    let keys = TodoKeys::new();
    let runtime = slice.init(None);

    runtime.dispatcher.dispatch(actions.add.create(()));
    runtime.dispatcher.dispatch(actions.complete_later.create(CompleteLater {
        id: ITEM_KEY.to_string(),
        delay: Duration::from_secs(1),
    }));
    assert_eq!(
        runtime.store.get(&keys.item(ITEM_KEY)).map(|t| t.completed),
        Some(false)
    );

    runtime.dispatcher.settled().await;
    assert_eq!(
        runtime.store.get(&keys.item(ITEM_KEY)).map(|t| t.completed),
        Some(true)
    );
}

#[tokio::test(start_paused = true)]
async fn test_delayed_completion_cancelled_by_edit() {
    let slice = todo_slice_with_ids(fixed_id).expect("valid slice");
    let actions = TodoActions::from_slice(&slice).expect("typed actions");
    let keys = TodoKeys::new();
    let runtime = slice.init(None);

    runtime.dispatcher.dispatch(actions.add.create(()));
    runtime.dispatcher.dispatch(actions.complete_later.create(CompleteLater {
        id: ITEM_KEY.to_string(),
        delay: Duration::from_secs(1),
    }));

    tokio::time::sleep(Duration::from_millis(500)).await;
    runtime.dispatcher.dispatch(actions.complete.create(ITEM_KEY.to_string()));
    runtime.dispatcher.dispatch(actions.complete.create(ITEM_KEY.to_string()));

    runtime.dispatcher.settled().await;
    assert_eq!(
        runtime.store.get(&keys.item(ITEM_KEY)).map(|t| t.completed),
        Some(false)
    );
}

#[tokio::test(start_paused = true)]
async fn test_delayed_completion_cancelled_by_delete() {
    let slice = todo_slice_with_ids(fixed_id).expect("valid slice");
    let actions = TodoActions::from_slice(&slice).expect("typed actions");
    let keys = TodoKeys::new();
    let mut runtime = slice.init(None);

    runtime.dispatcher.dispatch(actions.add.create(()));
    runtime.dispatcher.dispatch(actions.complete_later.create(CompleteLater {
        id: ITEM_KEY.to_string(),
        delay: Duration::from_secs(1),
    }));
    runtime.dispatcher.dispatch(actions.delete.create(ITEM_KEY.to_string()));

    runtime.dispatcher.settled().await;
    assert!(!runtime.store.has(&keys.item(ITEM_KEY)));
    assert!(todos(&runtime.store, &keys).is_empty());
    assert!(runtime.events.drain().iter().all(|e| !e.is_error()));
}

#[tokio::test]
async fn test_delayed_completion_harness() {
    let keys = TodoKeys::new();
    let emitted = HandlerHarness::new()
        .setup([StoreUpdate::set(&keys.item("1"), TodoItem::new("1"))])
        .run(
            &complete_item_later(keys.clone()),
            CompleteLater {
                id: "1".to_string(),
                delay: Duration::from_millis(1),
            },
        )
        .await
        .expect("completion runs");
    assert_emissions(
        &emitted,
        &[StoreUpdate::set(
            &keys.item("1"),
            TodoItem {
                completed: true,
                ..TodoItem::new("1")
            },
        )
        .into()],
    );
}
