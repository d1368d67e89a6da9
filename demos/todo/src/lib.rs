//! Todo list built on a tether slice
//!
//! Keys:
//! - `todoText`: the text being typed
//! - `todoList`: item ids, in insertion order
//! - `todoItem/<id>`: one item per id
//!
//! Actions: `set`, `addTodoItem`, `completeTodoItem`, `delTodoItem` and
//! `completeTodoItemLater`, which completes an item after a delay unless the
//! item changes first.

pub mod config;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::{
    handler, set_value, ActionHandler, ActionType, Effect, HandlerContext, KeyPath, SetValue,
    Store, StoreKey, StoreUpdate,
};
use tether_slice::{actions, branch, custom, init, param, Slice, SliceDef, SliceError};

pub const TODO_TEXT: &str = "todoText";
pub const TODO_LIST: &str = "todoList";
pub const TODO_ITEM: &str = "todoItem";

/// A todo entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub key: String,
    pub description: String,
    pub completed: bool,
}

impl TodoItem {
    /// An empty, open item
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            completed: false,
        }
    }
}

/// Payload of `completeTodoItemLater`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteLater {
    pub id: String,
    pub delay: Duration,
}

/// Typed keys of the todo slice
#[derive(Debug, Clone)]
pub struct TodoKeys {
    pub text: StoreKey<String>,
    pub list: StoreKey<Vec<String>>,
}

impl TodoKeys {
    pub fn new() -> Self {
        Self {
            text: StoreKey::new(TODO_TEXT),
            list: StoreKey::new(TODO_LIST),
        }
    }

    /// Key of one item
    pub fn item(&self, id: &str) -> StoreKey<TodoItem> {
        StoreKey::new(KeyPath::new(TODO_ITEM).join(id))
    }
}

impl Default for TodoKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed action descriptors of the todo slice
#[derive(Debug, Clone)]
pub struct TodoActions {
    pub set: ActionType<SetValue<String>>,
    pub add: ActionType<()>,
    pub complete: ActionType<String>,
    pub delete: ActionType<String>,
    pub complete_later: ActionType<CompleteLater>,
}

impl TodoActions {
    /// Resolve every descriptor from the slice
    pub fn from_slice(slice: &Slice) -> Result<Self, SliceError> {
        let actions = slice.actions();
        Ok(Self {
            set: actions.action_type("set")?,
            add: actions.action_type("addTodoItem")?,
            complete: actions.action_type("completeTodoItem")?,
            delete: actions.action_type("delTodoItem")?,
            complete_later: actions.action_type("completeTodoItemLater")?,
        })
    }
}

/// Create the todo slice with random item ids
pub fn todo_slice() -> Result<Slice, SliceError> {
    todo_slice_with_ids(|| uuid::Uuid::new_v4().to_string())
}

/// Create the todo slice with a custom id source
pub fn todo_slice_with_ids<F>(new_id: F) -> Result<Slice, SliceError>
where
    F: Fn() -> String + Send + Sync + 'static,
{
    let keys = TodoKeys::new();
    Slice::create(SliceDef {
        keys: branch([
            (TODO_TEXT, init(String::new())),
            (TODO_LIST, init(Vec::<String>::new())),
            (TODO_ITEM, param(|id| init(TodoItem::new(id)))),
        ]),
        actions: actions([
            ("set", custom::<SetValue<String>>(set_value::<String>())),
            ("addTodoItem", custom::<()>(add_item(keys.clone(), new_id))),
            ("completeTodoItem", custom::<String>(complete_item(keys.clone()))),
            ("delTodoItem", custom::<String>(delete_item(keys.clone()))),
            (
                "completeTodoItemLater",
                custom::<CompleteLater>(complete_item_later(keys)),
            ),
        ]),
    })
}

/// Turn the current text into a new item and clear the text
pub fn add_item<F>(keys: TodoKeys, new_id: F) -> impl ActionHandler
where
    F: Fn() -> String + Send + Sync + 'static,
{
    handler(move |ctx: HandlerContext, _: ()| {
        let id = new_id();
        let description = ctx.get(&keys.text).unwrap_or_default();
        ctx.set(
            &keys.item(&id),
            TodoItem {
                key: id.clone(),
                description,
                completed: false,
            },
        );
        let mut list = ctx.get(&keys.list).unwrap_or_default();
        list.push(id);
        ctx.set(&keys.list, list);
        ctx.set(&keys.text, String::new());
    })
}

/// Toggle an item's completion; unknown ids are ignored
pub fn complete_item(keys: TodoKeys) -> impl ActionHandler {
    handler(move |ctx: HandlerContext, id: String| {
        let key = keys.item(&id);
        ctx.get(&key).map(|todo| {
            StoreUpdate::set(
                &key,
                TodoItem {
                    completed: !todo.completed,
                    ..todo
                },
            )
        })
    })
}

/// Remove an item and its id from the list
pub fn delete_item(keys: TodoKeys) -> impl ActionHandler {
    handler(move |ctx: HandlerContext, id: String| {
        ctx.del(&keys.item(&id));
        let list: Vec<String> = ctx
            .get(&keys.list)
            .unwrap_or_default()
            .into_iter()
            .filter(|item| item != &id)
            .collect();
        ctx.set(&keys.list, list);
    })
}

/// Mark an item completed after a delay, unless it changes or is deleted
/// in the meantime
pub fn complete_item_later(keys: TodoKeys) -> impl ActionHandler {
    handler(move |ctx: HandlerContext, request: CompleteLater| {
        let key = keys.item(&request.id);
        ctx.cancel_if_changed(&[&key]);
        Effect::deferred(async move {
            tokio::time::sleep(request.delay).await;
            if ctx.is_cancelled() {
                tracing::debug!(id = %request.id, "completion cancelled");
                return None;
            }
            ctx.get(&key).map(|todo| {
                StoreUpdate::set(
                    &key,
                    TodoItem {
                        completed: true,
                        ..todo
                    },
                )
            })
        })
    })
}

/// Items in list order, skipping ids without an item
pub fn todos(store: &Store, keys: &TodoKeys) -> Vec<TodoItem> {
    store
        .get(&keys.list)
        .unwrap_or_default()
        .iter()
        .filter_map(|id| store.get(&keys.item(id)))
        .collect()
}
