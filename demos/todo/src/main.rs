//! Todo demo
//!
//! Runs a short scripted session against the todo slice and logs every
//! dispatcher event. Pass a RON config path as the first argument to
//! override the defaults (see `config/todo.ron`).

use futures::StreamExt;
use std::time::Duration;
use tether_core::{Event, SetValue};
use tether_slice::init_slice_with_config;
use todo::config::TodoConfig;
use todo::{todo_slice, todos, CompleteLater, TodoActions, TodoKeys};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => TodoConfig::load(&path)?,
        None => TodoConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or("info"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let slice = todo_slice()?;
    let actions = TodoActions::from_slice(&slice)?;
    let keys = TodoKeys::new();
    let runtime = init_slice_with_config(&[&slice], None, config.dispatcher.clone());
    let dispatcher = runtime.dispatcher;
    let store = runtime.store;
    let mut events = runtime.events;

    let logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Event::Action(action) => {
                    tracing::info!(action = %action.kind(), depth = action.trace().len(), "action")
                }
                Event::Updates(updates) => {
                    for update in updates {
                        tracing::info!(key = %update.key(), set = update.is_set(), "update");
                    }
                }
                Event::Error(err) => tracing::error!(error = %err, "error"),
            }
        }
    });

    for text in ["buy milk", "walk the dog"] {
        dispatcher.dispatch(actions.set.create(SetValue::new(keys.text.clone(), text.to_string())));
        dispatcher.dispatch(actions.add.create(()));
    }

    let ids = store.get(&keys.list).unwrap_or_default();
    if let [first, second, ..] = ids.as_slice() {
        dispatcher.dispatch(actions.complete.create(first.clone()));

        let delay = Duration::from_millis(config.complete_after_ms);
        dispatcher.dispatch(actions.complete_later.create(CompleteLater {
            id: second.clone(),
            delay,
        }));
        dispatcher.dispatch(actions.complete_later.create(CompleteLater {
            id: first.clone(),
            delay,
        }));
        dispatcher.dispatch(actions.delete.create(first.clone()));
    }

    dispatcher.settled().await;
    for todo in todos(&store, &keys) {
        tracing::info!(
            id = %todo.key,
            description = %todo.description,
            completed = todo.completed,
            "todo"
        );
    }

    drop(dispatcher);
    logger.await?;
    Ok(())
}
