//!
//! Registry operations shared by every weak event manager.
//!
//! The registry maps an event name to the subscriptions for it, in the order
//! they were added. Nothing here is synchronized; callers own the locking.
//! [`handle_event`] is the one exception: it takes the lock itself so that it
//! can release it before any handler runs.
//!
use crate::handler::{same_target, Arguments, HandlerMethod, Subscriber};
use crate::subscription::Subscription;
use crate::{Error, Result};
use ahash::AHashMap;
use std::sync::{Arc, Mutex};
use tracing::{event, Level};

/// Event name -> subscriptions, in subscription order.
pub type EventRegistry<A> = AHashMap<String, Vec<Subscription<A>>>;

/// A handler that survived pruning, with its target already resolved.
pub type LiveHandler<A> = (Option<Arc<Subscriber>>, HandlerMethod<A>);

/// Append a subscription for `handler` to `event_name`.
///
/// Duplicates are kept: adding the same handler twice makes it fire twice.
pub fn add_event_handler<A: ?Sized>(
    event_name: &str,
    subscriber: Option<&Arc<Subscriber>>,
    handler: &HandlerMethod<A>,
    registry: &mut EventRegistry<A>,
) -> Result<()> {
    let weak_subscriber = subscriber.map(Arc::downgrade);
    let subscription = Subscription::new(weak_subscriber, Some(handler.clone()))?;

    registry
        .entry(event_name.to_string())
        .or_insert_with(Vec::new)
        .push(subscription);

    event!(
        Level::TRACE,
        "subscribed {} to {} (static: {})",
        handler.name(),
        event_name,
        subscriber.is_none()
    );
    Ok(())
}

/// Remove the most recently added subscription to `event_name` whose current
/// target is `subscriber` and whose handler has the same method name.
///
/// At most one subscription is removed. Returns whether one was.
pub fn remove_event_handler<A: ?Sized>(
    event_name: &str,
    subscriber: Option<&Arc<Subscriber>>,
    handler: &HandlerMethod<A>,
    registry: &mut EventRegistry<A>,
) -> bool {
    let subscriptions = match registry.get_mut(event_name) {
        Some(subscriptions) => subscriptions,
        None => return false,
    };

    let position = subscriptions.iter().rposition(|subscription| {
        let target = subscription.target();
        same_target(target.as_ref(), subscriber) && subscription.handler().name() == handler.name()
    });

    match position {
        Some(index) => {
            subscriptions.remove(index);
            event!(Level::TRACE, "unsubscribed {} from {}", handler.name(), event_name);
            true
        }
        None => false,
    }
}

/// Drop dead subscriptions for `event_name` and return the live ones, in
/// order, with their targets resolved.
///
/// Resolving the targets here keeps every returned subscriber alive until its
/// handler has been invoked.
pub fn collect_live_handlers<A: ?Sized>(event_name: &str, registry: &mut EventRegistry<A>) -> Vec<LiveHandler<A>> {
    let subscriptions = match registry.get_mut(event_name) {
        Some(subscriptions) => subscriptions,
        None => return vec![],
    };

    let mut live = Vec::with_capacity(subscriptions.len());
    let before = subscriptions.len();

    subscriptions.retain(|subscription| {
        if subscription.is_static() {
            live.push((None, subscription.handler().clone()));
            return true;
        }
        match subscription.target() {
            Some(target) => {
                live.push((Some(target), subscription.handler().clone()));
                true
            }
            None => false,
        }
    });

    let pruned = before - subscriptions.len();
    if pruned > 0 {
        event!(Level::DEBUG, "pruned {} dead subscription(s) from {}", pruned, event_name);
    }

    live
}

/// Invoke `handlers` in order with `arguments`.
///
/// Stops at the first failure. A handler whose signature does not fit the
/// argument list yields [`Error::InvalidHandleEvent`]; any other error is
/// returned as is.
pub fn invoke_handlers<A: ?Sized>(event_name: &str, handlers: &[LiveHandler<A>], arguments: Arguments<'_, A>) -> Result<()> {
    for (target, method) in handlers {
        match method.invoke(target.as_deref(), arguments) {
            Ok(()) => {}
            Err(mismatch @ Error::ParameterCountMismatch { .. }) => {
                event!(
                    Level::DEBUG,
                    "{} cannot be raised on {} with {} argument(s)",
                    method.name(),
                    event_name,
                    arguments.len()
                );
                return Err(Error::InvalidHandleEvent {
                    message: invalid_handle_event_message(method),
                    source: Box::new(mismatch),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Raise `event_name` on `registry`.
///
/// The lock is held while dead subscriptions are pruned and the live ones
/// collected, and released before the first handler runs.
pub fn handle_event<A: ?Sized>(
    event_name: &str,
    arguments: Arguments<'_, A>,
    registry: &Mutex<EventRegistry<A>>,
) -> Result<()> {
    let handlers = {
        let mut registry = registry
            .lock()
            .map_err(|_| Error::LockPoisoned("event registry"))?;
        collect_live_handlers(event_name, &mut registry)
    };

    if handlers.is_empty() {
        return Ok(());
    }

    event!(
        Level::TRACE,
        "raising {} to {} handler(s) with {} argument(s)",
        event_name,
        handlers.len(),
        arguments.len()
    );
    invoke_handlers(event_name, &handlers, arguments)
}

fn invalid_handle_event_message<A: ?Sized>(method: &HandlerMethod<A>) -> String {
    let signature = method.signature();
    format!(
        "Parameter count mismatch. `{}` takes {} parameter(s); raise it with `{}` instead.",
        method.name(),
        signature.parameter_count(),
        signature.raise_call()
    )
}
