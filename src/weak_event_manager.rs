//!
//! # Weak Event Manager
//!
//! An owner exposes events by keeping a `WeakEventManager` in a field and
//! forwarding subscription calls to it. Subscribers are held weakly, so
//! subscribing to an event never keeps the subscriber alive; a dropped
//! subscriber is pruned the next time the event is raised.
//!
//! ```rust
//! use async_best_practices::{EventArgs, EventHandler, HandlerMethod, WeakEventManager};
//! use std::sync::Arc;
//!
//! struct Label;
//!
//! let manager = WeakEventManager::<EventArgs>::new();
//! let label = Arc::new(Label);
//! let handler = EventHandler::new(
//!     &label,
//!     HandlerMethod::from_method("on_changed", |_: &Label, _sender, _args: &EventArgs| Ok(())),
//! );
//!
//! manager.add_event_handler(&handler, "Changed").unwrap();
//! manager.raise_event(None, &EventArgs::EMPTY, "Changed").unwrap();
//! ```
//!
//! The manager is generic over the event-args type. `WeakEventManager` with
//! no type argument carries type-erased args (`dyn Any + Send + Sync`) and
//! handlers downcast them themselves.
//!
use crate::event_registry::{self, EventRegistry};
use crate::handler::{Arguments, EventHandler};
use crate::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Type-erased event args, used by the untyped manager.
pub type AnyEventArgs = dyn Any + Send + Sync;

/// Event args for events that carry no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventArgs;

impl EventArgs {
    pub const EMPTY: EventArgs = EventArgs;
}

/// Owns the subscriptions of every event exposed by one object.
pub struct WeakEventManager<A: ?Sized = AnyEventArgs> {
    registry: Mutex<EventRegistry<A>>,
}

impl<A: ?Sized> Default for WeakEventManager<A> {
    fn default() -> Self {
        WeakEventManager {
            registry: Mutex::new(EventRegistry::new()),
        }
    }
}

impl<A: ?Sized> WeakEventManager<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `event_name`.
    ///
    /// Fails with [`Error::Argument`] if `event_name` is blank and with
    /// [`Error::ArgumentNull`] if `handler` is `None`, in that order.
    pub fn add_event_handler<'h>(
        &self,
        handler: impl Into<Option<&'h EventHandler<A>>>,
        event_name: &str,
    ) -> Result<()>
    where
        A: 'h,
    {
        let handler = validate(handler.into(), event_name)?;
        let mut registry = self.lock()?;
        event_registry::add_event_handler(event_name, handler.target(), handler.method(), &mut registry)
    }

    /// Unsubscribe `handler` from `event_name`.
    ///
    /// Removes the most recent subscription bound to the same instance with a
    /// handler method of the same name. Does nothing if there is none.
    pub fn remove_event_handler<'h>(
        &self,
        handler: impl Into<Option<&'h EventHandler<A>>>,
        event_name: &str,
    ) -> Result<()>
    where
        A: 'h,
    {
        let handler = validate(handler.into(), event_name)?;
        let mut registry = self.lock()?;
        event_registry::remove_event_handler(event_name, handler.target(), handler.method(), &mut registry);
        Ok(())
    }

    /// Raise `event_name`, calling each handler with `(sender, args)`.
    pub fn raise_event(&self, sender: Option<&dyn Any>, args: &A, event_name: &str) -> Result<()> {
        event_registry::handle_event(event_name, Arguments::SenderArgs(sender, args), &self.registry)
    }

    /// Raise `event_name`, calling each handler with `(args)`.
    pub fn raise_event_with_args(&self, args: &A, event_name: &str) -> Result<()> {
        event_registry::handle_event(event_name, Arguments::Args(args), &self.registry)
    }

    /// Raise `event_name`, calling each handler with no arguments.
    pub fn raise_event_without_args(&self, event_name: &str) -> Result<()> {
        event_registry::handle_event(event_name, Arguments::Empty, &self.registry)
    }

    /// Number of stored subscriptions for `event_name`, dead ones included
    /// until the next raise prunes them.
    pub fn subscription_count(&self, event_name: &str) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)
            .map_or(0, Vec::len)
    }

    /// A view of a single event, for owners that expose events by name.
    pub fn event(&self, event_name: &'static str) -> EventAccessor<'_, A> {
        EventAccessor {
            manager: self,
            event_name,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EventRegistry<A>>> {
        self.registry
            .lock()
            .map_err(|_| Error::LockPoisoned("event registry"))
    }
}

impl<A: ?Sized> fmt::Debug for WeakEventManager<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = match self.registry.lock() {
            Ok(registry) => registry.len(),
            Err(_) => 0,
        };
        f.debug_struct("WeakEventManager").field("events", &events).finish()
    }
}

fn validate<'h, A: ?Sized>(handler: Option<&'h EventHandler<A>>, event_name: &str) -> Result<&'h EventHandler<A>> {
    if event_name.trim().is_empty() {
        return Err(Error::Argument("event_name"));
    }
    handler.ok_or(Error::ArgumentNull("handler"))
}

/// One named event of a [`WeakEventManager`].
///
/// Usually obtained through an accessor generated by [`weak_event!`](crate::weak_event).
pub struct EventAccessor<'m, A: ?Sized> {
    manager: &'m WeakEventManager<A>,
    event_name: &'static str,
}

impl<'m, A: ?Sized> EventAccessor<'m, A> {
    pub fn name(&self) -> &'static str {
        self.event_name
    }

    pub fn add(&self, handler: &EventHandler<A>) -> Result<()> {
        self.manager.add_event_handler(handler, self.event_name)
    }

    pub fn remove(&self, handler: &EventHandler<A>) -> Result<()> {
        self.manager.remove_event_handler(handler, self.event_name)
    }

    pub fn raise(&self, sender: Option<&dyn Any>, args: &A) -> Result<()> {
        self.manager.raise_event(sender, args, self.event_name)
    }

    pub fn raise_with_args(&self, args: &A) -> Result<()> {
        self.manager.raise_event_with_args(args, self.event_name)
    }

    pub fn raise_without_args(&self) -> Result<()> {
        self.manager.raise_event_without_args(self.event_name)
    }

    pub fn subscription_count(&self) -> usize {
        self.manager.subscription_count(self.event_name)
    }
}

///
/// Generates an accessor method exposing one event of a manager field, named
/// after the accessor itself.
///
/// usage:
/// ```rust
/// use async_best_practices::{weak_event, EventArgs, WeakEventManager};
///
/// struct Editor {
///     events: WeakEventManager<EventArgs>,
/// }
///
/// impl Editor {
///     weak_event!(pub fn text_changed(events) -> EventArgs);
/// }
///
/// let editor = Editor { events: WeakEventManager::new() };
/// assert_eq!(editor.text_changed().name(), "text_changed");
/// ```
///
#[macro_export]
macro_rules! weak_event {
    ($(#[$meta:meta])* $vis:vis fn $event:ident($manager:ident) -> $args:ty) => {
        $(#[$meta])*
        $vis fn $event(&self) -> $crate::weak_event_manager::EventAccessor<'_, $args> {
            self.$manager.event(stringify!($event))
        }
    };
}
