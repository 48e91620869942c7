use crate::handler::{HandlerMethod, Subscriber};
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, Weak};

/// One registered handler: the method to call and a weak reference to the
/// instance it is bound to.
///
/// A subscription without a subscriber belongs to a free function and never
/// dies. One with a subscriber is dead once that subscriber has been dropped.
pub struct Subscription<A: ?Sized> {
    subscriber: Option<Weak<Subscriber>>,
    handler: HandlerMethod<A>,
}

impl<A: ?Sized> Subscription<A> {
    /// Create new `Subscription`. The handler is mandatory.
    pub fn new(subscriber: Option<Weak<Subscriber>>, handler: Option<HandlerMethod<A>>) -> Result<Self> {
        let handler = handler.ok_or(Error::ArgumentNull("handler"))?;
        Ok(Subscription { subscriber, handler })
    }

    pub fn subscriber(&self) -> Option<&Weak<Subscriber>> {
        self.subscriber.as_ref()
    }

    pub fn handler(&self) -> &HandlerMethod<A> {
        &self.handler
    }

    /// The current target of the weak reference, if it is still alive.
    pub fn target(&self) -> Option<Arc<Subscriber>> {
        self.subscriber.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_static(&self) -> bool {
        self.subscriber.is_none()
    }

    pub fn is_alive(&self) -> bool {
        match &self.subscriber {
            None => true,
            Some(subscriber) => subscriber.strong_count() > 0,
        }
    }
}

impl<A: ?Sized> fmt::Debug for Subscription<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("static", &self.is_static())
            .field("alive", &self.is_alive())
            .field("handler", &self.handler.name())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subscription_requires_handler_test() {
        let err = Subscription::<()>::new(None, None).unwrap_err();
        assert!(matches!(err, Error::ArgumentNull("handler")));
    }

    #[test]
    fn subscription_liveness_test() {
        let handler = HandlerMethod::<()>::from_fn_action("noop", || Ok(()));
        let owner: Arc<Subscriber> = Arc::new(5u32);

        let bound = Subscription::new(Some(Arc::downgrade(&owner)), Some(handler.clone())).unwrap();
        let unbound = Subscription::new(None, Some(handler)).unwrap();

        assert!(bound.is_alive());
        assert!(bound.target().is_some());
        assert!(unbound.is_static());

        drop(owner);

        assert!(!bound.is_alive());
        assert!(bound.target().is_none());
        assert!(unbound.is_alive());
    }
}
