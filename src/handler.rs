//!
//! Late-bound event handlers.
//!
//! A [`HandlerMethod`] is the type-erased "method" half of a delegate: a name,
//! the type it was declared on, its parameter signature, and a callable that
//! receives the (optional) subscriber instance plus the raised arguments. An
//! [`EventHandler`] pairs a method with the instance it is bound to.
//!
//! Handlers come in three signatures, mirroring the three ways an event can
//! be raised:
//!
//! ```text
//! SenderArgs    (sender, args)    raise_event(sender, args, name)
//! Args          (args)            raise_event_with_args(args, name)
//! NoArgs        ()                raise_event_without_args(name)
//! ```
//!
use crate::{Error, HandlerResult, Result};
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Any object that can subscribe to an event.
pub type Subscriber = dyn Any + Send + Sync;

type SenderArgsFn<A> = dyn Fn(Option<&Subscriber>, Option<&dyn Any>, &A) -> Result<()> + Send + Sync;
type ArgsFn<A> = dyn Fn(Option<&Subscriber>, &A) -> Result<()> + Send + Sync;
type NoArgsFn = dyn Fn(Option<&Subscriber>) -> Result<()> + Send + Sync;

/// The parameter list a handler was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerSignature {
    /// `()`
    NoArgs,
    /// `(args)`
    Args,
    /// `(sender, args)`
    SenderArgs,
}

impl HandlerSignature {
    pub fn parameter_count(&self) -> usize {
        match self {
            HandlerSignature::NoArgs => 0,
            HandlerSignature::Args => 1,
            HandlerSignature::SenderArgs => 2,
        }
    }

    /// The raise call whose argument list fits this signature.
    pub fn raise_call(&self) -> &'static str {
        match self {
            HandlerSignature::NoArgs => "raise_event_without_args(event_name)",
            HandlerSignature::Args => "raise_event_with_args(args, event_name)",
            HandlerSignature::SenderArgs => "raise_event(sender, args, event_name)",
        }
    }
}

/// The argument list of a single raise call.
pub enum Arguments<'a, A: ?Sized> {
    Empty,
    Args(&'a A),
    SenderArgs(Option<&'a dyn Any>, &'a A),
}

impl<'a, A: ?Sized> Arguments<'a, A> {
    pub fn len(&self) -> usize {
        self.signature().parameter_count()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Arguments::Empty)
    }

    /// The handler signature these arguments can be applied to.
    pub fn signature(&self) -> HandlerSignature {
        match self {
            Arguments::Empty => HandlerSignature::NoArgs,
            Arguments::Args(_) => HandlerSignature::Args,
            Arguments::SenderArgs(_, _) => HandlerSignature::SenderArgs,
        }
    }
}

impl<'a, A: ?Sized> Clone for Arguments<'a, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, A: ?Sized> Copy for Arguments<'a, A> {}

enum Callable<A: ?Sized> {
    NoArgs(Arc<NoArgsFn>),
    Args(Arc<ArgsFn<A>>),
    SenderArgs(Arc<SenderArgsFn<A>>),
}

impl<A: ?Sized> Clone for Callable<A> {
    fn clone(&self) -> Self {
        match self {
            Callable::NoArgs(f) => Callable::NoArgs(f.clone()),
            Callable::Args(f) => Callable::Args(f.clone()),
            Callable::SenderArgs(f) => Callable::SenderArgs(f.clone()),
        }
    }
}

// These pin the closure signatures so the higher-ranked lifetimes are inferred.
fn no_args_fn<F>(f: F) -> Arc<NoArgsFn>
where
    F: Fn(Option<&Subscriber>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn args_fn<A, F>(f: F) -> Arc<ArgsFn<A>>
where
    A: ?Sized + 'static,
    F: Fn(Option<&Subscriber>, &A) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn sender_args_fn<A, F>(f: F) -> Arc<SenderArgsFn<A>>
where
    A: ?Sized + 'static,
    F: Fn(Option<&Subscriber>, Option<&dyn Any>, &A) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn downcast_target<'t, S: Any>(target: Option<&'t Subscriber>, method: &str) -> Result<&'t S> {
    target
        .and_then(|subscriber| subscriber.downcast_ref::<S>())
        .ok_or_else(|| Error::TargetMismatch {
            method: method.to_string(),
            declaring_type: type_name::<S>(),
        })
}

/// A named, late-bound handler method.
///
/// Instance methods (`from_method*`) are invoked with the subscriber they were
/// bound to; free functions (`from_fn*`) ignore the subscriber entirely.
/// Cloning is cheap and shares the callable.
pub struct HandlerMethod<A: ?Sized> {
    name: Cow<'static, str>,
    declaring_type: Option<&'static str>,
    callable: Callable<A>,
}

impl<A: ?Sized> Clone for HandlerMethod<A> {
    fn clone(&self) -> Self {
        HandlerMethod {
            name: self.name.clone(),
            declaring_type: self.declaring_type,
            callable: self.callable.clone(),
        }
    }
}

impl<A: ?Sized + 'static> HandlerMethod<A> {
    /// A free function taking `(sender, args)`.
    pub fn from_fn<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Option<&dyn Any>, &A) -> HandlerResult + Send + Sync + 'static,
    {
        HandlerMethod {
            name: name.into(),
            declaring_type: None,
            callable: Callable::SenderArgs(sender_args_fn(move |_, sender, args: &A| {
                f(sender, args).map_err(Error::Handler)
            })),
        }
    }

    /// A free function taking `(args)`.
    pub fn from_fn_args<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&A) -> HandlerResult + Send + Sync + 'static,
    {
        HandlerMethod {
            name: name.into(),
            declaring_type: None,
            callable: Callable::Args(args_fn(move |_, args: &A| f(args).map_err(Error::Handler))),
        }
    }

    /// A free function taking no arguments.
    pub fn from_fn_action<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        HandlerMethod {
            name: name.into(),
            declaring_type: None,
            callable: Callable::NoArgs(no_args_fn(move |_| f().map_err(Error::Handler))),
        }
    }

    /// A method of `S` taking `(sender, args)`.
    pub fn from_method<S, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        S: Any + Send + Sync,
        F: Fn(&S, Option<&dyn Any>, &A) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        HandlerMethod {
            name,
            declaring_type: Some(type_name::<S>()),
            callable: Callable::SenderArgs(sender_args_fn(move |target, sender, args: &A| {
                let subscriber = downcast_target::<S>(target, &method)?;
                f(subscriber, sender, args).map_err(Error::Handler)
            })),
        }
    }

    /// A method of `S` taking `(args)`.
    pub fn from_method_args<S, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        S: Any + Send + Sync,
        F: Fn(&S, &A) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        HandlerMethod {
            name,
            declaring_type: Some(type_name::<S>()),
            callable: Callable::Args(args_fn(move |target, args: &A| {
                let subscriber = downcast_target::<S>(target, &method)?;
                f(subscriber, args).map_err(Error::Handler)
            })),
        }
    }

    /// A method of `S` taking no arguments.
    pub fn from_method_action<S, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        S: Any + Send + Sync,
        F: Fn(&S) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        HandlerMethod {
            name,
            declaring_type: Some(type_name::<S>()),
            callable: Callable::NoArgs(no_args_fn(move |target| {
                let subscriber = downcast_target::<S>(target, &method)?;
                f(subscriber).map_err(Error::Handler)
            })),
        }
    }
}

impl<A: ?Sized> HandlerMethod<A> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type an instance method was declared on; `None` for free functions.
    pub fn declaring_type(&self) -> Option<&'static str> {
        self.declaring_type
    }

    pub fn is_static(&self) -> bool {
        self.declaring_type.is_none()
    }

    pub fn signature(&self) -> HandlerSignature {
        match self.callable {
            Callable::NoArgs(_) => HandlerSignature::NoArgs,
            Callable::Args(_) => HandlerSignature::Args,
            Callable::SenderArgs(_) => HandlerSignature::SenderArgs,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.signature().parameter_count()
    }

    /// Invoke the method on `target` with `arguments`.
    ///
    /// Fails with [`Error::ParameterCountMismatch`] when the argument list does
    /// not fit the declared signature; the callable is not entered in that case.
    pub fn invoke(&self, target: Option<&Subscriber>, arguments: Arguments<'_, A>) -> Result<()> {
        match (&self.callable, arguments) {
            (Callable::NoArgs(f), Arguments::Empty) => f(target),
            (Callable::Args(f), Arguments::Args(args)) => f(target, args),
            (Callable::SenderArgs(f), Arguments::SenderArgs(sender, args)) => f(target, sender, args),
            (_, arguments) => Err(Error::ParameterCountMismatch {
                method: self.name.to_string(),
                expected: self.parameter_count(),
                actual: arguments.len(),
            }),
        }
    }
}

impl<A: ?Sized> fmt::Debug for HandlerMethod<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("signature", &self.signature())
            .finish()
    }
}

/// A handler method together with the instance it is bound to.
///
/// This is what callers hand to a weak event manager. The handler holds a
/// strong reference to its target only for as long as the caller keeps the
/// `EventHandler` itself; the manager stores a weak one.
pub struct EventHandler<A: ?Sized> {
    target: Option<Arc<Subscriber>>,
    method: HandlerMethod<A>,
}

impl<A: ?Sized> Clone for EventHandler<A> {
    fn clone(&self) -> Self {
        EventHandler {
            target: self.target.clone(),
            method: self.method.clone(),
        }
    }
}

impl<A: ?Sized> EventHandler<A> {
    /// Bind `method` to `target`.
    pub fn new<S: Any + Send + Sync>(target: &Arc<S>, method: HandlerMethod<A>) -> Self {
        let target: Arc<Subscriber> = target.clone();
        EventHandler {
            target: Some(target),
            method,
        }
    }

    /// A handler with no bound instance.
    pub fn from_static(method: HandlerMethod<A>) -> Self {
        EventHandler {
            target: None,
            method,
        }
    }

    pub fn target(&self) -> Option<&Arc<Subscriber>> {
        self.target.as_ref()
    }

    pub fn method(&self) -> &HandlerMethod<A> {
        &self.method
    }

    /// Invoke the handler directly, without going through a manager.
    pub fn invoke(&self, arguments: Arguments<'_, A>) -> Result<()> {
        self.method.invoke(self.target.as_deref(), arguments)
    }
}

impl<A: ?Sized> fmt::Debug for EventHandler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("bound", &self.target.is_some())
            .field("method", &self.method)
            .finish()
    }
}

/// Whether two optional subscribers refer to the same instance.
pub(crate) fn same_target(a: Option<&Arc<Subscriber>>, b: Option<&Arc<Subscriber>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        _ => false,
    }
}
