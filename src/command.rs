//!
//! # Async Commands
//!
//! Commands are what a data-binding layer invokes when the user acts: a
//! button asks `can_execute` to decide whether it is enabled, calls
//! `execute` when pressed, and listens to `can_execute_changed` to know
//! when to ask again.
//!
//! [`AsyncCommand`] runs an async action. `execute` starts it
//! fire-and-forget, routing failures to the command's `on_exception`;
//! `execute_async` hands the future back to callers that want to await it.
//! Its `can_execute_changed` event lives on a [`WeakEventManager`], so a
//! view that subscribes to a long-lived command does not leak.
//!
use crate::fire_and_forget::{FireAndForget, FireAndForgetSettings};
use crate::handler::EventHandler;
use crate::weak_event_manager::{EventAccessor, EventArgs, WeakEventManager};
use crate::{Error, HandlerError, Result};
use futures::future::BoxFuture;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{event, Level};

/// The untyped command surface a data-binding layer talks to.
pub trait Command: Send + Sync {
    /// Whether the command can run with `parameter` right now.
    fn can_execute(&self, parameter: Option<&dyn Any>) -> Result<bool>;

    /// Start the command without waiting for it.
    fn execute(&self, parameter: Option<Box<dyn Any + Send>>) -> Result<()>;

    fn can_execute_changed(&self) -> EventAccessor<'_, EventArgs>;

    /// Tell subscribers to call `can_execute` again.
    fn raise_can_execute_changed(&self) -> Result<()>;
}

type ExecuteFn<T> = dyn Fn(T) -> BoxFuture<'static, std::result::Result<(), HandlerError>> + Send + Sync;
type CanExecuteFn<T> = dyn Fn(&T) -> bool + Send + Sync;
type OnExceptionFn = dyn Fn(HandlerError) + Send + Sync;

struct CommandInner<T> {
    execute: Box<ExecuteFn<T>>,
    can_execute: Box<CanExecuteFn<T>>,
    on_exception: Option<Arc<OnExceptionFn>>,
    continue_on_captured_context: bool,
    allows_multiple_executions: bool,
    settings: Option<FireAndForgetSettings>,
    execution_count: AtomicUsize,
    weak_event_manager: WeakEventManager<EventArgs>,
}

/// A command running an async action with a parameter of type `T`.
///
/// Cloning yields another handle to the same command.
pub struct AsyncCommand<T = ()> {
    inner: Arc<CommandInner<T>>,
}

impl<T> Clone for AsyncCommand<T> {
    fn clone(&self) -> Self {
        AsyncCommand {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> AsyncCommand<T> {
    /// A command that can always execute.
    pub fn new<F, Fut, E>(execute: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        Self::builder(execute).build()
    }

    pub fn builder<F, Fut, E>(execute: F) -> AsyncCommandBuilder<T>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        AsyncCommandBuilder::new(execute)
    }

    /// Whether the command can run with `parameter` right now.
    ///
    /// A command that disallows multiple executions cannot run while it is
    /// already running.
    pub fn can_execute_with(&self, parameter: &T) -> bool {
        (self.inner.allows_multiple_executions || !self.is_executing()) && (self.inner.can_execute)(parameter)
    }

    /// Run the command and wait for it.
    pub async fn execute_async(&self, parameter: T) -> std::result::Result<(), HandlerError> {
        if let Err(err) = self.begin_execution() {
            let _ = self.end_execution();
            return Err(err.into());
        }
        let result = (self.inner.execute)(parameter).await;
        let finished = self.end_execution();
        result?;
        finished?;
        Ok(())
    }

    /// Start the command without waiting for it.
    pub fn execute_with(&self, parameter: T) {
        let command = self.clone();
        let mut task = FireAndForget::new(async move { command.execute_async(parameter).await })
            .continue_on_captured_context(self.inner.continue_on_captured_context);
        if let Some(on_exception) = self.inner.on_exception.clone() {
            task = task.on_exception(move |err| on_exception(err));
        }
        if let Some(settings) = self.inner.settings.clone() {
            task = task.with_settings(settings);
        }
        task.spawn();
    }

    pub fn is_executing(&self) -> bool {
        self.inner.execution_count.load(Ordering::SeqCst) > 0
    }

    pub fn allows_multiple_executions(&self) -> bool {
        self.inner.allows_multiple_executions
    }

    fn begin_execution(&self) -> Result<()> {
        let previous = self.inner.execution_count.fetch_add(1, Ordering::SeqCst);
        if previous == 0 && !self.inner.allows_multiple_executions {
            self.raise_can_execute_changed()?;
        }
        Ok(())
    }

    fn end_execution(&self) -> Result<()> {
        let previous = self.inner.execution_count.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && !self.inner.allows_multiple_executions {
            self.raise_can_execute_changed()?;
        }
        Ok(())
    }

    fn downcast_parameter(&self, parameter: Option<Box<dyn Any + Send>>) -> Result<T> {
        let parameter: Box<dyn Any + Send> = match parameter {
            Some(parameter) => parameter,
            None if TypeId::of::<T>() == TypeId::of::<()>() => Box::new(()),
            None => return Err(invalid_parameter::<T>(String::from("null"))),
        };
        match parameter.downcast::<T>() {
            Ok(parameter) => Ok(*parameter),
            Err(other) => Err(invalid_parameter::<T>(format!("{:?}", (*other).type_id()))),
        }
    }
}

impl<T: Send + 'static> Command for AsyncCommand<T> {
    fn can_execute(&self, parameter: Option<&dyn Any>) -> Result<bool> {
        let unit = ();
        let parameter: &dyn Any = match parameter {
            Some(parameter) => parameter,
            None if TypeId::of::<T>() == TypeId::of::<()>() => &unit,
            None => return Err(invalid_parameter::<T>(String::from("null"))),
        };
        match parameter.downcast_ref::<T>() {
            Some(parameter) => Ok(self.can_execute_with(parameter)),
            None => Err(invalid_parameter::<T>(format!("{:?}", parameter.type_id()))),
        }
    }

    fn execute(&self, parameter: Option<Box<dyn Any + Send>>) -> Result<()> {
        let parameter = self.downcast_parameter(parameter)?;
        self.execute_with(parameter);
        Ok(())
    }

    fn can_execute_changed(&self) -> EventAccessor<'_, EventArgs> {
        self.inner.weak_event_manager.event(CAN_EXECUTE_CHANGED)
    }

    fn raise_can_execute_changed(&self) -> Result<()> {
        event!(Level::TRACE, "raising {} for {}", CAN_EXECUTE_CHANGED, type_name::<Self>());
        self.inner
            .weak_event_manager
            .raise_event(Some(self as &dyn Any), &EventArgs::EMPTY, CAN_EXECUTE_CHANGED)
    }
}

impl<T> fmt::Debug for AsyncCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCommand")
            .field("parameter", &type_name::<T>())
            .field("executions", &self.inner.execution_count.load(Ordering::SeqCst))
            .field("allows_multiple_executions", &self.inner.allows_multiple_executions)
            .finish()
    }
}

/// Name of the event raised when `can_execute` may have changed.
pub const CAN_EXECUTE_CHANGED: &str = "CanExecuteChanged";

fn invalid_parameter<T>(actual: String) -> Error {
    Error::InvalidCommandParameter {
        expected: type_name::<T>(),
        actual,
    }
}

/// Configures an [`AsyncCommand`] before it is shared.
pub struct AsyncCommandBuilder<T> {
    execute: Box<ExecuteFn<T>>,
    can_execute: Box<CanExecuteFn<T>>,
    on_exception: Option<Arc<OnExceptionFn>>,
    continue_on_captured_context: bool,
    allows_multiple_executions: bool,
    settings: Option<FireAndForgetSettings>,
}

impl<T: Send + 'static> AsyncCommandBuilder<T> {
    fn new<F, Fut, E>(execute: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        let execute = move |parameter: T| -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
            let future = execute(parameter);
            Box::pin(async move { future.await.map_err(Into::into) })
        };
        AsyncCommandBuilder {
            execute: Box::new(execute),
            can_execute: Box::new(|_| true),
            on_exception: None,
            continue_on_captured_context: false,
            allows_multiple_executions: true,
            settings: None,
        }
    }

    pub fn can_execute<C>(mut self, can_execute: C) -> Self
    where
        C: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.can_execute = Box::new(can_execute);
        self
    }

    /// Called with the error of every failed `execute`.
    pub fn on_exception<H>(mut self, on_exception: H) -> Self
    where
        H: Fn(HandlerError) + Send + Sync + 'static,
    {
        self.on_exception = Some(Arc::new(on_exception));
        self
    }

    pub fn continue_on_captured_context(mut self, continue_on_captured_context: bool) -> Self {
        self.continue_on_captured_context = continue_on_captured_context;
        self
    }

    /// When `false`, the command reports it cannot execute while running.
    pub fn allows_multiple_executions(mut self, allows_multiple_executions: bool) -> Self {
        self.allows_multiple_executions = allows_multiple_executions;
        self
    }

    /// Use `settings` for `execute` failures instead of the process-wide ones.
    pub fn fire_and_forget_settings(mut self, settings: FireAndForgetSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> AsyncCommand<T> {
        AsyncCommand {
            inner: Arc::new(CommandInner {
                execute: self.execute,
                can_execute: self.can_execute,
                on_exception: self.on_exception,
                continue_on_captured_context: self.continue_on_captured_context,
                allows_multiple_executions: self.allows_multiple_executions,
                settings: self.settings,
                execution_count: AtomicUsize::new(0),
                weak_event_manager: WeakEventManager::new(),
            }),
        }
    }
}

/// Subscribe `handler` to `command`'s `can_execute_changed`.
///
/// Convenience for binding layers holding a `&dyn Command`.
pub fn bind_can_execute_changed(command: &dyn Command, handler: &EventHandler<EventArgs>) -> Result<()> {
    command.can_execute_changed().add(handler)
}
