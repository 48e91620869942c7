//!
//! # Safe Fire-and-Forget
//!
//! Starting a future without awaiting it loses its error: nobody is left to
//! observe it. `FireAndForget` spawns the future and routes a failure to,
//! in order:
//!
//! 1. the default exception handler of the active [`FireAndForgetSettings`],
//! 2. the `on_exception` callback given for this call.
//!
//! If neither exists, or the settings ask to always rethrow, the failure is
//! re-raised as a panic on the detached task, where the runtime reports it.
//!
//! ```rust,no_run
//! use async_best_practices::fire_and_forget::FireAndForgetExt;
//!
//! # async fn refresh() -> Result<(), std::io::Error> { Ok(()) }
//! # async fn run() {
//! refresh().safe_fire_and_forget_with(|err| eprintln!("refresh failed: {}", err));
//! # }
//! ```
//!
//! Settings are process-wide by default (see [`set_default_settings`]) but can
//! be injected per call with [`FireAndForget::with_settings`].
//!
use crate::HandlerError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use tokio::runtime;
use tracing::{event, Level};

/// Callback receiving every fire-and-forget failure.
pub type ExceptionHandler = Arc<dyn Fn(&HandlerError) + Send + Sync>;

/// Marshals work onto a captured execution context, such as a UI thread.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// Process-wide behaviour of fire-and-forget failures.
#[derive(Clone, Default)]
pub struct FireAndForgetSettings {
    should_always_rethrow_exception: bool,
    default_exception_handler: Option<ExceptionHandler>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl FireAndForgetSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `true`, failures are re-raised even after the handlers ran.
    pub fn initialize(&mut self, should_always_rethrow_exception: bool) {
        self.should_always_rethrow_exception = should_always_rethrow_exception;
    }

    pub fn should_always_rethrow_exception(&self) -> bool {
        self.should_always_rethrow_exception
    }

    /// Install a handler that sees every failure before the per-call one.
    pub fn set_default_exception_handling<H>(&mut self, handler: H)
    where
        H: Fn(&HandlerError) + Send + Sync + 'static,
    {
        self.default_exception_handler = Some(Arc::new(handler));
    }

    pub fn remove_default_exception_handling(&mut self) {
        self.default_exception_handler = None;
    }

    pub fn has_default_exception_handling(&self) -> bool {
        self.default_exception_handler.is_some()
    }

    /// The context failures are handled on when a call asks to continue on
    /// the captured context.
    pub fn set_dispatcher(&mut self, dispatcher: Arc<dyn Dispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.set_dispatcher(dispatcher);
        self
    }
}

impl fmt::Debug for FireAndForgetSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FireAndForgetSettings")
            .field("should_always_rethrow_exception", &self.should_always_rethrow_exception)
            .field("default_exception_handler", &self.default_exception_handler.is_some())
            .field("dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}

lazy_static! {
    static ref DEFAULT_SETTINGS: RwLock<FireAndForgetSettings> = RwLock::new(FireAndForgetSettings::default());
}

/// A snapshot of the process-wide settings.
pub fn default_settings() -> FireAndForgetSettings {
    DEFAULT_SETTINGS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide settings. Meant to be called once at startup.
pub fn set_default_settings(settings: FireAndForgetSettings) {
    *DEFAULT_SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
}

/// Set whether failures are always re-raised, process-wide.
pub fn initialize(should_always_rethrow_exception: bool) {
    DEFAULT_SETTINGS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .initialize(should_always_rethrow_exception);
}

/// Install the process-wide default exception handler.
pub fn set_default_exception_handling<H>(handler: H)
where
    H: Fn(&HandlerError) + Send + Sync + 'static,
{
    DEFAULT_SETTINGS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .set_default_exception_handling(handler);
}

pub fn remove_default_exception_handling() {
    DEFAULT_SETTINGS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove_default_exception_handling();
}

/// Per-call failure callback.
pub type OnException = Box<dyn FnOnce(HandlerError) + Send>;

/// A future about to be started without being awaited.
#[must_use = "nothing runs until `spawn` is called"]
pub struct FireAndForget<F> {
    future: F,
    on_exception: Option<OnException>,
    continue_on_captured_context: bool,
    settings: Option<FireAndForgetSettings>,
}

impl<F> FireAndForget<F> {
    pub fn new(future: F) -> Self {
        FireAndForget {
            future,
            on_exception: None,
            continue_on_captured_context: false,
            settings: None,
        }
    }

    pub fn on_exception<H>(mut self, on_exception: H) -> Self
    where
        H: FnOnce(HandlerError) + Send + 'static,
    {
        self.on_exception = Some(Box::new(on_exception));
        self
    }

    /// Handle a failure on the settings' dispatcher instead of the worker
    /// that ran the future. Without a dispatcher this has no effect.
    pub fn continue_on_captured_context(mut self, continue_on_captured_context: bool) -> Self {
        self.continue_on_captured_context = continue_on_captured_context;
        self
    }

    /// Use `settings` instead of the process-wide ones.
    pub fn with_settings(mut self, settings: FireAndForgetSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Start the future and return immediately.
    ///
    /// Inside a tokio runtime the future becomes a task on it; otherwise it
    /// runs to completion on a dedicated thread with its own current-thread
    /// runtime, so timers and I/O still work.
    pub fn spawn<T, E>(self)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<HandlerError> + Send + 'static,
    {
        let task = self.run();
        match runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => {
                let spawned = thread::Builder::new()
                    .name(String::from("fire-and-forget"))
                    .spawn(move || match runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => runtime.block_on(task),
                        Err(err) => event!(Level::ERROR, "could not start fire-and-forget runtime: {}", err),
                    });
                if let Err(err) = spawned {
                    event!(Level::ERROR, "could not start fire-and-forget thread: {}", err);
                }
            }
        }
    }

    async fn run<T, E>(self)
    where
        F: Future<Output = Result<T, E>>,
        E: Into<HandlerError>,
    {
        let FireAndForget {
            future,
            on_exception,
            continue_on_captured_context,
            settings,
        } = self;

        if let Err(err) = future.await {
            let settings = settings.unwrap_or_else(default_settings);
            handle_failure(err.into(), on_exception, continue_on_captured_context, settings);
        }
    }
}

fn handle_failure(
    error: HandlerError,
    on_exception: Option<OnException>,
    continue_on_captured_context: bool,
    settings: FireAndForgetSettings,
) {
    let dispatcher = if continue_on_captured_context {
        settings.dispatcher.clone()
    } else {
        None
    };

    let job = move || {
        if settings.default_exception_handler.is_none() && on_exception.is_none() {
            event!(Level::ERROR, "unhandled fire-and-forget failure: {}", error);
            panic!("unhandled fire-and-forget failure: {}", error);
        }

        event!(Level::DEBUG, "handling fire-and-forget failure: {}", error);
        if let Some(handler) = &settings.default_exception_handler {
            handler(&error);
        }

        let message = error.to_string();
        if let Some(on_exception) = on_exception {
            on_exception(error);
        }

        if settings.should_always_rethrow_exception {
            event!(Level::ERROR, "rethrowing fire-and-forget failure: {}", message);
            panic!("fire-and-forget failure: {}", message);
        }
    };

    match dispatcher {
        Some(dispatcher) => dispatcher.dispatch(Box::new(job)),
        None => job(),
    }
}

/// Start `future` without awaiting it, routing a failure to `on_exception`.
pub fn safe_fire_and_forget<F, T, E>(future: F, on_exception: Option<OnException>, continue_on_captured_context: bool)
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<HandlerError> + Send + 'static,
{
    FireAndForget {
        future,
        on_exception,
        continue_on_captured_context,
        settings: None,
    }
    .spawn()
}

/// Shorthands for starting a future fire-and-forget.
pub trait FireAndForgetExt: Future + Sized {
    fn fire_and_forget(self) -> FireAndForget<Self> {
        FireAndForget::new(self)
    }

    fn safe_fire_and_forget<T, E>(self)
    where
        Self: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<HandlerError> + Send + 'static,
    {
        FireAndForget::new(self).spawn()
    }

    fn safe_fire_and_forget_with<T, E, H>(self, on_exception: H)
    where
        Self: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<HandlerError> + Send + 'static,
        H: FnOnce(HandlerError) + Send + 'static,
    {
        FireAndForget::new(self).on_exception(on_exception).spawn()
    }
}

impl<F: Future> FireAndForgetExt for F {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utilities::mocks::{DispatchOutcome, NullReferenceError, RecordingDispatcher};
    use serial_test::serial;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn failing() -> Result<(), NullReferenceError> {
        tokio::task::yield_now().await;
        Err(NullReferenceError)
    }

    #[tokio::test]
    async fn on_exception_receives_failure_test() {
        let (sender, receiver) = oneshot::channel();

        failing()
            .fire_and_forget()
            .with_settings(FireAndForgetSettings::new())
            .on_exception(move |err| {
                let _ = sender.send(err.to_string());
            })
            .spawn();

        let message = receiver.await.unwrap();
        assert_eq!(message, NullReferenceError.to_string());
    }

    #[tokio::test]
    async fn successful_future_runs_to_completion_test() {
        let (sender, receiver) = oneshot::channel();

        async move {
            let _ = sender.send(7);
            Ok::<(), NullReferenceError>(())
        }
        .fire_and_forget()
        .with_settings(FireAndForgetSettings::new())
        .on_exception(|_| panic!("no failure expected"))
        .spawn();

        assert_eq!(receiver.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn free_function_routes_failure_test() {
        let (sender, receiver) = oneshot::channel();
        let on_exception: OnException = Box::new(move |err| {
            let _ = sender.send(err.to_string());
        });

        safe_fire_and_forget(failing(), Some(on_exception), false);

        assert_eq!(receiver.await.unwrap(), NullReferenceError.to_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn default_handler_runs_before_callback_test() {
        let order = Arc::new(Mutex::new(vec![]));
        let (done, finished) = mpsc::channel();
        let mut settings = FireAndForgetSettings::new();
        let seen = order.clone();
        settings.set_default_exception_handling(move |_| seen.lock().unwrap().push("default"));

        let seen = order.clone();
        failing()
            .fire_and_forget()
            .with_settings(settings)
            .on_exception(move |_| {
                seen.lock().unwrap().push("callback");
                let _ = done.send(());
            })
            .spawn();

        finished.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["default", "callback"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rethrow_after_handling_on_captured_context_test() {
        let (dispatcher, outcomes) = RecordingDispatcher::new();
        let mut settings = FireAndForgetSettings::new().with_dispatcher(dispatcher);
        settings.initialize(true);
        let (handled, was_handled) = mpsc::channel();

        failing()
            .fire_and_forget()
            .with_settings(settings)
            .continue_on_captured_context(true)
            .on_exception(move |_| {
                let _ = handled.send(());
            })
            .spawn();

        was_handled.recv_timeout(TIMEOUT).unwrap();
        match outcomes.recv_timeout(TIMEOUT).unwrap() {
            DispatchOutcome::Panicked(message) => assert!(message.contains("Object reference not set")),
            other => panic!("expected a rethrow, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unhandled_failure_is_rethrown_test() {
        let (dispatcher, outcomes) = RecordingDispatcher::new();
        let settings = FireAndForgetSettings::new().with_dispatcher(dispatcher);

        failing()
            .fire_and_forget()
            .with_settings(settings)
            .continue_on_captured_context(true)
            .spawn();

        match outcomes.recv_timeout(TIMEOUT).unwrap() {
            DispatchOutcome::Panicked(message) => assert!(message.starts_with("unhandled fire-and-forget failure")),
            other => panic!("expected a rethrow, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dispatcher_ignored_without_captured_context_test() {
        let (dispatcher, outcomes) = RecordingDispatcher::new();
        let settings = FireAndForgetSettings::new().with_dispatcher(dispatcher);
        let (handled, was_handled) = mpsc::channel();

        failing()
            .fire_and_forget()
            .with_settings(settings)
            .on_exception(move |_| {
                let _ = handled.send(());
            })
            .spawn();

        was_handled.recv_timeout(TIMEOUT).unwrap();
        assert!(outcomes.try_recv().is_err());
    }

    #[test]
    #[serial]
    fn runs_without_a_runtime_test() {
        let (sender, receiver) = mpsc::channel();

        async { Err::<(), _>("no runtime here") }.safe_fire_and_forget_with(move |err| {
            let _ = sender.send(err.to_string());
        });

        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), "no runtime here");
    }

    #[test]
    #[serial]
    fn timers_work_without_a_runtime_test() {
        let (sender, receiver) = mpsc::channel();

        async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Err::<(), _>(NullReferenceError)
        }
        .safe_fire_and_forget_with(move |err| {
            let _ = sender.send(err.to_string());
        });

        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), NullReferenceError.to_string());
    }

    #[test]
    #[serial]
    fn process_wide_default_handler_test() {
        let (sender, receiver) = mpsc::channel();
        let sender = Mutex::new(sender);
        set_default_exception_handling(move |err| {
            let _ = sender.lock().unwrap().send(err.to_string());
        });

        async { Err::<(), _>(NullReferenceError) }.safe_fire_and_forget();

        let message = receiver.recv_timeout(TIMEOUT);
        remove_default_exception_handling();
        assert_eq!(message.unwrap(), NullReferenceError.to_string());
        assert!(!default_settings().has_default_exception_handling());
    }

    #[test]
    #[serial]
    fn initialize_sets_process_wide_rethrow_test() {
        initialize(true);
        assert!(default_settings().should_always_rethrow_exception());
        set_default_settings(FireAndForgetSettings::new());
        assert!(!default_settings().should_always_rethrow_exception());
    }
}
