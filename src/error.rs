use thiserror::Error;

/// Error produced by an event handler or by a fire-and-forget task.
///
/// Handlers are free to fail with any error type, so the manager only ever
/// sees it boxed.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The return type of every event handler callback.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// The crate-wide error type.
///
/// # Error Categories
///
/// ## Input validation
/// - [`Error::Argument`] - a string argument was empty or whitespace
/// - [`Error::ArgumentNull`] - a required argument was absent
/// - [`Error::InvalidCommandParameter`] - a command received a parameter of the wrong type
///
/// ## Dispatch
/// - [`Error::InvalidHandleEvent`] - the raise shape does not fit a subscribed handler
/// - [`Error::ParameterCountMismatch`] - the low-level cause of the above
/// - [`Error::TargetMismatch`] - an instance handler was handed the wrong subscriber
/// - [`Error::Handler`] - an error returned by the handler itself
///
/// ## Infrastructure
/// - [`Error::LockPoisoned`] - a registry lock was poisoned by a panicking thread
/// - [`Error::Config`] - settings could not be loaded
#[derive(Error, Debug)]
pub enum Error {
    /// A string argument was empty or consisted only of whitespace.
    #[error("Value cannot be null, empty or white space (Parameter '{0}')")]
    Argument(&'static str),

    /// A required argument was not supplied.
    #[error("Value cannot be null (Parameter '{0}')")]
    ArgumentNull(&'static str),

    /// A handler was raised with an argument list that its signature cannot accept.
    ///
    /// The message names the raise call that matches the handler. The wrapped
    /// source is always an [`Error::ParameterCountMismatch`].
    #[error("{message}")]
    InvalidHandleEvent {
        /// Which raise shape to use instead
        message: String,
        /// The parameter count mismatch that triggered this error
        #[source]
        source: Box<Error>,
    },

    /// The number of arguments supplied does not match the handler's parameter count.
    #[error("Parameter count mismatch invoking `{method}`: expected {expected}, got {actual}")]
    ParameterCountMismatch {
        /// Name of the handler method
        method: String,
        /// Parameters declared by the handler
        expected: usize,
        /// Arguments supplied by the raise call
        actual: usize,
    },

    /// An instance handler was invoked without a subscriber of its declaring type.
    #[error("Object does not match target type `{declaring_type}` of `{method}`")]
    TargetMismatch {
        /// Name of the handler method
        method: String,
        /// Type the handler was declared on
        declaring_type: &'static str,
    },

    /// The handler itself failed; propagated untouched.
    #[error(transparent)]
    Handler(HandlerError),

    /// A command was executed with a parameter that is not of its declared type.
    #[error("Invalid type for parameter. Expected Type: {expected}, but received Type: {actual}")]
    InvalidCommandParameter {
        /// Type the command was declared with
        expected: &'static str,
        /// Description of what was received
        actual: String,
    },

    /// A lock guarding shared state was poisoned.
    #[error("Failed to lock {0}")]
    LockPoisoned(&'static str),

    /// Settings could not be loaded or deserialized.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Returns `true` if this is an [`Error::InvalidHandleEvent`].
    pub fn is_invalid_handle_event(&self) -> bool {
        matches!(self, Error::InvalidHandleEvent { .. })
    }

    /// Returns `true` for the argument validation errors.
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Error::Argument(_) | Error::ArgumentNull(_))
    }
}
