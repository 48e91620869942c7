use crate::fire_and_forget::Dispatcher;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

/// A subscriber that remembers every call made to it.
#[derive(Debug, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The call log, which outlives the recorder itself.
    pub fn shared_calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

/// Stand-in for a handler dereferencing something that is not there.
#[derive(Debug)]
pub struct NullReferenceError;

impl fmt::Display for NullReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object reference not set to an instance of an object.")
    }
}

impl std::error::Error for NullReferenceError {}

/// What happened to one job handed to a [`RecordingDispatcher`].
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    Panicked(String),
}

/// Runs dispatched jobs inline on the calling thread and reports whether each
/// one completed or panicked.
pub struct RecordingDispatcher {
    outcomes: Mutex<mpsc::Sender<DispatchOutcome>>,
}

impl RecordingDispatcher {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<DispatchOutcome>) {
        let (sender, receiver) = mpsc::channel();
        let dispatcher = Arc::new(RecordingDispatcher {
            outcomes: Mutex::new(sender),
        });
        (dispatcher, receiver)
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => DispatchOutcome::Completed,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_default();
                DispatchOutcome::Panicked(message)
            }
        };
        let _ = self.outcomes.lock().unwrap().send(outcome);
    }
}
