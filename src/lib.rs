/*!
# Async Best Practices

Building blocks for UI code that uses async without leaking or losing errors,
plus a Hacker News reader that shows them in use.

- [`weak_event_manager`]: events whose subscribers are held weakly, so a
  long-lived publisher never keeps a dropped view alive.
- [`fire_and_forget`]: start a future without awaiting it and still see its
  error.
- [`command`]: async commands for data-binding layers, built on the two above.

# Usage

```rust
use async_best_practices::{EventArgs, EventHandler, HandlerMethod, WeakEventManager};
use std::sync::Arc;

struct View;

let manager = WeakEventManager::<EventArgs>::new();
let view = Arc::new(View);
let handler = EventHandler::new(&view, HandlerMethod::from_method_action("on_changed", |_: &View| Ok(())));

manager.add_event_handler(&handler, "Changed")?;
manager.raise_event_without_args("Changed")?;
# Ok::<(), async_best_practices::Error>(())
```

Run the reader with `cargo run -- --pattern bad` or `--pattern good`.

*/
#[macro_use]
extern crate lazy_static;
pub mod command;
pub mod error;
pub mod event_registry;
pub mod fire_and_forget;
pub mod hacker_news;
pub mod handler;
pub mod settings;
pub mod subscription;
pub mod weak_event_manager;

#[cfg(test)]
mod test_setup;
#[cfg(test)]
mod test_utilities;

pub use crate::command::{AsyncCommand, Command};
pub use crate::error::{Error, HandlerError, HandlerResult};
pub use crate::handler::{EventHandler, HandlerMethod};
pub use crate::weak_event_manager::{AnyEventArgs, EventArgs, WeakEventManager};

pub type Result<T> = std::result::Result<T, Error>;
