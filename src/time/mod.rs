//! Time utilities: host countdowns, timers and timeouts.
//!
//! - [`driver`]: the process-wide countdown thread everything else is built on
//! - [`Timer`]: periodic or single-shot timer whose handler runs on its dispatch context
//! - [`Timeout`]: cancellable one-shot callback

pub mod driver;
pub mod timeout;
pub mod timer;

pub use timeout::Timeout;
pub use timer::{ElapsedHandler, Timer};
