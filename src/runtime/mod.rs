//! Runtime subsystem modules.

pub mod context;
pub(crate) mod core;
pub(crate) mod driver;
pub(crate) mod queue;

pub use core::Dispatcher;
pub use driver::DispatcherThread;
