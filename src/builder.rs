//! Fluent builder for dedicated dispatcher threads.
//!
//! Provides a builder pattern interface for creating and configuring
//! [`DispatcherThread`] instances.

use crate::runtime::DispatcherThread;

/// Builder for constructing [`DispatcherThread`] instances with fluent API.
///
/// # Example
/// ```ignore
/// let worker = DispatcherThreadBuilder::new()
///     .name("network")
///     .stack_size(256 * 1024)
///     .build();
/// worker.start()?;
/// ```
pub struct DispatcherThreadBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Default for DispatcherThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherThreadBuilder {
    /// Creates a builder for an unnamed thread with the platform's default stack size.
    pub fn new() -> Self {
        Self {
            name: None,
            stack_size: None,
        }
    }

    /// Names the thread being built.
    ///
    /// # Arguments
    /// * `name` - Name given to the spawned OS thread
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the stack size of the thread being built.
    ///
    /// # Arguments
    /// * `bytes` - Stack size in bytes
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Builds an unstarted [`DispatcherThread`] with the current configuration.
    ///
    /// # Returns
    /// A configured thread; call [`DispatcherThread::start`] to spawn it
    pub fn build(self) -> DispatcherThread {
        DispatcherThread::with_config(self.name, self.stack_size)
    }
}
