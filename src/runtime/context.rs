//! Thread-local execution context.
//!
//! Each thread carries two optional associations:
//!
//! - the [`Dispatcher`] whose pump is executing an action on this thread, valid only
//!   for the duration of that action;
//! - the current [`DispatchContext`], which components consult when they are created
//!   without an explicit context. A dispatcher installs its own context around each
//!   action; foreign executors install theirs with [`set_current_context`] or
//!   [`with_context`].
//!
//! # Example
//!
//! ```ignore
//! use affinity::runtime::context::{current_context, with_context};
//! use affinity::dispatch::DefaultContext;
//! use std::sync::Arc;
//!
//! with_context(Arc::new(DefaultContext), || {
//!     assert!(current_context().is_some());
//! });
//! ```

use crate::dispatch::DispatchContext;
use crate::runtime::core::Dispatcher;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// The dispatcher executing an action on this thread.
    ///
    /// Set by [`enter_action`] around every action the pump runs.
    static CURRENT_DISPATCHER: RefCell<Option<Dispatcher>> = const { RefCell::new(None) };

    /// The dispatch context that callbacks created on this thread should use.
    static CURRENT_CONTEXT: RefCell<Option<Arc<dyn DispatchContext>>> =
        const { RefCell::new(None) };
}

/// Runs `function` with `dispatcher` and `context` installed for the current thread.
///
/// The previous associations are restored on exit, including when `function` unwinds.
pub(crate) fn enter_action<F, R>(
    dispatcher: Dispatcher,
    context: Arc<dyn DispatchContext>,
    function: F,
) -> R
where
    F: FnOnce() -> R,
{
    struct Restore {
        dispatcher: Option<Dispatcher>,
        context: Option<Arc<dyn DispatchContext>>,
    }

    impl Drop for Restore {
        fn drop(&mut self) {
            let dispatcher = self.dispatcher.take();
            let context = self.context.take();
            CURRENT_DISPATCHER.with(|current| *current.borrow_mut() = dispatcher);
            CURRENT_CONTEXT.with(|current| *current.borrow_mut() = context);
        }
    }

    let _restore = Restore {
        dispatcher: CURRENT_DISPATCHER.with(|current| current.borrow_mut().replace(dispatcher)),
        context: CURRENT_CONTEXT.with(|current| current.borrow_mut().replace(context)),
    };

    function()
}

/// Returns the dispatcher executing an action on this thread, if any.
pub(crate) fn current_dispatcher() -> Option<Dispatcher> {
    CURRENT_DISPATCHER.with(|current| current.borrow().clone())
}

/// Returns the dispatch context installed on this thread, if any.
pub fn current_context() -> Option<Arc<dyn DispatchContext>> {
    CURRENT_CONTEXT.with(|current| current.borrow().clone())
}

/// Installs `context` as the current thread's dispatch context and returns the previous one.
///
/// Passing `None` clears the association.
pub fn set_current_context(
    context: Option<Arc<dyn DispatchContext>>,
) -> Option<Arc<dyn DispatchContext>> {
    CURRENT_CONTEXT.with(|current| std::mem::replace(&mut *current.borrow_mut(), context))
}

/// Runs `function` with `context` as the current dispatch context, restoring the
/// previous one afterwards.
pub fn with_context<F, R>(context: Arc<dyn DispatchContext>, function: F) -> R
where
    F: FnOnce() -> R,
{
    struct Restore(Option<Option<Arc<dyn DispatchContext>>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            if let Some(previous) = self.0.take() {
                set_current_context(previous);
            }
        }
    }

    let _restore = Restore(Some(set_current_context(Some(context))));
    function()
}
