//! Process-wide table of the guarantees each dispatch context implementation satisfies.
//!
//! Implementations are expected to register once at startup. Lookups of an
//! unregistered identity yield [`Capabilities::NONE`], so a context nobody described
//! fails every [`verify`] that asks for something.

use crate::dispatch::{
    Capabilities, ContextIdentity, DefaultContext, DispatchContext, DispatcherContext,
};
use crate::error::{Error, Result};
use crate::runtime::context::current_context;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, warn};

static REGISTRY: OnceLock<Mutex<HashMap<ContextIdentity, Capabilities>>> = OnceLock::new();

fn table() -> MutexGuard<'static, HashMap<ContextIdentity, Capabilities>> {
    REGISTRY
        .get_or_init(|| {
            let mut entries = HashMap::new();
            entries.insert(ContextIdentity::none(), Capabilities::ASYNC_NON_REENTRANT);
            entries.insert(
                ContextIdentity::of::<DefaultContext>(),
                Capabilities::ASYNC_NON_REENTRANT,
            );
            entries.insert(
                ContextIdentity::of::<DispatcherContext>(),
                Capabilities::STANDARD,
            );
            Mutex::new(entries)
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Declares the guarantees of `identity`, replacing any earlier entry.
pub fn register(identity: ContextIdentity, capabilities: Capabilities) {
    debug!(context = identity.name(), %capabilities, "registering dispatch context");
    table().insert(identity, capabilities);
}

/// Returns the guarantees registered for `identity`.
pub fn lookup(identity: ContextIdentity) -> Capabilities {
    table().get(&identity).copied().unwrap_or(Capabilities::NONE)
}

/// Fails unless `identity` is registered with every flag in `required`.
pub fn verify(identity: ContextIdentity, required: Capabilities) -> Result<()> {
    let registered = lookup(identity);
    if registered.contains(required) {
        return Ok(());
    }

    warn!(
        context = identity.name(),
        %required,
        %registered,
        "dispatch context lacks required guarantees"
    );

    Err(Error::InsufficientCapabilities {
        context: identity.name(),
        required,
        registered,
    })
}

/// Verifies the calling thread's current dispatch context, or the "no context"
/// entry when none is installed.
pub fn verify_current(required: Capabilities) -> Result<()> {
    let identity = current_context()
        .map(|context| context.identity())
        .unwrap_or_else(ContextIdentity::none);

    verify(identity, required)
}

/// Returns the calling thread's current dispatch context once it passes
/// [`verify_current`], falling back to [`DefaultContext`] when the thread has none.
pub fn current_verified(required: Capabilities) -> Result<Arc<dyn DispatchContext>> {
    verify_current(required)?;
    Ok(current_context().unwrap_or_else(|| Arc::new(DefaultContext)))
}
