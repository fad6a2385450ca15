//! Process-wide consumer manager for leaf binaries.
//!
//! Libraries and tests should take a `&ConsumerManager` instead; the global
//! slot exists so a service's `main` can install one manager and let its
//! consumer setup functions reach it.

use crate::manager::ConsumerManager;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

static MANAGER: LazyLock<Mutex<Option<Arc<ConsumerManager>>>> = LazyLock::new(|| Mutex::new(None));

/// Install `manager` as the process-wide manager, returning it.
///
/// Replaces any previously installed manager without shutting it down.
pub fn install(manager: ConsumerManager) -> Arc<ConsumerManager> {
    let manager = Arc::new(manager);
    *MANAGER.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&manager));
    manager
}

/// The installed manager, if any.
#[must_use]
pub fn manager() -> Option<Arc<ConsumerManager>> {
    MANAGER.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Clear the slot so the next [`install`] starts fresh. Returns the previous
/// manager so the caller can shut it down.
pub fn reset() -> Option<Arc<ConsumerManager>> {
    MANAGER.lock().unwrap_or_else(PoisonError::into_inner).take()
}
