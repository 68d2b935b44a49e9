//! Cooperative cancellation keyed by request identity.
//!
//! A [`CancellationRegistry`] hands out one live [`CancelHandle`] per request
//! key. Acquiring a handle for a key that already has one cancels the old
//! handle first, so a stale request (rapid pagination, fast repeated clicks)
//! can never race its replacement and overwrite newer data with older data.
//!
//! Invariants:
//! - At most one live handle per key.
//! - Supersession is delivered before the new handle is returned; both steps
//!   happen under one lock hold, so no window exists where two live handles
//!   for the same key coexist.
//! - Cancelling a handle that has already been cancelled keeps the first
//!   recorded reason.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(0);

/// Why an in-flight request was told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer request for the same key took over.
    Superseded,
    /// The caller cancelled explicitly.
    Requested,
    /// The owning client is tearing down all in-flight work.
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Superseded => write!(f, "superseded by a newer request"),
            CancelReason::Requested => write!(f, "cancelled by caller"),
            CancelReason::Shutdown => write!(f, "client shutting down"),
        }
    }
}

/// A token the transport polls to know whether its attempt should abort,
/// paired with the trigger that fires it.
///
/// Clones observe the same underlying signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: u64,
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Fire the cancellation signal. The first reason wins; later calls are
    /// no-ops.
    pub fn cancel(&self, reason: CancelReason) {
        if self.reason.set(reason).is_ok() {
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the handle is cancelled, yielding the recorded reason.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason.get().copied().unwrap_or(CancelReason::Requested)
    }

    /// The reason this handle was cancelled with, if it has been.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed map of live cancel handles. One instance per client; constructed at
/// startup and passed by reference rather than held in a module-level global.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    handles: Mutex<HashMap<String, CancelHandle>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle for `key`, cancelling any handle it replaces.
    pub fn acquire(&self, key: &str) -> CancelHandle {
        let mut handles = self.handles.lock().unwrap();
        if let Some(previous) = handles.remove(key) {
            debug!(key, "superseding in-flight request");
            previous.cancel(CancelReason::Superseded);
        }
        let handle = CancelHandle::new();
        handles.insert(key.to_string(), handle.clone());
        handle
    }

    /// Cancel the registered handle for `key`. Returns `false` when no handle
    /// is registered (a no-op, not an error).
    pub fn cancel(&self, key: &str, reason: CancelReason) -> bool {
        match self.handles.lock().unwrap().remove(key) {
            Some(handle) => {
                handle.cancel(reason);
                true
            }
            None => false,
        }
    }

    /// Cancel every registered handle and clear the registry.
    pub fn cancel_all(&self, reason: CancelReason) {
        let drained: Vec<CancelHandle> = {
            let mut handles = self.handles.lock().unwrap();
            handles.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            handle.cancel(reason);
        }
    }

    /// Forget the handle for `key` without cancelling it (normal settlement).
    pub fn release(&self, key: &str) {
        self.handles.lock().unwrap().remove(key);
    }

    /// Forget `handle` only if it is still the registered occupant of `key`.
    ///
    /// A superseded request settling late must not deregister its successor,
    /// so settlement paths release by identity instead of by key alone.
    pub fn release_handle(&self, key: &str, handle: &CancelHandle) {
        let mut handles = self.handles.lock().unwrap();
        if handles.get(key).is_some_and(|current| current.id() == handle.id()) {
            handles.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
