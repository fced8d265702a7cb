//! Deferred release of per-request resources.
//!
//! - [`CloseHandle`]: a release action that runs at most once, no matter how many owners call it
//! - [`CleanupRegistry`]: the ordered list of releases a request accumulates, drained once at the end
//! - [`RequestScope`]: installs a registry into an [`Environ`] when no enclosing layer did, and
//!   owns its drain
//!
//! The registry drains in registration order (first registered, first released). Releases added
//! while a drain is running are picked up by the same drain, so a release that registers itself
//! loops forever; that is the registrant's bug.

use crate::body::Body;
use crate::environ::Environ;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

type Action = Box<dyn FnOnce() + Send>;

/// A resource whose release is safe to trigger more than once.
pub trait Close: Send + Sync {
    fn close(&self);
}

/// A shared, run-at-most-once release action.
///
/// Clones share the same action: whichever clone closes first runs it, the others become no-ops.
#[derive(Clone)]
pub struct CloseHandle {
    action: Arc<Mutex<Option<Action>>>,
}

impl CloseHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { action: Arc::new(Mutex::new(Some(Box::new(f)))) }
    }

    /// Returns a handle which first closes `self`, then runs `f`.
    pub fn then<F>(self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            self.close();
            f();
        })
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.action).is_none()
    }

    pub fn close(&self) {
        // the guard must be released before running, the action may touch other handles
        let action = lock(&self.action).take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn ptr_eq(&self, other: &CloseHandle) -> bool {
        Arc::ptr_eq(&self.action, &other.action)
    }
}

impl Close for CloseHandle {
    fn close(&self) {
        CloseHandle::close(self);
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle").field("closed", &self.is_closed()).finish()
    }
}

/// Per-request ordered collection of deferred releases.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    entries: Arc<Mutex<VecDeque<Action>>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a release callback.
    pub fn add<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.entries).push_back(Box::new(f));
    }

    /// Appends `resource`'s release and hands the same resource back.
    pub fn register<T>(&self, resource: Arc<T>) -> Arc<T>
    where
        T: Close + ?Sized + 'static,
    {
        let registered = Arc::clone(&resource);
        self.add(move || registered.close());
        resource
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Runs every pending release in registration order, including releases registered meanwhile.
    pub fn drain(&self) {
        let mut released = 0usize;
        loop {
            let next = lock(&self.entries).pop_front();
            match next {
                Some(action) => {
                    action();
                    released += 1;
                }
                None => break,
            }
        }
        trace!(released, "cleanup registry drained");
    }

    pub fn ptr_eq(&self, other: &CleanupRegistry) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupRegistry").field("pending", &self.len()).finish()
    }
}

/// The cleanup scope of one adapted call.
///
/// Entering a scope makes sure the environ has a registry. When this scope had to install it, the
/// scope owns the drain: [`RequestScope::finish`] ties it to the returned body's release, and
/// dropping an unfinished scope (the handler failed) drains right away. An owned registry is taken
/// back out of the environ once drained, so the next request on the same environ gets a fresh one.
#[derive(Debug)]
pub(crate) struct RequestScope {
    environ: Environ,
    registry: CleanupRegistry,
    owned: bool,
}

impl RequestScope {
    pub(crate) fn enter(environ: &Environ) -> Self {
        let (registry, installed) = environ.ensure_cleanup_registry();
        if installed {
            debug!("no enclosing cleanup registry, installed a default one");
        }
        Self { environ: environ.clone(), registry, owned: installed }
    }

    pub(crate) fn registry(&self) -> &CleanupRegistry {
        &self.registry
    }

    pub(crate) fn finish(mut self, body: Body) -> Body {
        if !self.owned {
            return body;
        }
        self.owned = false;
        let environ = self.environ.clone();
        let registry = self.registry.clone();
        body.on_close(move || end_request(&environ, &registry))
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.owned {
            debug!("request ended before a body was produced, draining cleanup registry");
            end_request(&self.environ, &self.registry);
        }
    }
}

/// Drains `registry`, then uninstalls it from `environ`.
fn end_request(environ: &Environ, registry: &CleanupRegistry) {
    // releases may still register more work while draining
    registry.drain();
    environ.remove_cleanup_registry(registry);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
