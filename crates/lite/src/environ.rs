//! The per-request environment shared by every handler of a call chain.
//!
//! An [`Environ`] is a handle: cloning it does not copy the request state, so a value written by a
//! downstream handler is visible upstream afterwards. Read whatever you need from it *before*
//! calling a child handler.

use crate::cleanup::{CleanupRegistry, Close};
use crate::error::LiteError;
use http::Extensions;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key/value defaults filled in by [`Environ::with_testing_defaults`].
const TESTING_DEFAULTS: [(&str, &str); 8] = [
    ("REQUEST_METHOD", "GET"),
    ("SERVER_NAME", "127.0.0.1"),
    ("SERVER_PORT", "80"),
    ("SERVER_PROTOCOL", "HTTP/1.0"),
    ("HTTP_HOST", "127.0.0.1"),
    ("SCRIPT_NAME", ""),
    ("PATH_INFO", "/"),
    ("wsgi.url_scheme", "http"),
];

#[derive(Clone, Default)]
pub struct Environ {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    vars: HashMap<String, Value>,
    extensions: Extensions,
    cleanups: Option<CleanupRegistry>,
}

impl Environ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the CGI variables a request always carries, keeping the ones already present.
    #[must_use]
    pub fn with_testing_defaults(self) -> Self {
        {
            let mut state = self.state();
            for (key, value) in TESTING_DEFAULTS {
                state.vars.entry(key.to_string()).or_insert_with(|| Value::from(value));
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state().vars.get(key).cloned()
    }

    /// Returns the value of `key` when it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.state().vars.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state().vars.contains_key(key)
    }

    pub fn insert<K, V>(&self, key: K, value: V) -> Option<Value>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.state().vars.insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state().vars.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().vars.keys().cloned().collect()
    }

    pub fn extension<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.state().extensions.get::<T>().cloned()
    }

    pub fn insert_extension<T>(&self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.state().extensions.insert(value)
    }

    /// Returns the cached `T`, creating and caching it with `f` on first use.
    ///
    /// This is the environment-scoped object cache: pair it with a computed binding rule to hand
    /// the same object to every handler of the request.
    pub fn get_or_insert_extension_with<T, F>(&self, f: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        if let Some(cached) = self.extension::<T>() {
            return cached;
        }
        // built without holding the lock, `f` may read the environ
        let value = f();
        self.state().extensions.get_or_insert_with(|| value).clone()
    }

    pub fn cleanup_registry(&self) -> Option<CleanupRegistry> {
        self.state().cleanups.clone()
    }

    /// Returns the registry, installing a fresh one when absent. The flag tells whether it was installed.
    pub(crate) fn ensure_cleanup_registry(&self) -> (CleanupRegistry, bool) {
        let mut state = self.state();
        match &state.cleanups {
            Some(registry) => (registry.clone(), false),
            None => {
                let registry = CleanupRegistry::new();
                state.cleanups = Some(registry.clone());
                (registry, true)
            }
        }
    }

    /// Uses `registry` as this request's cleanup registry.
    ///
    /// A caller that installs its own registry owns it: adapters register into it but leave the
    /// drain to the caller.
    #[must_use]
    pub fn with_cleanup_registry(self, registry: CleanupRegistry) -> Self {
        self.state().cleanups = Some(registry);
        self
    }

    /// Uninstalls `registry` when it is still the installed one.
    pub(crate) fn remove_cleanup_registry(&self, registry: &CleanupRegistry) {
        let mut state = self.state();
        if state.cleanups.as_ref().is_some_and(|installed| installed.ptr_eq(registry)) {
            state.cleanups = None;
        }
    }

    /// Schedules `f` to run when the request ends.
    pub fn add_cleanup<F>(&self, f: F) -> Result<(), LiteError>
    where
        F: FnOnce() + Send + 'static,
    {
        let registry = self.cleanup_registry().ok_or(LiteError::MissingCleanupRegistry)?;
        registry.add(f);
        Ok(())
    }

    /// Schedules `resource`'s release for the end of the request and returns the same resource.
    pub fn register_close<T>(&self, resource: Arc<T>) -> Result<Arc<T>, LiteError>
    where
        T: Close + ?Sized + 'static,
    {
        let registry = self.cleanup_registry().ok_or(LiteError::MissingCleanupRegistry)?;
        Ok(registry.register(resource))
    }

    pub fn ptr_eq(&self, other: &Environ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> FromIterator<(K, V)> for Environ
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let environ = Environ::new();
        {
            let mut state = environ.state();
            for (key, value) in iter {
                state.vars.insert(key.into(), value.into());
            }
        }
        environ
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Environ")
            .field("vars", &state.vars)
            .field("cleanups", &state.cleanups)
            .finish_non_exhaustive()
    }
}
