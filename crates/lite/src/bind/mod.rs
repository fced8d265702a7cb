//! Binds environ values to a simplified handler's keyword arguments.
//!
//! A [`Bindings`] set maps argument names to [`Rule`]s. Names are checked against the handler's
//! declared [`Params`] when the set is attached, never when a request is served. Binding more
//! rules onto an already bound handler merges the sets instead of stacking another wrapper.
//!
//! ```
//! use micro_lite::bind::{Bindings, Params, Rule};
//! use micro_lite::Environ;
//!
//! let params = Params::new().param_with_default("path", "/");
//! let bindings = Bindings::new().bind("path", "PATH_INFO").unwrap();
//!
//! let args = bindings.resolve(&params, &Environ::from_iter([("PATH_INFO", "/foo")]));
//! assert_eq!(args.str("path"), Some("/foo"));
//!
//! let args = bindings.resolve(&params, &Environ::new());
//! assert_eq!(args.str("path"), Some("/"));
//! ```

mod params;
mod rule;

pub use params::{Args, Param, Params};
pub use rule::Rule;

use crate::environ::Environ;
use crate::error::BindError;

/// Argument name to [`Rule`] mapping, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    rules: Vec<(String, Rule)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for `name`. A name may be bound only once.
    pub fn bind<N, R>(mut self, name: N, rule: R) -> Result<Self, BindError>
    where
        N: Into<String>,
        R: Into<Rule>,
    {
        self.insert(name.into(), rule.into())?;
        Ok(self)
    }

    /// Merges `other` into this set, rejecting names bound on both sides.
    pub fn merge(mut self, other: &Bindings) -> Result<Self, BindError> {
        for (name, rule) in &other.rules {
            self.insert(name.clone(), rule.clone())?;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|(bound, _)| bound == name).map(|(_, rule)| rule)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Fails on the first bound name `params` does not declare.
    pub fn check(&self, handler: &str, params: &Params) -> Result<(), BindError> {
        match self.names().find(|name| !params.contains(name)) {
            Some(name) => Err(BindError::unknown_parameter(handler, name)),
            None => Ok(()),
        }
    }

    /// Resolves every rule against `environ`, on top of the declared defaults.
    pub fn resolve(&self, params: &Params, environ: &Environ) -> Args {
        let mut args = params.defaults();
        for (name, rule) in &self.rules {
            if let Some(value) = rule.resolve(environ) {
                args.set(name, value);
            }
        }
        args
    }

    fn insert(&mut self, name: String, rule: Rule) -> Result<(), BindError> {
        if let Some(previous) = self.get(&name) {
            return Err(BindError::rebound(&name, format!("{previous:?}"), format!("{rule:?}")));
        }
        self.rules.push((name, rule));
        Ok(())
    }
}
