use crate::environ::Environ;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type Compute = Arc<dyn Fn(&Environ) -> Option<Value> + Send + Sync>;

/// Where a keyword argument's value comes from.
///
/// Rules resolve recursively: `AnyOf` tries its alternatives in order and the first one that
/// resolves wins. A rule that resolves to nothing leaves the handler's declared default in place.
#[derive(Clone)]
pub enum Rule {
    /// The environ value under this key, if present.
    Key(String),
    /// The first alternative that resolves.
    AnyOf(Vec<Rule>),
    /// Computed from the environ; may have side effects such as caching an object in it.
    Compute(Compute),
}

impl Rule {
    pub fn key<K: Into<String>>(key: K) -> Self {
        Self::Key(key.into())
    }

    pub fn any_of<I, R>(rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        Self::AnyOf(rules.into_iter().map(Into::into).collect())
    }

    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&Environ) -> Option<Value> + Send + Sync + 'static,
    {
        Self::Compute(Arc::new(f))
    }

    pub fn resolve(&self, environ: &Environ) -> Option<Value> {
        match self {
            Rule::Key(key) => environ.get(key),
            Rule::AnyOf(rules) => rules.iter().find_map(|rule| rule.resolve(environ)),
            Rule::Compute(f) => f(environ),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Key(key) => write!(f, "{key:?}"),
            Rule::AnyOf(rules) => f.debug_list().entries(rules).finish(),
            Rule::Compute(_) => f.write_str("<computed>"),
        }
    }
}

impl From<&str> for Rule {
    fn from(key: &str) -> Self {
        Self::key(key)
    }
}

impl From<String> for Rule {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl<R: Into<Rule>> From<Vec<R>> for Rule {
    fn from(rules: Vec<R>) -> Self {
        Self::any_of(rules)
    }
}

impl<R: Into<Rule>, const N: usize> From<[R; N]> for Rule {
    fn from(rules: [R; N]) -> Self {
        Self::any_of(rules)
    }
}
