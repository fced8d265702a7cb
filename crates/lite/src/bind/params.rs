use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// One declared keyword parameter of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    default: Option<Value>,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.default {
            Some(default) => write!(f, "{}={}", self.name, default),
            None => f.write_str(&self.name),
        }
    }
}

/// The keyword parameters a handler declares, checked against binding rules at wrap time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    params: Vec<Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter without a default.
    #[must_use]
    pub fn param<N: Into<String>>(mut self, name: N) -> Self {
        self.params.push(Param { name: name.into(), default: None });
        self
    }

    /// Declares a parameter that keeps `default` when no binding resolves.
    #[must_use]
    pub fn param_with_default<N, V>(mut self, name: N, default: V) -> Self
    where
        N: Into<String>,
        V: Into<Value>,
    {
        self.params.push(Param { name: name.into(), default: Some(default.into()) });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|param| param.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Arguments holding only the declared defaults.
    pub fn defaults(&self) -> Args {
        let values = self
            .params
            .iter()
            .filter_map(|param| param.default.clone().map(|default| (param.name.clone(), default)))
            .collect();
        Args { values }
    }
}

/// Keyword arguments handed to a simplified handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: HashMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Deserializes the argument `name`, `Ok(None)` when it is absent.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        self.values.get(name).cloned().map(serde_json::from_value).transpose()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }
}
