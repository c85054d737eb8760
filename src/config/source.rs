//! Sources of variables outside the config tree itself.
//!
//! Template resolution always sees an "environment" layer beneath the config.
//! The process environment is one implementation; tests use a static map.

use crate::template::str_to_type;
use serde_json::{Map, Value};

/// Provides the lowest-precedence layer of a resolution context.
pub trait VariableSource: Send + Sync {
    /// All variables this source offers.
    fn variables(&self) -> Map<String, Value>;

    /// A single variable.
    fn get(&self, name: &str) -> Option<Value> {
        self.variables().get(name).cloned()
    }
}

/// Reads the current process environment. Values are typed with
/// [`str_to_type`] so `NPROCS=4` arrives as an integer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl VariableSource for ProcessEnv {
    fn variables(&self) -> Map<String, Value> {
        std::env::vars().map(|(k, v)| (k, str_to_type(&v))).collect()
    }

    fn get(&self, name: &str) -> Option<Value> {
        std::env::var(name).ok().map(|v| str_to_type(&v))
    }
}

/// A fixed set of variables.
#[derive(Debug, Default, Clone)]
pub struct StaticVars(pub Map<String, Value>);

impl StaticVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl VariableSource for StaticVars {
    fn variables(&self) -> Map<String, Value> {
        self.0.clone()
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).cloned()
    }
}

/// Several sources stacked; later sources win.
pub struct Layered(pub Vec<Box<dyn VariableSource>>);

impl VariableSource for Layered {
    fn variables(&self) -> Map<String, Value> {
        let mut vars = Map::new();
        for source in &self.0 {
            vars.extend(source.variables());
        }
        vars
    }
}
