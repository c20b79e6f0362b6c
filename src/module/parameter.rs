//! Step Parameters
//!
//! An ordered set of name/value pairs handed to a module at configuration
//! time. Names are case-normalized; setting an existing name replaces its
//! value in place, preserving the original position.

use serde::{Deserialize, Serialize};

/// A single named parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    value: String,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Ordered, case-normalized parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter. Names are trimmed and lowercased; an existing
    /// parameter of the same name is replaced in place.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let name = name.trim().to_lowercase();
        let value = value.into();

        if let Some(existing) = self.parameters.iter_mut().find(|p| p.name == name) {
            existing.value = value;
        } else {
            self.parameters.push(Parameter { name, value });
        }
        self
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns the value of a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.trim().to_lowercase();
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Returns the value of a parameter, or a default.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterates parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }
}
