//! Module Registry
//!
//! Maps module names to their capability flags and an instance factory.
//! The registry is owned by the workflow (or the task-executor CLI) and
//! built explicitly; there is no runtime discovery.

use std::collections::HashMap;

use crate::error::EngineError;

use super::shell::ShellModule;
use super::{Module, ModuleCapabilities};

type ModuleFactory = Box<dyn Fn() -> Box<dyn Module> + Send + Sync>;

struct Registration {
    capabilities: ModuleCapabilities,
    factory: ModuleFactory,
}

/// Registry of available module implementations.
pub struct ModuleRegistry {
    modules: HashMap<String, Registration>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in modules registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("shell", ModuleCapabilities::default(), || {
                Box::new(ShellModule::new())
            })
            .expect("built-in registration cannot collide in an empty registry");
        registry
    }

    /// Registers a module under a (case-insensitive) name.
    pub fn register<F>(
        &mut self,
        name: &str,
        capabilities: ModuleCapabilities,
        factory: F,
    ) -> Result<(), EngineError>
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        let name = name.trim().to_lowercase();
        if self.modules.contains_key(&name) {
            return Err(EngineError::DuplicateModule(name));
        }

        self.modules.insert(
            name,
            Registration {
                capabilities,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Returns true if a module of this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(&name.trim().to_lowercase())
    }

    /// Returns the capability flags of a registered module.
    pub fn capabilities(&self, name: &str) -> Option<ModuleCapabilities> {
        self.modules
            .get(&name.trim().to_lowercase())
            .map(|r| r.capabilities)
    }

    /// Creates a fresh, unconfigured instance of a registered module.
    pub fn create(&self, name: &str) -> Result<Box<dyn Module>, EngineError> {
        let normalized = name.trim().to_lowercase();
        self.modules
            .get(&normalized)
            .map(|r| (r.factory)())
            .ok_or(EngineError::UnknownModule(normalized))
    }

    /// Returns the registered module names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
