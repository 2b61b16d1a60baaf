//! Name-keyed operation registry.
//!
//! Maps an operation name to a factory producing a default-configured
//! instance. Frontends use it to build graphs from textual operator names;
//! the IR itself never consults it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::operation::Operation;
use crate::{Error, Result};

type Factory = Box<dyn Fn() -> Arc<dyn Operation> + Send + Sync>;

/// Registry of operation factories, keyed by operation name.
#[derive(Default)]
pub struct OperationRegistry {
    factories: HashMap<String, Factory>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. The key is taken from the operation it produces.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn register<F>(&mut self, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn Operation> + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidGraph(format!(
                "operation '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Instantiate a default-configured operation by name.
    pub fn create(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("names", &self.names())
            .finish()
    }
}
