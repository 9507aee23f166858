//! Named filter factories.
//!
//! Filters listed in `shiro.filterClassNames` are resolved here by their
//! fully qualified name. The name used in chain rules is the last path
//! segment: `acme::filters::audit` installs as `audit`.

use std::sync::Arc;

use indexmap::IndexMap;

use super::AccessFilter;
use super::builtin::{self, BUILTIN_PATH};
use crate::AuthResult;
use crate::error::AuthError;

type FilterFactory = Arc<dyn Fn() -> Arc<dyn AccessFilter> + Send + Sync>;

/// Chain name for a qualified filter name: the text after the last `.` or `::`.
pub fn filter_name(qualified: &str) -> &str {
    let qualified = qualified.trim();
    let after_colons = qualified.rsplit("::").next().unwrap_or(qualified);
    after_colons.rsplit('.').next().unwrap_or(after_colons)
}

#[derive(Clone, Default)]
pub struct FilterRegistry {
    factories: IndexMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in filters under [`BUILTIN_PATH`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for filter in builtin::defaults() {
            let qualified = format!("{BUILTIN_PATH}::{}", filter.name());
            registry.register(qualified, move || Arc::clone(&filter));
        }
        registry
    }

    pub fn register<F>(&mut self, qualified_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn AccessFilter> + Send + Sync + 'static,
    {
        self.factories.insert(qualified_name.into(), Arc::new(factory));
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.factories.contains_key(qualified_name.trim())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the filter registered as `qualified_name`.
    ///
    /// Returns the chain name together with the filter.
    ///
    /// # Errors
    ///
    /// `Configuration` if nothing is registered under that name.
    pub fn instantiate(&self, qualified_name: &str) -> AuthResult<(String, Arc<dyn AccessFilter>)> {
        let qualified_name = qualified_name.trim();
        let factory = self.factories.get(qualified_name).ok_or_else(|| {
            AuthError::configuration(format!("no filter registered as '{qualified_name}'"))
        })?;
        Ok((filter_name(qualified_name).to_string(), factory()))
    }
}
