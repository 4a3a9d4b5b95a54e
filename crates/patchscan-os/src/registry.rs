//! Scanner registry - maps OS family names to scanner factories

use crate::alpine::{self, AlpineScanner};
use crate::debian::{self, DebianScanner};
use crate::redhat::{self, RedHatScanner};
use crate::scanner::{OsScanner, ScanOptions};
use crate::unknown::UnknownScanner;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fresh scanner for one target
pub type ScannerFactory = Arc<dyn Fn(ScanOptions) -> Box<dyn OsScanner> + Send + Sync>;

/// Wrap a constructor such as `DebianScanner::new` into a factory
pub fn scanner_factory<S, F>(build: F) -> ScannerFactory
where
    S: OsScanner + 'static,
    F: Fn(ScanOptions) -> S + Send + Sync + 'static,
{
    Arc::new(move |options| Box::new(build(options)) as Box<dyn OsScanner>)
}

/// Registry of OS scanner variants
///
/// Family names are matched case-insensitively. Anything not registered is
/// handled by the fallback, which reports an empty inventory.
pub struct ScannerRegistry {
    /// Factories indexed by lower-cased family
    factories: HashMap<String, ScannerFactory>,
    fallback: ScannerFactory,
}

impl ScannerRegistry {
    /// Create a registry with only the fallback
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            fallback: scanner_factory(UnknownScanner::new),
        }
    }

    /// Create a registry with every built-in family
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_all(debian::FAMILIES, scanner_factory(DebianScanner::new));
        registry.register_all(redhat::FAMILIES, scanner_factory(RedHatScanner::new));
        registry.register_all(alpine::FAMILIES, scanner_factory(AlpineScanner::new));

        registry
    }

    /// Register a factory for a family, replacing any previous one
    pub fn register(&mut self, family: &str, factory: ScannerFactory) {
        self.factories.insert(family.to_ascii_lowercase(), factory);
    }

    pub fn register_all(&mut self, families: &[&str], factory: ScannerFactory) {
        for family in families {
            self.register(family, factory.clone());
        }
    }

    /// Build the scanner for `options.family`
    pub fn create(&self, options: ScanOptions) -> Box<dyn OsScanner> {
        let family = options.family.to_ascii_lowercase();
        match self.factories.get(&family) {
            Some(factory) => factory(options),
            None => (self.fallback)(options),
        }
    }

    pub fn is_supported(&self, family: &str) -> bool {
        self.factories.contains_key(&family.to_ascii_lowercase())
    }

    /// Registered family names, sorted
    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
