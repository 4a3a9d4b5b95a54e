//! Per-target ignore configuration lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ignore settings resolved for one target or container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreScope {
    /// CVE ids to drop from the findings
    #[serde(default)]
    pub ignore_cves: Vec<String>,
    /// Regex patterns matched against affected package names
    #[serde(default)]
    pub ignore_pkgs_regexp: Vec<String>,
}

impl IgnoreScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_cve(mut self, cve_id: impl Into<String>) -> Self {
        self.ignore_cves.push(cve_id.into());
        self
    }

    pub fn ignore_pkg_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_pkgs_regexp.push(pattern.into());
        self
    }
}

/// Read-only source of per-target ignore configuration
pub trait ScopeLookup: Send + Sync {
    /// Resolve the scope for a server, or for a named container on it
    ///
    /// Returns `None` when the server, or the container within it, is unknown.
    fn resolve(&self, server_name: &str, container_name: Option<&str>) -> Option<IgnoreScope>;
}

/// In-memory scope table
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    servers: HashMap<String, ServerScope>,
}

#[derive(Debug, Clone, Default)]
struct ServerScope {
    scope: IgnoreScope,
    containers: HashMap<String, IgnoreScope>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the scope of a server
    pub fn server(mut self, server_name: impl Into<String>, scope: IgnoreScope) -> Self {
        self.servers.entry(server_name.into()).or_default().scope = scope;
        self
    }

    /// Register the scope of a container; the server is created if missing
    pub fn container(
        mut self,
        server_name: impl Into<String>,
        container_name: impl Into<String>,
        scope: IgnoreScope,
    ) -> Self {
        self.servers
            .entry(server_name.into())
            .or_default()
            .containers
            .insert(container_name.into(), scope);
        self
    }
}

impl ScopeLookup for ScopeTable {
    fn resolve(&self, server_name: &str, container_name: Option<&str>) -> Option<IgnoreScope> {
        let server = self.servers.get(server_name)?;
        match container_name {
            None => Some(server.scope.clone()),
            Some(name) => server.containers.get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_server_and_container() {
        let table = ScopeTable::new()
            .server("web01", IgnoreScope::new().ignore_cve("CVE-2020-1"))
            .container("web01", "nginx", IgnoreScope::new().ignore_pkg_pattern("^lib"));

        let host = table.resolve("web01", None).unwrap();
        assert_eq!(host.ignore_cves, vec!["CVE-2020-1".to_string()]);

        let container = table.resolve("web01", Some("nginx")).unwrap();
        assert!(container.ignore_cves.is_empty());
        assert_eq!(container.ignore_pkgs_regexp, vec!["^lib".to_string()]);
    }

    #[test]
    fn test_unknown_scope() {
        let table = ScopeTable::new().server("web01", IgnoreScope::new());
        assert!(table.resolve("db01", None).is_none());
        assert!(table.resolve("web01", Some("redis")).is_none());
    }
}
