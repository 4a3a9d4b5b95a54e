//! Installed package inventory

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An installed binary package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub release: String,
    /// Candidate newer version, empty if none
    #[serde(default)]
    pub new_version: String,
    #[serde(default)]
    pub new_release: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Name of the source package this binary was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = release.into();
        self
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn with_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    /// `version-release`, or just `version` when the release is empty
    pub fn full_version(&self) -> String {
        if self.release.is_empty() {
            self.version.clone()
        } else {
            format!("{}-{}", self.version, self.release)
        }
    }

    /// `new_version-new_release`, empty when no update is known
    pub fn full_new_version(&self) -> String {
        if self.new_release.is_empty() {
            self.new_version.clone()
        } else {
            format!("{}-{}", self.new_version, self.new_release)
        }
    }

    pub fn is_updatable(&self) -> bool {
        !self.new_version.is_empty()
    }

    /// Fill fields that are empty here from a later observation of the same package
    fn merge(&mut self, other: Package) {
        if self.version.is_empty() {
            self.version = other.version;
            self.release = other.release;
        }
        if !other.new_version.is_empty() {
            self.new_version = other.new_version;
            self.new_release = other.new_release;
        }
        if self.arch.is_empty() {
            self.arch = other.arch;
        }
        if self.repository.is_none() {
            self.repository = other.repository;
        }
        if self.source_name.is_none() {
            self.source_name = other.source_name;
        }
    }
}

/// Binary packages keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Packages(BTreeMap<String, Package>);

impl Packages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a package, merging with an existing entry of the same name
    pub fn upsert(&mut self, pkg: Package) {
        match self.0.get_mut(&pkg.name) {
            Some(existing) => existing.merge(pkg),
            None => {
                self.0.insert(pkg.name.clone(), pkg);
            }
        }
    }

    /// Insert a package, replacing any entry of the same name
    pub fn insert(&mut self, pkg: Package) -> Option<Package> {
        self.0.insert(pkg.name.clone(), pkg)
    }

    /// Record a candidate newer version for an installed package
    ///
    /// Returns false when the package is not installed.
    pub fn set_new_version(
        &mut self,
        name: &str,
        new_version: impl Into<String>,
        new_release: impl Into<String>,
    ) -> bool {
        match self.0.get_mut(name) {
            Some(pkg) => {
                pkg.new_version = new_version.into();
                pkg.new_release = new_release.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.0.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    /// Number of packages with a known newer version
    pub fn updatable_count(&self) -> usize {
        self.0.values().filter(|p| p.is_updatable()).count()
    }
}

impl FromIterator<Package> for Packages {
    fn from_iter<I: IntoIterator<Item = Package>>(iter: I) -> Self {
        let mut packages = Packages::new();
        for pkg in iter {
            packages.upsert(pkg);
        }
        packages
    }
}

/// A source package and the binaries built from it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub binary_names: BTreeSet<String>,
}

impl SrcPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            binary_names: BTreeSet::new(),
        }
    }

    pub fn with_binary(mut self, binary_name: impl Into<String>) -> Self {
        self.binary_names.insert(binary_name.into());
        self
    }
}

/// Source packages keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SrcPackages(BTreeMap<String, SrcPackage>);

impl SrcPackages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a source package, unioning binary names with an existing entry
    pub fn upsert(&mut self, src: SrcPackage) {
        match self.0.get_mut(&src.name) {
            Some(existing) => {
                if existing.version.is_empty() {
                    existing.version = src.version;
                }
                existing.binary_names.extend(src.binary_names);
            }
            None => {
                self.0.insert(src.name.clone(), src);
            }
        }
    }

    /// Overwrite the version of a known source package
    ///
    /// Returns false when the source package is not known.
    pub fn set_version(&mut self, name: &str, version: impl Into<String>) -> bool {
        match self.0.get_mut(name) {
            Some(src) => {
                src.version = version.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SrcPackage> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SrcPackage> {
        self.0.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_merges_instead_of_duplicating() {
        let mut packages = Packages::new();
        packages.upsert(Package::new("openssl", "3.0.2").with_release("0ubuntu1.10"));
        packages.upsert(Package::new("openssl", "").with_arch("amd64"));

        assert_eq!(packages.len(), 1);
        let pkg = packages.get("openssl").unwrap();
        assert_eq!(pkg.full_version(), "3.0.2-0ubuntu1.10");
        assert_eq!(pkg.arch, "amd64");
    }

    #[test]
    fn test_set_new_version() {
        let mut packages: Packages = vec![Package::new("curl", "7.81.0")].into_iter().collect();
        assert!(packages.set_new_version("curl", "7.81.0", "1ubuntu1.15"));
        assert!(!packages.set_new_version("wget", "1.21", ""));
        assert_eq!(packages.updatable_count(), 1);
        assert_eq!(packages.get("curl").unwrap().full_new_version(), "7.81.0-1ubuntu1.15");
    }

    #[test]
    fn test_src_packages_union_binaries() {
        let mut srcs = SrcPackages::new();
        srcs.upsert(SrcPackage::new("openssl", "3.0.2").with_binary("openssl"));
        srcs.upsert(SrcPackage::new("openssl", "3.0.2").with_binary("libssl3"));

        assert_eq!(srcs.len(), 1);
        let src = srcs.get("openssl").unwrap();
        assert_eq!(src.binary_names.len(), 2);
        assert!(src.binary_names.contains("libssl3"));
    }

    #[test]
    fn test_src_packages_set_version() {
        let mut srcs = SrcPackages::new();
        srcs.upsert(SrcPackage::new("kernel", "5.14.0-284.11.1.el9_2").with_binary("kernel"));
        // upsert keeps the first version it saw
        srcs.upsert(SrcPackage::new("kernel", "5.14.0-362.8.1.el9_3").with_binary("kernel"));
        assert_eq!(srcs.get("kernel").unwrap().version, "5.14.0-284.11.1.el9_2");

        assert!(srcs.set_version("kernel", "5.14.0-362.8.1.el9_3"));
        assert_eq!(srcs.get("kernel").unwrap().version, "5.14.0-362.8.1.el9_3");
        assert!(!srcs.set_version("glibc", "2.34"));
    }
}
