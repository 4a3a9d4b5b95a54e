//! Scan target definitions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static description of one host or container to scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    /// Server identifier (the configuration section key)
    pub server_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_uuid: Option<Uuid>,

    /// Container identity, empty for a bare host
    #[serde(default)]
    pub container: Container,

    /// Cloud platform hint
    #[serde(default)]
    pub platform: Platform,

    /// OS family (e.g. "debian", "centos"), empty when not yet detected
    #[serde(default)]
    pub family: String,

    /// OS release string (e.g. "12", "8.9")
    #[serde(default)]
    pub release: String,

    /// Global unicast IPv4 addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv4_addrs: Vec<String>,

    /// Global unicast IPv6 addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_addrs: Vec<String>,
}

impl ScanTarget {
    /// Create a host target
    pub fn host(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ..Default::default()
        }
    }

    /// Create a container target running on `server_name`
    pub fn container(server_name: impl Into<String>, container: Container) -> Self {
        Self {
            server_name: server_name.into(),
            container,
            ..Default::default()
        }
    }

    pub fn with_family(mut self, family: impl Into<String>, release: impl Into<String>) -> Self {
        self.family = family.into();
        self.release = release.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.server_uuid = Some(uuid);
        self
    }

    /// Whether this target describes a container
    pub fn is_container(&self) -> bool {
        !self.container.container_id.is_empty()
    }

    /// Name of the container to resolve configuration scope for, if any
    pub fn container_name(&self) -> Option<&str> {
        if self.container.name.is_empty() {
            None
        } else {
            Some(&self.container.name)
        }
    }

    /// `server` for hosts, `container@server` for containers
    pub fn display(&self) -> String {
        if self.is_container() {
            format!("{}@{}", self.container.name, self.server_name)
        } else {
            self.server_name.clone()
        }
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Container identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    /// Runtime type (docker, lxd, lxc)
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

impl Container {
    pub fn new(container_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// Cloud platform information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// aws, azure, gcp or other
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance_id: String,
}

/// Scanning mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Package listing without root, updatable versions from the package manager
    #[default]
    Fast,
    /// Like fast, with commands that need root
    FastRoot,
    /// Everything the OS scanner supports, needs root
    Deep,
    /// No network access from the target: no cache refresh, no updatable versions
    Offline,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Fast => "fast",
            ScanMode::FastRoot => "fast-root",
            ScanMode::Deep => "deep",
            ScanMode::Offline => "offline",
        }
    }

    /// Whether this mode runs commands that need elevated privileges
    pub fn needs_privilege(&self) -> bool {
        matches!(self, ScanMode::FastRoot | ScanMode::Deep)
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, ScanMode::Offline)
    }
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ScanMode::Fast),
            "fast-root" | "fastroot" => Ok(ScanMode::FastRoot),
            "deep" => Ok(ScanMode::Deep),
            "offline" => Ok(ScanMode::Offline),
            other => Err(format!("unknown scan mode: {}", other)),
        }
    }
}
