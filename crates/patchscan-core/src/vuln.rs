//! Vulnerability findings detected against a scan target

use crate::severity::{Cvss, CvssVersion, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Data source a CVE record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CveContentType {
    Nvd,
    Jvn,
    RedHat,
    Debian,
    Ubuntu,
    Oracle,
    Amazon,
    Alpine,
    Unknown,
}

impl CveContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CveContentType::Nvd => "nvd",
            CveContentType::Jvn => "jvn",
            CveContentType::RedHat => "redhat",
            CveContentType::Debian => "debian",
            CveContentType::Ubuntu => "ubuntu",
            CveContentType::Oracle => "oracle",
            CveContentType::Amazon => "amazon",
            CveContentType::Alpine => "alpine",
            CveContentType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CveContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What one data source says about a CVE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveContent {
    pub source: CveContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss2: Option<Cvss>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss3: Option<Cvss>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub cwe_ids: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl CveContent {
    pub fn new(source: CveContentType) -> Self {
        Self {
            source,
            cvss2: None,
            cvss3: None,
            summary: String::new(),
            cwe_ids: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn with_cvss2(mut self, cvss: Cvss) -> Self {
        self.cvss2 = Some(cvss);
        self
    }

    pub fn with_cvss3(mut self, cvss: Cvss) -> Self {
        self.cvss3 = Some(cvss);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_cwe(mut self, cwe_id: impl Into<String>) -> Self {
        self.cwe_ids.push(cwe_id.into());
        self
    }
}

/// An affected package entry on a finding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStatus {
    pub name: String,
    /// The vendor has not shipped a fix yet
    #[serde(default)]
    pub not_fixed_yet: bool,
    /// Free-form vendor state ("Will not fix", "Fix deferred", ...)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fix_state: String,
}

impl PackageStatus {
    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            not_fixed_yet: false,
            fix_state: String::new(),
        }
    }

    pub fn not_fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            not_fixed_yet: true,
            fix_state: String::new(),
        }
    }

    pub fn with_fix_state(mut self, state: impl Into<String>) -> Self {
        self.fix_state = state.into();
        self
    }
}

/// How a finding was detected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Matched against the distribution's OVAL/security tracker data
    OvalMatch,
    /// Matched from the package manager's changelog
    ChangelogMatch,
    /// Matched by CPE name
    CpeNameMatch,
    #[default]
    Unknown,
}

/// One vulnerability detected against a scan target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnInfo {
    pub cve_id: String,
    #[serde(default)]
    pub confidence: Confidence,
    /// Per-source CVE details, may be empty
    #[serde(default)]
    pub cve_contents: BTreeMap<CveContentType, CveContent>,
    /// May be empty for OS/kernel-level advisories
    #[serde(default)]
    pub affected_packages: Vec<PackageStatus>,
}

impl VulnInfo {
    pub fn new(cve_id: impl Into<String>) -> Self {
        Self {
            cve_id: cve_id.into(),
            confidence: Confidence::Unknown,
            cve_contents: BTreeMap::new(),
            affected_packages: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: CveContent) -> Self {
        self.cve_contents.insert(content.source, content);
        self
    }

    pub fn with_package(mut self, status: PackageStatus) -> Self {
        self.affected_packages.push(status);
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Highest CVSS v2 score across all sources
    pub fn max_cvss2_score(&self) -> Option<(CveContentType, &Cvss)> {
        self.max_score(CvssVersion::V2)
    }

    /// Highest CVSS v3 score across all sources
    pub fn max_cvss3_score(&self) -> Option<(CveContentType, &Cvss)> {
        self.max_score(CvssVersion::V3)
    }

    fn max_score(&self, version: CvssVersion) -> Option<(CveContentType, &Cvss)> {
        self.cve_contents
            .values()
            .filter_map(|c| {
                let cvss = match version {
                    CvssVersion::V2 => c.cvss2.as_ref(),
                    CvssVersion::V3 => c.cvss3.as_ref(),
                };
                cvss.map(|s| (c.source, s))
            })
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
    }

    /// max(best v2, best v3); an absent score counts as 0
    pub fn max_cvss_score(&self) -> f64 {
        let v2 = self.max_cvss2_score().map(|(_, c)| c.score).unwrap_or(0.0);
        let v3 = self.max_cvss3_score().map(|(_, c)| c.score).unwrap_or(0.0);
        v2.max(v3)
    }

    pub fn severity(&self) -> Severity {
        Severity::from_cvss(self.max_cvss_score())
    }

    /// True when every affected package is unfixed, including when there are none
    pub fn all_not_fixed_yet(&self) -> bool {
        self.affected_packages.iter().all(|p| p.not_fixed_yet)
    }

    /// CWE ids across all sources, deduplicated
    pub fn cwe_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .cve_contents
            .values()
            .flat_map(|c| c.cwe_ids.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Findings keyed by CVE id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VulnInfos(BTreeMap<String, VulnInfo>);

impl VulnInfos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vuln: VulnInfo) {
        self.0.insert(vuln.cve_id.clone(), vuln);
    }

    /// Subset of findings for which `pred` holds
    pub fn find<F>(&self, mut pred: F) -> VulnInfos
    where
        F: FnMut(&VulnInfo) -> bool,
    {
        VulnInfos(
            self.0
                .iter()
                .filter(|(_, v)| pred(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Keep only the findings for which `pred` holds
    pub fn retain<F>(&mut self, mut pred: F)
    where
        F: FnMut(&VulnInfo) -> bool,
    {
        self.0.retain(|_, v| pred(v));
    }

    pub fn get(&self, cve_id: &str) -> Option<&VulnInfo> {
        self.0.get(cve_id)
    }

    pub fn contains(&self, cve_id: &str) -> bool {
        self.0.contains_key(cve_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VulnInfo> {
        self.0.values()
    }

    pub fn cve_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn count_by_severity(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for vuln in self.0.values() {
            *counts.entry(vuln.severity()).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<VulnInfo> for VulnInfos {
    fn from_iter<I: IntoIterator<Item = VulnInfo>>(iter: I) -> Self {
        VulnInfos(iter.into_iter().map(|v| (v.cve_id.clone(), v)).collect())
    }
}

/// Localized CWE description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cwe {
    pub cwe_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Entry of the CWE dictionary attached to a scan result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CweDictEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<Cwe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ja: Option<Cwe>,
    #[serde(default)]
    pub owasp_top_ten_2017: String,
}
