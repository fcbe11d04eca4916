use crate::probe::{Platform, SignalSource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse ordinal classification driving caller-side policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Precedence: rooted, then emulator, then developer mode.
    pub fn from_flags(rooted: bool, emulator: bool, developer_mode: bool) -> Self {
        if rooted {
            RiskLevel::Critical
        } else if emulator {
            RiskLevel::High
        } else if developer_mode {
            RiskLevel::Medium
        } else {
            RiskLevel::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Root,
    Emulator,
    DeveloperMode,
}

impl Category {
    pub const ORDER: [Category; 3] = [Category::Root, Category::Emulator, Category::DeveloperMode];

    /// Fixed human-readable reason reported when the category fires.
    pub fn issue(&self, platform: Platform) -> &'static str {
        match (self, platform) {
            (Category::Root, Platform::Android) => "Device is rooted",
            (Category::Root, Platform::Ios) => "Device is jailbroken",
            (Category::Emulator, Platform::Android) => "Running on emulator",
            (Category::Emulator, Platform::Ios) => "Running on simulator",
            (Category::DeveloperMode, _) => "Developer mode enabled",
        }
    }
}

/// A signal that matched during an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub category: Category,
    pub source: SignalSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub platform: Platform,
    pub rooted: bool,
    pub emulator: bool,
    pub developer_mode: bool,
    pub issues: Vec<String>,
    pub risk_level: RiskLevel,
    pub evidence: Vec<Evidence>,
    pub degraded_probes: usize,
}

impl Verdict {
    /// Build a verdict whose issues and risk level follow from the flags.
    pub fn from_flags(
        platform: Platform,
        rooted: bool,
        emulator: bool,
        developer_mode: bool,
    ) -> Self {
        let developer_mode = developer_mode && platform.has_developer_mode();
        let issues = Category::ORDER
            .iter()
            .filter(|category| match category {
                Category::Root => rooted,
                Category::Emulator => emulator,
                Category::DeveloperMode => developer_mode,
            })
            .map(|category| category.issue(platform).to_string())
            .collect();

        Self {
            platform,
            rooted,
            emulator,
            developer_mode,
            issues,
            risk_level: RiskLevel::from_flags(rooted, emulator, developer_mode),
            evidence: Vec::new(),
            degraded_probes: 0,
        }
    }

    /// Developer mode alone is advisory and does not make a device insecure.
    pub fn is_secure(&self) -> bool {
        !self.rooted && !self.emulator
    }

    pub fn is_jailbroken(&self) -> bool {
        self.rooted && self.platform == Platform::Ios
    }

    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return "ok".to_string();
        }
        self.issues.join("; ")
    }
}

/// JSON contract handed to the UI shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAssessment {
    pub is_secure: bool,
    pub is_rooted: bool,
    pub is_jailbroken: bool,
    pub is_emulator: bool,
    pub is_developer_mode: bool,
    pub security_issues: Vec<String>,
    pub risk_level: RiskLevel,
}

impl From<&Verdict> for DeviceAssessment {
    fn from(v: &Verdict) -> Self {
        Self {
            is_secure: v.is_secure(),
            is_rooted: v.rooted,
            is_jailbroken: v.is_jailbroken(),
            is_emulator: v.emulator,
            is_developer_mode: v.developer_mode,
            security_issues: v.issues.clone(),
            risk_level: v.risk_level,
        }
    }
}

impl From<Verdict> for DeviceAssessment {
    fn from(v: Verdict) -> Self {
        Self::from(&v)
    }
}
