use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe: unavailable: {0}")]
    Unavailable(String),
    #[error("probe: io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable(detail.into())
    }
}

/// Host platform whose indicator table and wording apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Platform implied by the compile target.
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else {
            Platform::Android
        }
    }

    pub fn has_developer_mode(&self) -> bool {
        matches!(self, Platform::Android)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            other => Err(format!("unknown platform '{other}' (expected android or ios)")),
        }
    }
}

/// A child process the sandbox normally forbids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCapability {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProcessCapability {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

impl fmt::Display for ProcessCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How an environment value is compared against an indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "value", rename_all = "snake_case")]
pub enum Pattern {
    Prefix(String),
    Contains(String),
    Equals(String),
    /// Present and not empty, `0` or `false`.
    Truthy,
}

impl Pattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Prefix(p) => value.starts_with(p.as_str()),
            Pattern::Contains(p) => value.contains(p.as_str()),
            Pattern::Equals(p) => value == p,
            Pattern::Truthy => {
                let v = value.trim();
                !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Prefix(p) => write!(f, "starts with '{p}'"),
            Pattern::Contains(p) => write!(f, "contains '{p}'"),
            Pattern::Equals(p) => write!(f, "equals '{p}'"),
            Pattern::Truthy => write!(f, "is set"),
        }
    }
}

/// Result of a single signal evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Matched,
    NotMatched,
    /// The probe failed and was downgraded to not matched.
    Degraded,
}

impl ProbeOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, ProbeOutcome::Matched)
    }
}
