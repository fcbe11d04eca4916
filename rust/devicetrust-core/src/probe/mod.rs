//! Platform signal probes.
//!
//! This module provides the collaborator interface the integrity assessor
//! consumes:
//! - Filesystem existence and privileged-write probes
//! - Installed package and loaded library lookups
//! - Forbidden process spawn and URL scheme probes
//! - Build/environment metadata and the developer-options flag
//!
//! # Implementations
//!
//! - **HostProbes**: reads the live device through `std` (Android and iOS
//!   processes, or any unix host for diagnostics)
//! - **DeviceSnapshot**: facts pre-collected by the host app and handed
//!   over as JSON
//!
//! Optional capabilities default to [`ProbeError::Unavailable`], which the
//! assessor downgrades to "not matched".

pub mod host;
pub mod snapshot;
pub mod types;

pub use host::HostProbes;
pub use snapshot::DeviceSnapshot;
pub use types::{Pattern, Platform, ProbeError, ProbeOutcome, ProcessCapability};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

// =============================================================================
// Collaborator Trait
// =============================================================================

/// Platform capabilities backing each [`SignalSource`].
///
/// "Not found" answers are `Ok(false)` / `Ok(None)`; errors are reserved for
/// genuine failures.
pub trait PlatformProbes: Send + Sync {
    /// Check whether a filesystem path exists.
    fn path_exists(&self, path: &str) -> Result<bool, ProbeError>;

    /// Try to create and remove a throwaway file inside `dir`.
    fn can_write(&self, _dir: &str) -> Result<bool, ProbeError> {
        Err(ProbeError::unavailable("privileged write probe"))
    }

    /// Check whether a package/bundle is installed.
    fn package_installed(&self, _identifier: &str) -> Result<bool, ProbeError> {
        Err(ProbeError::unavailable("package lookup"))
    }

    /// Check whether a dynamically loadable library is present in the process.
    fn library_loaded(&self, _name: &str) -> Result<bool, ProbeError> {
        Err(ProbeError::unavailable("library probe"))
    }

    /// Try to spawn a child process and report whether it succeeded.
    fn can_spawn(&self, _capability: &ProcessCapability) -> Result<bool, ProbeError> {
        Err(ProbeError::unavailable("process spawn probe"))
    }

    /// Check whether a URL scheme can be opened.
    fn url_scheme_resolvable(&self, _scheme: &str) -> Result<bool, ProbeError> {
        Err(ProbeError::unavailable("url scheme probe"))
    }

    /// Read a build/environment metadata value.
    fn environment_value(&self, key: &str) -> Result<Option<String>, ProbeError>;

    /// Read the global developer-options flag.
    fn developer_mode_enabled(&self) -> Result<bool, ProbeError> {
        Err(ProbeError::unavailable("developer mode flag"))
    }
}

// =============================================================================
// Signal Sources
// =============================================================================

/// One independent predicate contributing evidence to a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum SignalSource {
    FilesystemProbe { path: String },
    WriteProbe { path: String },
    PackageProbe { identifier: String },
    LibraryProbe { name: String },
    ProcessProbe { capability: ProcessCapability },
    UrlSchemeProbe { scheme: String },
    EnvironmentProbe { key: String, pattern: Pattern },
    /// Matches only when every nested source matches.
    AllOf { all: Vec<SignalSource> },
}

impl SignalSource {
    pub fn filesystem(path: &str) -> Self {
        Self::FilesystemProbe {
            path: path.to_string(),
        }
    }

    pub fn write(path: &str) -> Self {
        Self::WriteProbe {
            path: path.to_string(),
        }
    }

    pub fn package(identifier: &str) -> Self {
        Self::PackageProbe {
            identifier: identifier.to_string(),
        }
    }

    pub fn library(name: &str) -> Self {
        Self::LibraryProbe {
            name: name.to_string(),
        }
    }

    pub fn process(program: &str, args: &[&str]) -> Self {
        Self::ProcessProbe {
            capability: ProcessCapability::new(program, args),
        }
    }

    pub fn url_scheme(scheme: &str) -> Self {
        Self::UrlSchemeProbe {
            scheme: scheme.to_string(),
        }
    }

    pub fn environment(key: &str, pattern: Pattern) -> Self {
        Self::EnvironmentProbe {
            key: key.to_string(),
            pattern,
        }
    }

    pub fn all_of(sources: Vec<SignalSource>) -> Self {
        Self::AllOf { all: sources }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::FilesystemProbe { .. } => "filesystem",
            Self::WriteProbe { .. } => "write",
            Self::PackageProbe { .. } => "package",
            Self::LibraryProbe { .. } => "library",
            Self::ProcessProbe { .. } => "process",
            Self::UrlSchemeProbe { .. } => "url_scheme",
            Self::EnvironmentProbe { .. } => "environment",
            Self::AllOf { .. } => "all_of",
        }
    }

    fn query(&self, probes: &dyn PlatformProbes) -> Result<bool, ProbeError> {
        match self {
            Self::FilesystemProbe { path } => probes.path_exists(path),
            Self::WriteProbe { path } => probes.can_write(path),
            Self::PackageProbe { identifier } => probes.package_installed(identifier),
            Self::LibraryProbe { name } => probes.library_loaded(name),
            Self::ProcessProbe { capability } => probes.can_spawn(capability),
            Self::UrlSchemeProbe { scheme } => probes.url_scheme_resolvable(scheme),
            Self::EnvironmentProbe { key, pattern } => Ok(probes
                .environment_value(key)?
                .is_some_and(|value| pattern.matches(&value))),
            Self::AllOf { all } => {
                // A definite miss outranks a failed sibling.
                let mut failure = None;
                for source in all {
                    match source.query(probes) {
                        Ok(true) => {}
                        Ok(false) => return Ok(false),
                        Err(e) => failure = failure.or(Some(e)),
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None => Ok(!all.is_empty()),
                }
            }
        }
    }

    /// Evaluate against `probes`. Errors and panics inside the probe are
    /// reported as [`ProbeOutcome::Degraded`].
    pub fn evaluate(&self, probes: &dyn PlatformProbes) -> ProbeOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.query(probes))) {
            Ok(Ok(true)) => ProbeOutcome::Matched,
            Ok(Ok(false)) => ProbeOutcome::NotMatched,
            Ok(Err(e)) => {
                log::debug!("{} probe downgraded to not matched: {e}", self);
                ProbeOutcome::Degraded
            }
            Err(_) => {
                log::debug!("{} probe panicked; downgraded to not matched", self);
                ProbeOutcome::Degraded
            }
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilesystemProbe { path } => write!(f, "path {path}"),
            Self::WriteProbe { path } => write!(f, "write into {path}"),
            Self::PackageProbe { identifier } => write!(f, "package {identifier}"),
            Self::LibraryProbe { name } => write!(f, "library {name}"),
            Self::ProcessProbe { capability } => write!(f, "spawn '{capability}'"),
            Self::UrlSchemeProbe { scheme } => write!(f, "url scheme {scheme}://"),
            Self::EnvironmentProbe { key, pattern } => write!(f, "{key} {pattern}"),
            Self::AllOf { all } => {
                write!(f, "all of [")?;
                for (i, source) in all.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{source}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct EnvOnly(HashMap<&'static str, &'static str>);

    impl PlatformProbes for EnvOnly {
        fn path_exists(&self, path: &str) -> Result<bool, ProbeError> {
            if path.starts_with("/denied") {
                return Err(ProbeError::Io(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                )));
            }
            Ok(path == "/sbin/su")
        }

        fn environment_value(&self, key: &str) -> Result<Option<String>, ProbeError> {
            Ok(self.0.get(key).map(|v| v.to_string()))
        }

        fn library_loaded(&self, _name: &str) -> Result<bool, ProbeError> {
            panic!("library probe blew up");
        }
    }

    fn probes() -> EnvOnly {
        EnvOnly(HashMap::from([("ro.hardware", "ranchu")]))
    }

    #[test]
    fn test_filesystem_probe() {
        let p = probes();
        assert_eq!(
            SignalSource::filesystem("/sbin/su").evaluate(&p),
            ProbeOutcome::Matched
        );
        assert_eq!(
            SignalSource::filesystem("/system/xbin/su").evaluate(&p),
            ProbeOutcome::NotMatched
        );
    }

    #[test]
    fn test_io_error_is_degraded() {
        let outcome = SignalSource::filesystem("/denied/su").evaluate(&probes());
        assert_eq!(outcome, ProbeOutcome::Degraded);
        assert!(!outcome.is_match());
    }

    #[test]
    fn test_unavailable_capability_is_degraded() {
        let outcome = SignalSource::package("com.topjohnwu.magisk").evaluate(&probes());
        assert_eq!(outcome, ProbeOutcome::Degraded);
    }

    #[test]
    fn test_panicking_probe_is_degraded() {
        let outcome = SignalSource::library("frida-agent").evaluate(&probes());
        assert_eq!(outcome, ProbeOutcome::Degraded);
    }

    #[test]
    fn test_environment_probe() {
        let p = probes();
        let hit = SignalSource::environment("ro.hardware", Pattern::Contains("ranchu".into()));
        let miss = SignalSource::environment("ro.hardware", Pattern::Contains("goldfish".into()));
        let absent = SignalSource::environment("ro.product.name", Pattern::Equals("sdk".into()));
        assert!(hit.evaluate(&p).is_match());
        assert_eq!(miss.evaluate(&p), ProbeOutcome::NotMatched);
        assert_eq!(absent.evaluate(&p), ProbeOutcome::NotMatched);
    }

    #[test]
    fn test_all_of_requires_every_source() {
        let p = EnvOnly(HashMap::from([
            ("ro.product.brand", "generic_x86"),
            ("ro.product.device", "generic_x86"),
        ]));
        let generic = |key| SignalSource::environment(key, Pattern::Prefix("generic".into()));
        let both = SignalSource::all_of(vec![
            generic("ro.product.brand"),
            generic("ro.product.device"),
        ]);
        assert!(both.evaluate(&p).is_match());

        let brand_only = EnvOnly(HashMap::from([("ro.product.brand", "generic_x86")]));
        assert_eq!(both.evaluate(&brand_only), ProbeOutcome::NotMatched);

        assert_eq!(
            SignalSource::all_of(Vec::new()).evaluate(&p),
            ProbeOutcome::NotMatched
        );
    }

    #[test]
    fn test_all_of_miss_outranks_failure() {
        let p = probes();
        let miss = SignalSource::all_of(vec![
            SignalSource::package("com.topjohnwu.magisk"),
            SignalSource::filesystem("/system/xbin/su"),
        ]);
        assert_eq!(miss.evaluate(&p), ProbeOutcome::NotMatched);

        let degraded = SignalSource::all_of(vec![
            SignalSource::filesystem("/sbin/su"),
            SignalSource::package("com.topjohnwu.magisk"),
        ]);
        assert_eq!(degraded.evaluate(&p), ProbeOutcome::Degraded);
    }

    #[test]
    fn test_signal_source_json_shape() {
        let source = SignalSource::process("/system/xbin/which", &["su"]);
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["probe"], "process_probe");
        assert_eq!(json["capability"]["program"], "/system/xbin/which");
        let back: SignalSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
    }
}
