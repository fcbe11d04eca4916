//! Facts collected by the host application and evaluated in-process.
//!
//! The Kotlin/Swift side can query the package manager, `Settings.Global`
//! or `UIApplication.canOpenURL` directly; it records the answers here and
//! the assessor runs the same indicator table over them. Anything the host
//! did not collect is reported as unavailable, never as a match.

use super::types::{ProbeError, ProcessCapability};
use super::PlatformProbes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Paths the host found present. `None` means the host did not probe.
    #[serde(default)]
    pub existing_paths: Option<BTreeSet<String>>,
    #[serde(default)]
    pub writable_paths: Option<BTreeSet<String>>,
    #[serde(default)]
    pub installed_packages: Option<BTreeSet<String>>,
    #[serde(default)]
    pub loaded_libraries: Option<Vec<String>>,
    /// Programs (`program` field of the capability) that spawned successfully.
    #[serde(default)]
    pub spawnable_programs: Option<BTreeSet<String>>,
    #[serde(default)]
    pub resolvable_url_schemes: Option<BTreeSet<String>>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub developer_mode: Option<bool>,
}

impl DeviceSnapshot {
    /// A snapshot whose every probe answered "not found".
    pub fn clean() -> Self {
        Self {
            existing_paths: Some(BTreeSet::new()),
            writable_paths: Some(BTreeSet::new()),
            installed_packages: Some(BTreeSet::new()),
            loaded_libraries: Some(Vec::new()),
            spawnable_programs: Some(BTreeSet::new()),
            resolvable_url_schemes: Some(BTreeSet::new()),
            environment: BTreeMap::new(),
            developer_mode: Some(false),
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.existing_paths
            .get_or_insert_with(BTreeSet::new)
            .insert(path.to_string());
        self
    }

    pub fn with_package(mut self, identifier: &str) -> Self {
        self.installed_packages
            .get_or_insert_with(BTreeSet::new)
            .insert(identifier.to_string());
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_developer_mode(mut self, enabled: bool) -> Self {
        self.developer_mode = Some(enabled);
        self
    }
}

fn lookup(set: &Option<BTreeSet<String>>, key: &str, what: &str) -> Result<bool, ProbeError> {
    set.as_ref()
        .map(|s| s.contains(key))
        .ok_or_else(|| ProbeError::unavailable(format!("{what} not collected by host")))
}

impl PlatformProbes for DeviceSnapshot {
    fn path_exists(&self, path: &str) -> Result<bool, ProbeError> {
        lookup(&self.existing_paths, path, "paths")
    }

    fn can_write(&self, dir: &str) -> Result<bool, ProbeError> {
        lookup(&self.writable_paths, dir, "writable paths")
    }

    fn package_installed(&self, identifier: &str) -> Result<bool, ProbeError> {
        lookup(&self.installed_packages, identifier, "packages")
    }

    fn library_loaded(&self, name: &str) -> Result<bool, ProbeError> {
        self.loaded_libraries
            .as_ref()
            .map(|libs| libs.iter().any(|lib| lib.contains(name)))
            .ok_or_else(|| ProbeError::unavailable("libraries not collected by host"))
    }

    fn can_spawn(&self, capability: &ProcessCapability) -> Result<bool, ProbeError> {
        lookup(&self.spawnable_programs, &capability.program, "spawn results")
    }

    fn url_scheme_resolvable(&self, scheme: &str) -> Result<bool, ProbeError> {
        lookup(&self.resolvable_url_schemes, scheme, "url schemes")
    }

    fn environment_value(&self, key: &str) -> Result<Option<String>, ProbeError> {
        Ok(self.environment.get(key).cloned())
    }

    fn developer_mode_enabled(&self) -> Result<bool, ProbeError> {
        self.developer_mode
            .ok_or_else(|| ProbeError::unavailable("developer mode not collected by host"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_host_json() {
        let raw = r#"{
            "existingPaths": ["/sbin/su"],
            "installedPackages": [],
            "loadedLibraries": ["/system/lib64/libsubstrate.so"],
            "environment": {"ro.hardware": "qcom"},
            "developerMode": true
        }"#;
        let snapshot = DeviceSnapshot::from_json(raw).unwrap();
        assert!(snapshot.path_exists("/sbin/su").unwrap());
        assert!(!snapshot.package_installed("com.topjohnwu.magisk").unwrap());
        assert!(snapshot.library_loaded("libsubstrate.so").unwrap());
        assert!(snapshot.developer_mode_enabled().unwrap());
        assert_eq!(
            snapshot.environment_value("ro.hardware").unwrap().as_deref(),
            Some("qcom")
        );
    }

    #[test]
    fn test_uncollected_facts_are_unavailable() {
        let snapshot = DeviceSnapshot::default();
        assert!(matches!(
            snapshot.url_scheme_resolvable("cydia"),
            Err(ProbeError::Unavailable(_))
        ));
        assert!(snapshot.developer_mode_enabled().is_err());
        assert_eq!(snapshot.environment_value("ro.hardware").unwrap(), None);
    }

    #[test]
    fn test_builders() {
        let snapshot = DeviceSnapshot::clean()
            .with_path("/system/xbin/su")
            .with_package("eu.chainfire.supersu")
            .with_env("ro.hardware", "ranchu")
            .with_developer_mode(true);
        assert!(snapshot.path_exists("/system/xbin/su").unwrap());
        assert!(snapshot.package_installed("eu.chainfire.supersu").unwrap());
        assert!(!snapshot.can_write("/system").unwrap());
        assert!(snapshot.developer_mode_enabled().unwrap());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(DeviceSnapshot::from_json("{\"existingPaths\": 3}").is_err());
    }
}
