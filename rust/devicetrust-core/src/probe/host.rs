//! Live-device probes backed by `std`.
//!
//! Package lookups go through the app-data directory layout
//! (`/data/data/<package>` on Android) since the package manager is not
//! reachable from native code; hosts that can query it properly should hand
//! over a [`DeviceSnapshot`](super::DeviceSnapshot) instead.

use super::types::{Platform, ProbeError, ProcessCapability};
use super::PlatformProbes;
use crate::config::DeviceTrustConfig;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const ANDROID_APP_DATA_DIR: &str = "/data/data";

pub struct HostProbes {
    platform: Platform,
    build_props: HashMap<String, String>,
    library_maps_path: PathBuf,
}

impl HostProbes {
    pub fn new(config: &DeviceTrustConfig) -> Self {
        let platform = config.effective_platform();
        let build_props = match platform {
            Platform::Android => load_build_props(&config.build_prop_paths),
            Platform::Ios => HashMap::new(),
        };
        Self {
            platform,
            build_props,
            library_maps_path: config.library_maps_path.clone(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

fn load_build_props(paths: &[PathBuf]) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for path in paths {
        match fs::read_to_string(path) {
            Ok(raw) => {
                for (key, value) in parse_build_props(&raw) {
                    props.entry(key).or_insert(value);
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::debug!("build.prop {} unreadable: {e}", path.display()),
        }
    }
    props
}

/// Parse `key=value` lines as found in Android `build.prop` files.
pub fn parse_build_props(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn exists(path: &Path) -> Result<bool, ProbeError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ProbeError::Io(e)),
    }
}

impl PlatformProbes for HostProbes {
    fn path_exists(&self, path: &str) -> Result<bool, ProbeError> {
        exists(Path::new(path))
    }

    fn can_write(&self, dir: &str) -> Result<bool, ProbeError> {
        let probe = Path::new(dir).join(format!(".devicetrust-{}", uuid::Uuid::new_v4()));
        match fs::write(&probe, b"probe") {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&probe) {
                    log::warn!("failed to remove write probe {}: {e}", probe.display());
                }
                Ok(true)
            }
            Err(e) if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => {
                Ok(false)
            }
            Err(e) => Err(ProbeError::Io(e)),
        }
    }

    fn package_installed(&self, identifier: &str) -> Result<bool, ProbeError> {
        match self.platform {
            Platform::Android => exists(&Path::new(ANDROID_APP_DATA_DIR).join(identifier)),
            Platform::Ios => Err(ProbeError::unavailable(
                "bundle lookup requires the host application",
            )),
        }
    }

    fn library_loaded(&self, name: &str) -> Result<bool, ProbeError> {
        match fs::read_to_string(&self.library_maps_path) {
            Ok(maps) => Ok(maps.lines().any(|line| line.contains(name))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProbeError::unavailable(format!(
                "{} not present",
                self.library_maps_path.display()
            ))),
            Err(e) => Err(ProbeError::Io(e)),
        }
    }

    fn can_spawn(&self, capability: &ProcessCapability) -> Result<bool, ProbeError> {
        let output = Command::new(&capability.program)
            .args(&capability.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            // A located binary prints its path; an empty answer means nothing was found.
            Ok(out) => Ok(out.status.success() || !out.stdout.is_empty()),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                Ok(false)
            }
            Err(e) => Err(ProbeError::Io(e)),
        }
    }

    fn environment_value(&self, key: &str) -> Result<Option<String>, ProbeError> {
        if let Some(value) = self.build_props.get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host_config(tmp: &TempDir) -> DeviceTrustConfig {
        let build_prop = tmp.path().join("build.prop");
        fs::write(
            &build_prop,
            concat!(
                "# begin build properties\n",
                "ro.hardware=goldfish\n",
                "ro.product.model = Android SDK built for x86\n",
                "malformed\n",
            ),
        )
        .unwrap();
        let maps = tmp.path().join("maps");
        fs::write(
            &maps,
            "7f00-7f10 r-xp 00000000 fd:00 1 /data/local/tmp/frida-agent-64.so\n",
        )
        .unwrap();
        DeviceTrustConfig {
            platform: Some(Platform::Android),
            build_prop_paths: vec![build_prop, tmp.path().join("missing.prop")],
            library_maps_path: maps,
            ..DeviceTrustConfig::default()
        }
    }

    #[test]
    fn test_parse_build_props() {
        let props = parse_build_props("a=1\n# c=3\n=x\nb = two words \nnoequals");
        assert_eq!(
            props,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two words".to_string())
            ]
        );
    }

    #[test]
    fn test_host_reads_build_props() {
        let tmp = TempDir::new().unwrap();
        let probes = HostProbes::new(&host_config(&tmp));
        assert_eq!(
            probes.environment_value("ro.hardware").unwrap().as_deref(),
            Some("goldfish")
        );
        assert_eq!(
            probes.environment_value("ro.product.model").unwrap().as_deref(),
            Some("Android SDK built for x86")
        );
    }

    #[test]
    fn test_host_path_and_write_probes() {
        let tmp = TempDir::new().unwrap();
        let probes = HostProbes::new(&host_config(&tmp));
        let dir = tmp.path().to_string_lossy().to_string();
        assert!(probes.path_exists(&dir).unwrap());
        assert!(!probes
            .path_exists(&tmp.path().join("nope").to_string_lossy())
            .unwrap());
        assert!(probes.can_write(&dir).unwrap());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
        assert!(!probes
            .can_write(&tmp.path().join("absent").to_string_lossy())
            .unwrap());
    }

    #[test]
    fn test_host_library_probe() {
        let tmp = TempDir::new().unwrap();
        let probes = HostProbes::new(&host_config(&tmp));
        assert!(probes.library_loaded("frida-agent").unwrap());
        assert!(!probes.library_loaded("libsubstrate.so").unwrap());
    }

    #[test]
    fn test_host_spawn_missing_program() {
        let tmp = TempDir::new().unwrap();
        let probes = HostProbes::new(&host_config(&tmp));
        let capability = ProcessCapability::new("/nonexistent/devicetrust-su", &[]);
        assert!(!probes.can_spawn(&capability).unwrap());
    }

    #[test]
    fn test_host_ios_package_lookup_unavailable() {
        let config = DeviceTrustConfig {
            platform: Some(Platform::Ios),
            ..DeviceTrustConfig::default()
        };
        let probes = HostProbes::new(&config);
        assert!(matches!(
            probes.package_installed("com.saurik.Cydia"),
            Err(ProbeError::Unavailable(_))
        ));
    }
}
