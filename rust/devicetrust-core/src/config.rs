use crate::probe::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "devicetrust.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTrustConfig {
    /// Overrides the platform implied by the compile target.
    #[serde(default)]
    pub platform: Option<Platform>,

    /// Replaces the built-in indicator table.
    #[serde(default)]
    pub indicator_table: Option<PathBuf>,

    /// Indicators appended to the active table.
    #[serde(default)]
    pub extra_indicators: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub write_probe: bool,
    #[serde(default = "default_true")]
    pub spawn_probe: bool,
    #[serde(default = "default_true")]
    pub url_scheme_probe: bool,

    #[serde(default = "default_build_prop_paths")]
    pub build_prop_paths: Vec<PathBuf>,
    #[serde(default = "default_library_maps_path")]
    pub library_maps_path: PathBuf,
}

impl Default for DeviceTrustConfig {
    fn default() -> Self {
        Self {
            platform: None,
            indicator_table: None,
            extra_indicators: None,
            write_probe: default_true(),
            spawn_probe: default_true(),
            url_scheme_probe: default_true(),
            build_prop_paths: default_build_prop_paths(),
            library_maps_path: default_library_maps_path(),
        }
    }
}

// Defaults
fn default_true() -> bool {
    true
}

fn default_build_prop_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/system/build.prop"),
        PathBuf::from("/vendor/build.prop"),
    ]
}

fn default_library_maps_path() -> PathBuf {
    PathBuf::from("/proc/self/maps")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("devicetrust"))
        .unwrap_or_else(|| PathBuf::from(".devicetrust"))
        .join(CONFIG_FILE_NAME)
}

impl DeviceTrustConfig {
    pub fn effective_platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: DeviceTrustConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self::default())
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: DeviceTrustConfig =
            serde_json::from_str(r#"{"platform": "ios", "spawn_probe": false}"#).unwrap();
        assert_eq!(config.platform, Some(Platform::Ios));
        assert!(!config.spawn_probe);
        assert!(config.write_probe);
        assert!(config.url_scheme_probe);
        assert_eq!(config.library_maps_path, PathBuf::from("/proc/self/maps"));
        assert_eq!(config.build_prop_paths.len(), 2);
    }

    #[test]
    fn test_persist_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE_NAME);

        let config = DeviceTrustConfig {
            platform: Some(Platform::Android),
            write_probe: false,
            ..DeviceTrustConfig::default()
        };
        config.persist(&path).unwrap();

        let loaded = DeviceTrustConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.platform, Some(Platform::Android));
        assert!(!loaded.write_probe);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let tmp = TempDir::new().unwrap();
        let config = DeviceTrustConfig::load_or_default(&tmp.path().join("absent.json")).unwrap();
        assert!(config.platform.is_none());
        assert_eq!(config.effective_platform(), Platform::current());
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{not json").unwrap();
        let err = DeviceTrustConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }
}
