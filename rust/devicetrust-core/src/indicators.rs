//! Per-platform indicator tables.
//!
//! Root markers, tamper packages and virtual-device fingerprints are data:
//! new indicators ship as a JSON table (or an extra table merged on top of
//! the built-in one) without touching the assessor.

use crate::config::DeviceTrustConfig;
use crate::probe::{Pattern, Platform, SignalSource};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Version of the built-in tables. Bumped whenever an indicator changes.
pub const BUILTIN_TABLE_VERSION: u32 = 1;

const ANDROID_SU_PATHS: &[&str] = &[
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/su/bin/su",
    "/system/xbin/daemonsu",
    "/system/etc/init.d/99telekineto",
    "/system/app/Magisk.apk",
];

const ANDROID_ROOT_PACKAGES: &[&str] = &[
    "com.topjohnwu.magisk",
    "com.koushikdutta.superuser",
    "com.noshufou.android.su",
    "eu.chainfire.supersu",
    "com.thirdparty.superuser",
    "com.yellowes.su",
    "com.devadvance.rootcloak",
    "com.devadvance.rootcloakplus",
    "de.robv.android.xposed.installer",
    "com.saurik.substrate",
];

const ANDROID_TAMPER_LIBRARIES: &[&str] = &["libsubstrate.so", "libxposed_art.so", "frida-agent"];

const IOS_JAILBREAK_PATHS: &[&str] = &[
    "/Applications/Cydia.app",
    "/Applications/Sileo.app",
    "/Applications/Zebra.app",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/etc/apt",
    "/private/var/lib/apt",
    "/private/var/lib/cydia",
    "/private/var/stash",
];

const IOS_TAMPER_LIBRARIES: &[&str] = &["MobileSubstrate", "SubstrateLoader", "FridaGadget"];

const IOS_PACKAGE_MANAGER_SCHEMES: &[&str] = &["cydia", "sileo", "zbra"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorTable {
    pub version: u32,
    pub platform: Platform,
    #[serde(default)]
    pub root: Vec<SignalSource>,
    #[serde(default)]
    pub emulator: Vec<SignalSource>,
}

impl IndicatorTable {
    pub fn builtin(platform: Platform) -> Self {
        match platform {
            Platform::Android => android_table(),
            Platform::Ios => ios_table(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read indicator table: {}", path.display()))?;
        let table: IndicatorTable = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid indicator table: {}", path.display()))?;
        Ok(table)
    }

    /// Append indicators from `extra`, skipping ones already present.
    pub fn merge(&mut self, extra: IndicatorTable) -> Result<()> {
        if extra.platform != self.platform {
            bail!(
                "cannot merge {} indicators into a {} table",
                extra.platform,
                self.platform
            );
        }
        for source in extra.root {
            if !self.root.contains(&source) {
                self.root.push(source);
            }
        }
        for source in extra.emulator {
            if !self.emulator.contains(&source) {
                self.emulator.push(source);
            }
        }
        self.version = self.version.max(extra.version);
        Ok(())
    }

    /// Drop the probe techniques switched off in `config`.
    pub fn without_disabled_probes(mut self, config: &DeviceTrustConfig) -> Self {
        let keep = |source: &SignalSource| match source {
            SignalSource::WriteProbe { .. } => config.write_probe,
            SignalSource::ProcessProbe { .. } => config.spawn_probe,
            SignalSource::UrlSchemeProbe { .. } => config.url_scheme_probe,
            _ => true,
        };
        self.root.retain(keep);
        self.emulator.retain(keep);
        self
    }

    /// Resolve the table `config` asks for, falling back to the built-in
    /// table when a configured file cannot be used.
    pub fn from_config(config: &DeviceTrustConfig) -> Self {
        let platform = config.effective_platform();
        let mut table = match &config.indicator_table {
            Some(path) => match Self::load(path) {
                Ok(table) if table.platform == platform => table,
                Ok(table) => {
                    log::warn!(
                        "indicator table {} targets {}, expected {platform}; using built-in table",
                        path.display(),
                        table.platform
                    );
                    Self::builtin(platform)
                }
                Err(e) => {
                    log::warn!("{e:#}; using built-in table");
                    Self::builtin(platform)
                }
            },
            None => Self::builtin(platform),
        };

        if let Some(path) = &config.extra_indicators {
            match Self::load(path).and_then(|extra| table.merge(extra)) {
                Ok(()) => {}
                Err(e) => log::warn!("extra indicators ignored: {e:#}"),
            }
        }

        table.without_disabled_probes(config)
    }
}

fn android_table() -> IndicatorTable {
    let mut root: Vec<SignalSource> = ANDROID_SU_PATHS
        .iter()
        .map(|path| SignalSource::filesystem(path))
        .collect();
    root.extend(
        ANDROID_ROOT_PACKAGES
            .iter()
            .map(|pkg| SignalSource::package(pkg)),
    );
    root.extend(
        ANDROID_TAMPER_LIBRARIES
            .iter()
            .map(|lib| SignalSource::library(lib)),
    );
    root.push(SignalSource::write("/system"));
    root.push(SignalSource::process("/system/xbin/which", &["su"]));

    let prefix = |key: &str, v: &str| SignalSource::environment(key, Pattern::Prefix(v.into()));
    let contains = |key: &str, v: &str| SignalSource::environment(key, Pattern::Contains(v.into()));
    let equals = |key: &str, v: &str| SignalSource::environment(key, Pattern::Equals(v.into()));

    let mut emulator = vec![
        prefix("ro.build.fingerprint", "generic"),
        prefix("ro.build.fingerprint", "unknown"),
        contains("ro.product.model", "google_sdk"),
        contains("ro.product.model", "Emulator"),
        contains("ro.product.model", "Android SDK built for x86"),
        contains("ro.product.manufacturer", "Genymotion"),
    ];
    for product in [
        "sdk",
        "sdk_google",
        "google_sdk",
        "sdk_x86",
        "vbox86p",
        "emulator",
        "simulator",
    ] {
        emulator.push(equals("ro.product.name", product));
    }
    emulator.push(contains("ro.hardware", "goldfish"));
    emulator.push(contains("ro.hardware", "ranchu"));
    emulator.push(SignalSource::all_of(vec![
        prefix("ro.product.brand", "generic"),
        prefix("ro.product.device", "generic"),
    ]));

    IndicatorTable {
        version: BUILTIN_TABLE_VERSION,
        platform: Platform::Android,
        root,
        emulator,
    }
}

fn ios_table() -> IndicatorTable {
    let mut root: Vec<SignalSource> = IOS_JAILBREAK_PATHS
        .iter()
        .map(|path| SignalSource::filesystem(path))
        .collect();
    root.extend(IOS_TAMPER_LIBRARIES.iter().map(|lib| SignalSource::library(lib)));
    root.push(SignalSource::write("/private"));
    root.push(SignalSource::process("/bin/sh", &["-c", "true"]));
    root.extend(
        IOS_PACKAGE_MANAGER_SCHEMES
            .iter()
            .map(|scheme| SignalSource::url_scheme(scheme)),
    );

    IndicatorTable {
        version: BUILTIN_TABLE_VERSION,
        platform: Platform::Ios,
        root,
        emulator: vec![
            SignalSource::environment("SIMULATOR_DEVICE_NAME", Pattern::Truthy),
            SignalSource::environment("SIMULATOR_UDID", Pattern::Truthy),
        ],
    }
}
