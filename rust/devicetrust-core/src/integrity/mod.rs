//! Device integrity assessment.
//!
//! Runs every indicator of the active table against the platform probes and
//! folds the results into a [`Verdict`]:
//! - Root/jailbreak markers (paths, packages, libraries, forbidden
//!   operations, package-manager URL schemes)
//! - Emulator/simulator fingerprints
//! - The developer-options flag (Android only)
//!
//! Probe failures never abort an assessment; they are downgraded to "not
//! matched" and counted.

pub mod verdict;

pub use verdict::{Category, DeviceAssessment, Evidence, RiskLevel, Verdict};

use crate::config::DeviceTrustConfig;
use crate::indicators::IndicatorTable;
use crate::probe::{HostProbes, PlatformProbes, ProbeOutcome, SignalSource};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Clone)]
pub struct IntegrityAssessor {
    probes: Arc<dyn PlatformProbes>,
    table: Arc<IndicatorTable>,
}

#[derive(Default)]
struct Tally {
    evidence: Vec<Evidence>,
    degraded: usize,
}

impl Tally {
    fn run(
        &mut self,
        category: Category,
        sources: &[SignalSource],
        probes: &dyn PlatformProbes,
    ) -> bool {
        let mut matched = false;
        for source in sources {
            match source.evaluate(probes) {
                ProbeOutcome::Matched => {
                    log::debug!("{category:?} indicator matched: {source}");
                    self.evidence.push(Evidence {
                        category,
                        source: source.clone(),
                    });
                    matched = true;
                }
                ProbeOutcome::NotMatched => {}
                ProbeOutcome::Degraded => self.degraded += 1,
            }
        }
        matched
    }
}

impl IntegrityAssessor {
    pub fn new(probes: Arc<dyn PlatformProbes>, table: IndicatorTable) -> Self {
        Self {
            probes,
            table: Arc::new(table),
        }
    }

    /// Assessor reading the live device, with the table `config` selects.
    pub fn from_config(config: &DeviceTrustConfig) -> Self {
        Self::new(
            Arc::new(HostProbes::new(config)),
            IndicatorTable::from_config(config),
        )
    }

    pub fn table(&self) -> &IndicatorTable {
        &self.table
    }

    pub fn assess(&self) -> Verdict {
        let platform = self.table.platform;
        let probes = self.probes.as_ref();
        let mut tally = Tally::default();

        let rooted = tally.run(Category::Root, &self.table.root, probes);
        let emulator = tally.run(Category::Emulator, &self.table.emulator, probes);
        let developer_mode = platform.has_developer_mode() && {
            match panic::catch_unwind(AssertUnwindSafe(|| probes.developer_mode_enabled())) {
                Ok(Ok(enabled)) => enabled,
                Ok(Err(e)) => {
                    log::debug!("developer mode probe downgraded to not matched: {e}");
                    tally.degraded += 1;
                    false
                }
                Err(_) => {
                    log::debug!("developer mode probe panicked; downgraded to not matched");
                    tally.degraded += 1;
                    false
                }
            }
        };

        let mut verdict = Verdict::from_flags(platform, rooted, emulator, developer_mode);
        verdict.evidence = tally.evidence;
        verdict.degraded_probes = tally.degraded;

        log::info!(
            "device assessment: risk={} issues=[{}] degraded_probes={}",
            verdict.risk_level,
            verdict.summary(),
            verdict.degraded_probes
        );
        verdict
    }

    /// Run [`assess`](Self::assess) on a worker thread and hand back the
    /// verdict through a one-shot channel.
    pub fn spawn_assessment(&self) -> oneshot::Receiver<Verdict> {
        let (tx, rx) = oneshot::channel();
        let assessor = self.clone();
        let spawned = std::thread::Builder::new()
            .name("integrity-assess".to_string())
            .spawn(move || {
                // Receiver may have been dropped; nothing to report then.
                let _ = tx.send(assessor.assess());
            });
        if let Err(e) = spawned {
            log::warn!("failed to spawn assessment worker: {e}");
        }
        rx
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{DeviceSnapshot, Platform, ProbeError};

    fn android(snapshot: DeviceSnapshot) -> IntegrityAssessor {
        IntegrityAssessor::new(
            Arc::new(snapshot),
            IndicatorTable::builtin(Platform::Android),
        )
    }

    struct Broken;

    impl PlatformProbes for Broken {
        fn path_exists(&self, _path: &str) -> Result<bool, ProbeError> {
            Err(ProbeError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )))
        }

        fn environment_value(&self, _key: &str) -> Result<Option<String>, ProbeError> {
            panic!("metadata reader crashed");
        }

        fn developer_mode_enabled(&self) -> Result<bool, ProbeError> {
            panic!("settings provider crashed");
        }
    }

    #[test]
    fn test_clean_device() {
        let verdict = android(DeviceSnapshot::clean()).assess();
        assert!(verdict.is_secure());
        assert_eq!(verdict.risk_level, RiskLevel::None);
        assert!(verdict.issues.is_empty());
        assert!(verdict.evidence.is_empty());
        assert_eq!(verdict.degraded_probes, 0);
    }

    #[test]
    fn test_multiple_root_signals_yield_one_issue() {
        let snapshot = DeviceSnapshot::clean()
            .with_path("/sbin/su")
            .with_path("/system/app/Magisk.apk")
            .with_package("com.topjohnwu.magisk")
            .with_env("ro.hardware", "ranchu");
        let verdict = android(snapshot).assess();
        assert_eq!(verdict.issues, vec!["Device is rooted", "Running on emulator"]);
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert_eq!(
            verdict
                .evidence
                .iter()
                .filter(|e| e.category == Category::Root)
                .count(),
            3
        );
    }

    #[test]
    fn test_developer_mode_only() {
        let verdict = android(DeviceSnapshot::clean().with_developer_mode(true)).assess();
        assert!(verdict.is_secure());
        assert_eq!(verdict.risk_level, RiskLevel::Medium);
        assert_eq!(verdict.issues, vec!["Developer mode enabled"]);
    }

    #[test]
    fn test_ios_ignores_developer_flag() {
        let assessor = IntegrityAssessor::new(
            Arc::new(DeviceSnapshot::clean().with_developer_mode(true)),
            IndicatorTable::builtin(Platform::Ios),
        );
        let verdict = assessor.assess();
        assert!(!verdict.developer_mode);
        assert_eq!(verdict.risk_level, RiskLevel::None);
    }

    #[test]
    fn test_ios_simulator_flag() {
        let assessor = IntegrityAssessor::new(
            Arc::new(DeviceSnapshot::clean().with_env("SIMULATOR_DEVICE_NAME", "iPhone 15")),
            IndicatorTable::builtin(Platform::Ios),
        );
        let verdict = assessor.assess();
        assert!(verdict.emulator);
        assert_eq!(verdict.issues, vec!["Running on simulator"]);
        assert_eq!(verdict.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_failing_probes_never_abort() {
        let assessor =
            IntegrityAssessor::new(Arc::new(Broken), IndicatorTable::builtin(Platform::Android));
        let verdict = assessor.assess();
        let table = assessor.table();
        assert!(verdict.is_secure());
        assert_eq!(verdict.risk_level, RiskLevel::None);
        assert_eq!(
            verdict.degraded_probes,
            table.root.len() + table.emulator.len() + 1
        );
    }

    #[test]
    fn test_spawn_assessment_delivers_verdict() {
        let assessor = android(DeviceSnapshot::clean().with_path("/su/bin/su"));
        let verdict = assessor.spawn_assessment().blocking_recv().unwrap();
        assert!(verdict.rooted);
    }

    #[tokio::test]
    async fn test_spawn_assessment_awaitable() {
        let assessor = android(DeviceSnapshot::clean().with_env("ro.product.name", "sdk_x86"));
        let verdict = assessor.spawn_assessment().await.unwrap();
        assert!(verdict.emulator);
        assert_eq!(verdict.risk_level, RiskLevel::High);
    }
}
