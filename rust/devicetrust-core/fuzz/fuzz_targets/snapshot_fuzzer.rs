#![no_main]
use devicetrust_core::{DeviceSnapshot, IndicatorTable, IntegrityAssessor, Platform};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(snapshot) = DeviceSnapshot::from_json(raw) else {
        return;
    };

    for platform in [Platform::Android, Platform::Ios] {
        let assessor = IntegrityAssessor::new(
            Arc::new(snapshot.clone()),
            IndicatorTable::builtin(platform),
        );
        let verdict = assessor.assess();
        let flagged = [verdict.rooted, verdict.emulator, verdict.developer_mode]
            .iter()
            .filter(|f| **f)
            .count();
        assert_eq!(verdict.issues.len(), flagged);
    }
});
