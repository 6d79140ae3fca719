use std::collections::BTreeMap;
use log::{info, warn};
use crate::config::QualityLadder;
use crate::inspector::StreamInfo;
use crate::validator::{RungValidator, ValidationVerdict};

/// Verdicts for a whole ladder, keyed by rung height
pub type LadderVerdicts = BTreeMap<u32, ValidationVerdict>;

/// Validate every rung of the ladder against one source.
///
/// Always returns one entry per rung. A rung the validator can't analyze gets
/// an "assume transcode" verdict and the remaining rungs are still validated.
pub fn validate_all<V: RungValidator + ?Sized>(
    validator: &V,
    info: &StreamInfo,
    ladder: &QualityLadder,
) -> LadderVerdicts {
    let mut verdicts = BTreeMap::new();

    for target in ladder.iter() {
        let verdict = match validator.validate_rung(info, target) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Rung {}: validation failed, assuming transcode: {}", target.label(), e);
                ValidationVerdict::analysis_failed(e)
            }
        };

        if verdict.is_valid() {
            info!("✅ Rung {}: source already compliant", target.label());
        } else {
            info!(
                "🎯 Rung {}: needs transcoding ({})",
                target.label(),
                verdict.reason().unwrap_or("no reason recorded")
            );
        }

        verdicts.insert(target.height, verdict);
    }

    verdicts
}
