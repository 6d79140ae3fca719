//! Ties inspection, validation and parameter building together for one asset.

use std::path::Path;
use log::info;
use serde::Serialize;
use crate::config::{PipelineConfig, QualityLadder, QualityTarget};
use crate::decision;
use crate::error::InspectError;
use crate::inspector::{self, StreamInfo};
use crate::params::{EncodeParameterSet, ParameterBuilder, RungRequest};
use crate::validator::{QualityValidator, ValidationVerdict};

/// One rung of the plan, ready for the encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRung {
    pub target: QualityTarget,
    pub is_original_resolution: bool,
    pub verdict: ValidationVerdict,
    pub parameters: EncodeParameterSet,
}

/// Everything decided for one source asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscodePlan {
    pub source: StreamInfo,
    /// Rungs to produce, ascending by height
    pub rungs: Vec<PlannedRung>,
    /// Configured rungs left out because they would upscale
    pub skipped: Vec<QualityTarget>,
}

impl TranscodePlan {
    pub fn copy_count(&self) -> usize {
        self.rungs.iter().filter(|r| r.parameters.is_stream_copy()).count()
    }
}

pub struct TranscodePipeline<'a> {
    cfg: &'a PipelineConfig,
}

impl<'a> TranscodePipeline<'a> {
    pub fn new(cfg: &'a PipelineConfig) -> Self {
        TranscodePipeline { cfg }
    }

    /// Inspect the file once, then plan every rung from that single result
    pub async fn run(&self, file_path: &Path) -> Result<TranscodePlan, InspectError> {
        let stream_info = inspector::inspect(self.cfg, file_path).await?;
        Ok(self.plan(&stream_info))
    }

    /// Plan a ladder for an already-inspected source. Pure.
    pub fn plan(&self, stream_info: &StreamInfo) -> TranscodePlan {
        let (ladder, skipped) = self.select_rungs(stream_info);
        let original_index = self.original_rung_index(stream_info, &ladder);

        let validator = QualityValidator::new(&self.cfg.validation);
        let verdicts = decision::validate_all(&validator, stream_info, &ladder);
        let builder = ParameterBuilder::new(&self.cfg.encode_profile);

        let mut rungs = Vec::with_capacity(ladder.len());
        for (rung_index, target) in ladder.iter().enumerate() {
            let verdict = verdicts
                .get(&target.height)
                .cloned()
                .unwrap_or_else(|| ValidationVerdict::analysis_failed("rung missing from verdicts"));
            let is_original_resolution = original_index == Some(rung_index);

            let request = RungRequest {
                target,
                rung_index,
                ladder_len: ladder.len(),
                video_stream_index: stream_info.video.index,
                audio_streams: &stream_info.audio_streams,
                subtitle_streams: &stream_info.subtitle_streams,
                original: Some(stream_info),
                is_original_resolution,
                verdict: &verdict,
            };
            let parameters = builder.build(&request);

            rungs.push(PlannedRung {
                target: target.clone(),
                is_original_resolution,
                verdict,
                parameters,
            });
        }

        let plan = TranscodePlan {
            source: stream_info.clone(),
            rungs,
            skipped,
        };

        info!(
            "📊 Planned {} rung(s) for {} source: {} stream copy, {} transcode, {} skipped",
            plan.rungs.len(),
            stream_info.resolution(),
            plan.copy_count(),
            plan.rungs.len() - plan.copy_count(),
            plan.skipped.len()
        );

        plan
    }

    /// Split the configured ladder into rungs to produce and rungs that would upscale.
    ///
    /// The lowest rung is always kept so every asset gets at least one output.
    fn select_rungs(&self, stream_info: &StreamInfo) -> (QualityLadder, Vec<QualityTarget>) {
        if !self.cfg.skip_upscale {
            return (self.cfg.ladder.clone(), Vec::new());
        }

        let limit = stream_info
            .video
            .height
            .saturating_add(self.cfg.validation.resolution_tolerance_px);
        let (mut keep, mut skipped): (Vec<QualityTarget>, Vec<QualityTarget>) = self
            .cfg
            .ladder
            .iter()
            .cloned()
            .partition(|t| t.height <= limit);

        if keep.is_empty() && !skipped.is_empty() {
            keep.push(skipped.remove(0));
        }

        (QualityLadder::new(keep), skipped)
    }

    /// The rung whose height matches the source within tolerance, closest first
    fn original_rung_index(&self, stream_info: &StreamInfo, ladder: &QualityLadder) -> Option<usize> {
        let tolerance = self.cfg.validation.resolution_tolerance_px;
        ladder
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.height.abs_diff(stream_info.video.height)))
            .filter(|(_, diff)| *diff <= tolerance)
            .min_by_key(|(_, diff)| *diff)
            .map(|(i, _)| i)
    }
}
