pub mod config;
pub mod error;
pub mod ffprobe;
pub mod inspector;
pub mod validator;
pub mod decision;
pub mod params;
pub mod pipeline;

pub use config::{EncodeProfile, PipelineConfig, QualityLadder, QualityProfile, QualityTarget, ValidationPolicy};
pub use error::{InspectError, ProbeError, ValidationError};
pub use ffprobe::{FFProbeData, FFProbeFormat, FFProbeStream};
pub use inspector::{AudioStream, StreamInfo, SubtitleStream, VideoStream};
pub use validator::{QualityValidator, RungValidator, ValidationChecks, ValidationVerdict};
pub use decision::{validate_all, LadderVerdicts};
pub use params::{EncodeParameterSet, ParameterBuilder, RungRequest, VideoMode};
pub use pipeline::{PlannedRung, TranscodePipeline, TranscodePlan};
