//! Per-study decode, predict, upsample, composite and export.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};
use web_time::Instant;

use crate::attention::{AttentionGrid, AttentionTensor, AttentionUpsampler};
use crate::config::PipelineConfig;
use crate::enums::SourceFormat;
use crate::error::{ConfigError, PipelineError, PredictError};
use crate::exporter::{AnimatedArtifact, SequenceExporter};
use crate::overlay::{OverlayCompositor, OverlayFrame};
use crate::volume::Volume;
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

/// Cumulative risk for years one through six.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RiskScores(pub [f32; 6]);

impl RiskScores {
    /// Risk within `year` years, `1..=6`.
    pub fn year(&self, year: usize) -> Option<f32> {
        year.checked_sub(1).and_then(|i| self.0.get(i).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub scores: RiskScores,
    pub attention: Option<AttentionTensor>,
}

/// A risk model. Implementations are shared read-only across concurrent studies.
pub trait Predictor: Sync {
    fn predict(&self, volume: &Volume) -> Result<Prediction, PredictError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PredictionFile {
    scores: Vec<f32>,
    #[serde(default)]
    attention: Option<AttentionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AttentionFile {
    ensemble: usize,
    depth: usize,
    height: usize,
    width: usize,
    image: Vec<f32>,
    volume: Vec<f32>,
}

/// Replays a prediction computed elsewhere, read from JSON:
///
/// ```json
/// {
///   "scores": [0.01, 0.02, 0.03, 0.04, 0.05, 0.06],
///   "attention": {
///     "ensemble": 1, "depth": 25, "height": 16, "width": 16,
///     "image": [ ... 6400 log-space values ... ],
///     "volume": [ ... 25 log-space values ... ]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PrecomputedPredictor {
    prediction: Prediction,
}

impl PrecomputedPredictor {
    pub fn new(prediction: Prediction) -> Self {
        Self { prediction }
    }

    pub fn from_json_str(json: &str) -> Result<Self, PredictError> {
        let file: PredictionFile = serde_json::from_str(json)?;
        let scores: [f32; 6] = file.scores.as_slice().try_into().map_err(|_| {
            PredictError::Malformed(format!("expected 6 risk scores, got {}", file.scores.len()))
        })?;
        let attention = file
            .attention
            .map(|a| {
                let grid = AttentionGrid {
                    depth: a.depth,
                    height: a.height,
                    width: a.width,
                };
                AttentionTensor::from_flat(a.ensemble, grid, a.image, a.volume)
                    .map_err(|e| PredictError::Malformed(e.to_string()))
            })
            .transpose()?;
        Ok(Self::new(Prediction {
            scores: RiskScores(scores),
            attention,
        }))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PredictError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| PredictError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

impl Predictor for PrecomputedPredictor {
    fn predict(&self, _volume: &Volume) -> Result<Prediction, PredictError> {
        Ok(self.prediction.clone())
    }
}

/// One study on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Study {
    pub path: PathBuf,
    /// Detected from the path when `None`.
    pub format: Option<SourceFormat>,
}

impl Study {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Everything a successful study produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyOutcome {
    pub series_id: String,
    pub depth: usize,
    pub scores: RiskScores,
    /// Present when the model reported attention and an output directory was set.
    pub artifact: Option<AnimatedArtifact>,
}

impl From<VolumeLoaderError> for PipelineError {
    fn from(err: VolumeLoaderError) -> Self {
        match err {
            VolumeLoaderError::Decode(e) => Self::Decode(e),
            VolumeLoaderError::Geometry(e) => Self::Geometry(e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    upsampler: AttentionUpsampler,
    output_dir: Option<PathBuf>,
}

impl Pipeline {
    /// Fails when `config` does not validate.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            upsampler: AttentionUpsampler::new(config.attention)?,
            output_dir: None,
        })
    }

    /// Overlays are written to `dir/serie_<series id>.gif`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn loader(&self) -> VolumeLoader {
        VolumeLoader::new(self.config.decode, self.config.sort_by)
    }

    /// Upsamples `attention` onto `volume` and renders one frame per slice.
    pub fn overlay_frames(
        &self,
        volume: &Volume,
        attention: &AttentionTensor,
    ) -> Result<Vec<OverlayFrame>, PipelineError> {
        let (depth, height, width) = volume.dim();
        let upsampled = self.upsampler.upsample(attention, depth, height, width)?;
        Ok(OverlayCompositor::composite_all(
            &upsampled,
            self.config.overlay.gain,
        ))
    }

    /// Runs one study end to end. Any failure aborts the study; nothing
    /// partial is returned.
    pub fn run_study<P: Predictor + ?Sized>(
        &self,
        study: &Study,
        predictor: &P,
    ) -> Result<StudyOutcome, PipelineError> {
        let started = Instant::now();
        let volume = self.loader().load(&study.path, study.format)?;
        let prediction = predictor.predict(&volume)?;

        let artifact = match (&prediction.attention, &self.output_dir) {
            (Some(attention), Some(dir)) => {
                let frames = self.overlay_frames(&volume, attention)?;
                let name = format!("serie_{}", volume.series_id());
                Some(SequenceExporter::new(self.config.overlay.frame_delay_ms).export(&frames, dir, &name)?)
            }
            _ => None,
        };

        info!(
            series = volume.series_id(),
            depth = volume.depth(),
            overlay = artifact.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "study processed"
        );
        Ok(StudyOutcome {
            series_id: volume.series_id().to_string(),
            depth: volume.depth(),
            scores: prediction.scores,
            artifact,
        })
    }

    /// Runs independent studies in parallel. Each entry pairs the study path
    /// with its own result; one failing study does not affect the others.
    pub fn run_batch<P: Predictor + ?Sized>(
        &self,
        studies: &[Study],
        predictor: &P,
    ) -> Vec<(PathBuf, Result<StudyOutcome, PipelineError>)> {
        studies
            .par_iter()
            .map(|study| {
                let result = self.run_study(study, predictor);
                if let Err(err) = &result {
                    warn!(path = %study.path.display(), error = %err, "study failed");
                }
                (study.path.clone(), result)
            })
            .collect()
    }
}
