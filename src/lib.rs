//! # dicom-attention
//!
//! Turns CT studies into normalized 8-bit volumes ready for a risk model,
//! and turns the model's coarse attention back into one overlay frame per
//! slice, written out as a looping GIF.
//!
//! Studies can be stored as
//!  - a directory of `.dcm` slices (ordered by InstanceNumber by default),
//!  - a directory of single-frame raster images (ordered by file name),
//!  - a single MetaImage volume (`.mha`, or `.mhd` with detached data).
//!
//! DICOM slices and raw-intensity containers go through the lung window
//! (center −600, width 1500) at 16 bit and are then divided down to 8 bit.
//! Raster frames and 8-bit containers are taken as display-ready.
//!
//! Attention arrives as `ensemble × 25 × 16 × 16` log-space image attention
//! plus `ensemble × 25` depth attention. Members are averaged after `exp`,
//! each depth bucket is weighted by its depth attention, and the result is
//! trilinearly resampled to the volume's own depth and in-plane resolution.
//! The red channel of each overlay frame carries `attention · gain · 256`,
//! saturated to 8 bit.
//!
//! Slices and attention planes are processed in parallel using rayon, and
//! so are independent studies in [`Pipeline::run_batch`].
//!
//! # Examples
//!
//! ## Rendering a precomputed prediction
//!
//! ```no_run
//! # use dicom_attention::{Pipeline, PipelineConfig, PrecomputedPredictor, Study};
//! let predictor = PrecomputedPredictor::load("prediction.json")
//!     .expect("should have read the prediction");
//! let outcome = Pipeline::new(PipelineConfig::default())
//!     .expect("default configuration is valid")
//!     .with_output_dir("overlays")
//!     .run_study(&Study::new("dicom"), &predictor)
//!     .expect("should have processed the study");
//! println!("{} slices, 1-year risk {:?}", outcome.depth, outcome.scores.year(1));
//! ```
//!
//! ## Loading a volume
//!
//! ```no_run
//! # use dicom_attention::{VolumeLoader, DecodeOptions, SortBy};
//! let volume = VolumeLoader::new(DecodeOptions::default(), SortBy::InstanceNumber)
//!     .load("dicom", None)
//!     .expect("should have loaded files from directory");
//! let image = volume
//!     .slice_to_image(volume.depth() / 2)
//!     .expect("should have returned the center slice");
//! image.save("result.png").expect("should have written the slice");
//! ```

pub mod assembler;
pub mod attention;
pub mod config;
pub mod convert;
pub mod decoder;
pub mod enums;
pub mod error;
pub mod exporter;
mod interpolator;
pub mod overlay;
pub mod pipeline;
pub mod slice;
pub mod volume;
pub mod volume_loader;
pub mod windowing;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
pub(crate) mod test_support;

pub use assembler::SeriesAssembler;
pub use attention::{AttentionGrid, AttentionTensor, AttentionUpsampler, UpsampledAttention};
pub use config::{OverlayConfig, PipelineConfig};
pub use decoder::{ChannelFilter, DecodeOptions, Decoder};
pub use enums::{ContainerWindowing, SortBy, SourceFormat};
pub use exporter::{AnimatedArtifact, SequenceExporter};
pub use overlay::{OverlayCompositor, OverlayFrame};
pub use pipeline::{Pipeline, PrecomputedPredictor, Prediction, Predictor, RiskScores, Study, StudyOutcome};
pub use slice::RawSlice;
pub use volume::Volume;
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
pub use windowing::Window;
