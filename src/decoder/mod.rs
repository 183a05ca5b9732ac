//! Source decoders.
//!
//! Every source format is a variant of [`Decoder`]; all of them hand back
//! [`RawSlice`]s so assembly never needs to know where the pixels came from.

pub(crate) mod dicom;
pub mod meta_image;
mod raster;

use std::path::Path;

use serde::Deserialize;

use crate::enums::{ContainerWindowing, SourceFormat};
use crate::error::DecodeError;
use crate::slice::RawSlice;
use crate::windowing::Window;

pub use dicom::{DicomHeader, read_header};

/// Frames whose channel count differs from `expected_channels` are skipped.
///
/// The default expects nothing and keeps every frame. A directory of RGB
/// overlay frames with a stray grayscale frame only drops that frame under
/// [`ChannelFilter::exactly(3)`](ChannelFilter::exactly).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelFilter {
    pub expected_channels: Option<u8>,
}

impl ChannelFilter {
    pub const ANY: ChannelFilter = ChannelFilter {
        expected_channels: None,
    };

    pub fn exactly(channels: u8) -> Self {
        Self {
            expected_channels: Some(channels),
        }
    }

    pub fn accepts(&self, channels: u8) -> bool {
        self.expected_channels.is_none_or(|expected| expected == channels)
    }
}

/// How sources are turned into 8-bit slices.
///
/// Defaults to the lung window, a channel filter that keeps every frame
/// (set `channel_filter` to [`ChannelFilter::exactly`] to drop frames with
/// another channel count) and windowing containers only when they hold
/// raw intensities.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeOptions {
    pub window: Window,
    pub channel_filter: ChannelFilter,
    pub container_windowing: ContainerWindowing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoder {
    Raster(DecodeOptions),
    Dicom(DecodeOptions),
    VolumeContainer(DecodeOptions),
}

impl Decoder {
    pub fn new(format: SourceFormat, options: DecodeOptions) -> Self {
        match format {
            SourceFormat::Raster => Self::Raster(options),
            SourceFormat::Dicom => Self::Dicom(options),
            SourceFormat::VolumeContainer => Self::VolumeContainer(options),
        }
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            Self::Raster(_) => SourceFormat::Raster,
            Self::Dicom(_) => SourceFormat::Dicom,
            Self::VolumeContainer(_) => SourceFormat::VolumeContainer,
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        match self {
            Self::Raster(options) | Self::Dicom(options) | Self::VolumeContainer(options) => {
                options
            }
        }
    }

    /// Decode one source unit.
    ///
    /// `index` is the position of the unit within its study and becomes the
    /// slice index wherever the source carries no acquisition index of its
    /// own. Raster frames rejected by the channel filter yield an empty list.
    pub fn decode(&self, path: &Path, index: usize) -> Result<Vec<RawSlice>, DecodeError> {
        match self {
            Self::Raster(options) => {
                Ok(raster::decode(path, index, &options.channel_filter)?.into_iter().collect())
            }
            Self::Dicom(options) => Ok(vec![dicom::decode(path, index, &options.window)?]),
            Self::VolumeContainer(options) => meta_image::decode(path, options),
        }
    }
}

/// Guess the source format from a path: directories are scanned for DICOM
/// or raster files, single files must be MetaImage containers.
pub fn detect_format(path: &Path) -> Result<SourceFormat, DecodeError> {
    if path.is_dir() {
        let mut has_raster = false;
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if has_extension(&entry_path, &["dcm"]) {
                return Ok(SourceFormat::Dicom);
            }
            has_raster |= has_extension(&entry_path, RASTER_EXTENSIONS);
        }
        if has_raster {
            return Ok(SourceFormat::Raster);
        }
        return Err(DecodeError::NoValidImages(path.to_path_buf()));
    }
    if has_extension(path, meta_image::EXTENSIONS) {
        return Ok(SourceFormat::VolumeContainer);
    }
    Err(DecodeError::Unsupported {
        path: path.to_path_buf(),
        reason: "expected a directory of slices or a .mha/.mhd volume".to_string(),
    })
}

pub(crate) const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Case-insensitive extension match.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_filter_accepts() {
        assert!(ChannelFilter::ANY.accepts(1));
        assert!(ChannelFilter::ANY.accepts(4));
        assert!(ChannelFilter::exactly(3).accepts(3));
        assert!(!ChannelFilter::exactly(3).accepts(1));
    }

    #[test]
    fn detects_formats() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            detect_format(dir.path()),
            Err(DecodeError::NoValidImages(_))
        ));

        std::fs::write(dir.path().join("a.png"), b"").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::Raster);

        std::fs::write(dir.path().join("b.DCM"), b"").unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), SourceFormat::Dicom);

        let mha = dir.path().join("volume.mha");
        assert_eq!(detect_format(&mha).unwrap(), SourceFormat::VolumeContainer);
        assert!(detect_format(&dir.path().join("volume.nii")).is_err());
    }

    #[test]
    fn decoder_round_trips_its_format() {
        for format in [
            SourceFormat::Raster,
            SourceFormat::Dicom,
            SourceFormat::VolumeContainer,
        ] {
            assert_eq!(Decoder::new(format, DecodeOptions::default()).format(), format);
        }
    }
}
