use std::path::Path;

use image::ImageReader;
use ndarray::Array2;
use tracing::debug;

use super::ChannelFilter;
use crate::error::DecodeError;
use crate::slice::RawSlice;

/// Reads one display-ready frame as 8-bit grayscale. No windowing.
pub(super) fn decode(
    path: &Path,
    index: usize,
    filter: &ChannelFilter,
) -> Result<Option<RawSlice>, DecodeError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let color = image.color();
    let channels = color.channel_count();

    if !filter.accepts(channels) {
        debug!(
            path = %path.display(),
            channels,
            expected = ?filter.expected_channels,
            "skipping frame with unexpected channel count"
        );
        return Ok(None);
    }

    let bit_depth = color.bits_per_pixel() / u16::from(channels);
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let pixels: Vec<f32> = gray.into_raw().into_iter().map(f32::from).collect();
    let pixels = Array2::from_shape_vec((height as usize, width as usize), pixels)
        .map_err(|e| DecodeError::container(path, e.to_string()))?;

    Ok(Some(RawSlice::new(pixels, index, bit_depth, file_key(path))))
}

pub(crate) fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
