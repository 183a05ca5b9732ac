use image::{ImageBuffer, Luma};
use ndarray::{Array3, ArrayView2, Axis};
use rayon::prelude::*;

/// An assembled study: slices stacked in the order they were supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    series_id: String,
    data: Array3<f32>,
    keys: Vec<String>,
    spacing: Option<(f32, f32, f32)>,
}

impl Volume {
    pub(crate) fn new(
        series_id: String,
        data: Array3<f32>,
        keys: Vec<String>,
        spacing: Option<(f32, f32, f32)>,
    ) -> Self {
        Self {
            series_id,
            data,
            keys,
            spacing,
        }
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Ordering key of every slice, in slice order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// (row, column, slice) spacing in millimetres, where known.
    pub fn spacing(&self) -> Option<(f32, f32, f32)> {
        self.spacing
    }

    pub(crate) fn set_slice_spacing(&mut self, slice_spacing: Option<f32>) {
        if let (Some((row, column, _)), Some(z)) = (self.spacing, slice_spacing) {
            self.spacing = Some((row, column, z));
        }
    }

    pub fn slice(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        (index < self.depth()).then(|| self.data.index_axis(Axis(0), index))
    }

    #[inline]
    fn normalize_to_u8(value: f32) -> u8 {
        value.clamp(0.0, 255.0) as u8
    }

    /// Renders slice `index` as an 8-bit grayscale image.
    pub fn slice_to_image(&self, index: usize) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.slice(index)?;
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }
}
