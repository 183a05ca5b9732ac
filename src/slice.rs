use ndarray::{Array2, ArrayView2};

/// One decoded 2D plane, single channel, in display-normalized units.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSlice {
    pixels: Array2<f32>,
    index: usize,
    bit_depth: u16,
    spacing: Option<(f32, f32)>,
    key: String,
}

impl RawSlice {
    pub fn new(pixels: Array2<f32>, index: usize, bit_depth: u16, key: impl Into<String>) -> Self {
        Self {
            pixels,
            index,
            bit_depth,
            spacing: None,
            key: key.into(),
        }
    }

    /// Attach the in-plane (row, column) spacing in millimetres.
    pub fn with_spacing(mut self, spacing: Option<(f32, f32)>) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn pixels(&self) -> ArrayView2<'_, f32> {
        self.pixels.view()
    }

    pub fn into_pixels(self) -> Array2<f32> {
        self.pixels
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    /// Acquisition index: instance number for DICOM, plane or file position otherwise.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bit depth of the stored source samples.
    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn spacing(&self) -> Option<(f32, f32)> {
        self.spacing
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
