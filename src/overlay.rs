use image::RgbImage;
use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::attention::UpsampledAttention;

/// One RGB overlay frame; attention lives in the red channel only.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    image: RgbImage,
}

impl OverlayFrame {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn red(&self, x: u32, y: u32) -> Option<u8> {
        self.image.get_pixel_checked(x, y).map(|p| p.0[0])
    }
}

pub struct OverlayCompositor;

impl OverlayCompositor {
    /// Maps one attention value to its red intensity.
    ///
    /// `a · gain · 256` clamped to `[0, 256]`; the float to `u8` cast
    /// saturates, so the top of the range lands on 255 and NaN on 0.
    #[inline]
    pub fn intensity(value: f32, gain: f32) -> u8 {
        (value * gain * 256.0).clamp(0.0, 256.0) as u8
    }

    pub fn composite(attention: ArrayView2<f32>, gain: f32) -> OverlayFrame {
        let (height, width) = attention.dim();
        let mut image = RgbImage::new(width as u32, height as u32);
        image
            .par_chunks_mut(3)
            .enumerate()
            .for_each(|(i, pixel)| pixel[0] = Self::intensity(attention[[i / width, i % width]], gain));
        OverlayFrame { image }
    }

    /// One frame per slice, in slice order.
    pub fn composite_all(attention: &UpsampledAttention, gain: f32) -> Vec<OverlayFrame> {
        let maps = attention.maps();
        maps.outer_iter()
            .into_par_iter()
            .map(|slice| Self::composite(slice, gain))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn red_channel_carries_attention() {
        let attention = Array2::from_shape_vec((1, 3), vec![0.0, 0.1, 0.2]).unwrap();
        let frame = OverlayCompositor::composite(attention.view(), 3.0);
        assert_eq!(frame.dimensions(), (3, 1));
        assert_eq!(frame.red(0, 0), Some(0));
        // 0.1 * 3 * 256 = 76.8
        assert_eq!(frame.red(1, 0), Some(76));
        assert_eq!(frame.red(2, 0), Some(153));
        assert!(frame.image().pixels().all(|p| p.0[1] == 0 && p.0[2] == 0));
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        assert_eq!(OverlayCompositor::intensity(1.0, 3.0), 255);
        assert_eq!(OverlayCompositor::intensity(1e9, 3.0), 255);
        assert_eq!(OverlayCompositor::intensity(-4.0, 3.0), 0);
        assert_eq!(OverlayCompositor::intensity(f32::NAN, 3.0), 0);
        assert_eq!(OverlayCompositor::intensity(0.9, 0.0), 0);
    }

    #[test]
    fn frame_layout_is_row_major() {
        let mut attention = Array2::<f32>::zeros((2, 4));
        attention[[1, 3]] = 1.0;
        let frame = OverlayCompositor::composite(attention.view(), 1.0);
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.red(3, 1), Some(255));
        assert_eq!(frame.red(1, 3), None);
    }

    #[test]
    fn composite_all_keeps_slice_order() {
        let maps = Array3::from_shape_fn((5, 2, 2), |(d, _, _)| d as f32 / 256.0);
        let frames = OverlayCompositor::composite_all(&UpsampledAttention::from(maps), 1.0);
        assert_eq!(frames.len(), 5);
        for (d, frame) in frames.iter().enumerate() {
            assert_eq!(frame.red(0, 0), Some(d as u8));
        }
    }
}
