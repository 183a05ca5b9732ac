//! Reconstruction of full-resolution attention maps from the coarse,
//! log-space attention a risk model reports per ensemble member.

use ndarray::{Array2, Array3, Array4, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{ConfigError, GeometryError};
use crate::interpolator::Interpolator;

/// Coarse grid the model pools attention onto: depth buckets × height × width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttentionGrid {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl AttentionGrid {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 || self.height == 0 || self.width == 0 {
            return Err(ConfigError::Invalid(format!(
                "attention grid must be non-empty, got {}x{}x{}",
                self.depth, self.height, self.width
            )));
        }
        Ok(())
    }
}

impl Default for AttentionGrid {
    fn default() -> Self {
        Self {
            depth: 25,
            height: 16,
            width: 16,
        }
    }
}

/// Log-space attention for every ensemble member.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionTensor {
    /// ensemble × depth × height × width
    image: Array4<f32>,
    /// ensemble × depth
    volume: Array2<f32>,
}

impl AttentionTensor {
    pub fn new(image: Array4<f32>, volume: Array2<f32>) -> Self {
        Self { image, volume }
    }

    /// Builds a tensor from row-major buffers, as serialized predictions carry them.
    pub fn from_flat(
        ensemble: usize,
        grid: AttentionGrid,
        image: Vec<f32>,
        volume: Vec<f32>,
    ) -> Result<Self, GeometryError> {
        let image_shape = (ensemble, grid.depth, grid.height, grid.width);
        let image_len = image.len();
        let image = Array4::from_shape_vec(image_shape, image).map_err(|_| {
            GeometryError::AttentionShape {
                component: "image",
                expected: vec![ensemble, grid.depth, grid.height, grid.width],
                found: vec![image_len],
            }
        })?;
        let volume_len = volume.len();
        let volume = Array2::from_shape_vec((ensemble, grid.depth), volume).map_err(|_| {
            GeometryError::AttentionShape {
                component: "volume",
                expected: vec![ensemble, grid.depth],
                found: vec![volume_len],
            }
        })?;
        Ok(Self { image, volume })
    }

    pub fn ensemble(&self) -> usize {
        self.image.len_of(Axis(0))
    }

    pub fn image(&self) -> &Array4<f32> {
        &self.image
    }

    pub fn volume(&self) -> &Array2<f32> {
        &self.volume
    }
}

/// One attention map per target slice, at the target resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsampledAttention {
    maps: Array3<f32>,
}

impl From<Array3<f32>> for UpsampledAttention {
    fn from(maps: Array3<f32>) -> Self {
        Self { maps }
    }
}

impl UpsampledAttention {
    pub fn maps(&self) -> &Array3<f32> {
        &self.maps
    }

    /// (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.maps.dim()
    }

    pub fn slice(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        (index < self.maps.len_of(Axis(0))).then(|| self.maps.index_axis(Axis(0), index))
    }

    pub fn slices(&self) -> impl Iterator<Item = ArrayView2<'_, f32>> {
        self.maps.outer_iter()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttentionUpsampler {
    grid: AttentionGrid,
}

impl AttentionUpsampler {
    /// Fails when the grid has an empty axis.
    pub fn new(grid: AttentionGrid) -> Result<Self, ConfigError> {
        grid.validate()?;
        Ok(Self { grid })
    }

    pub fn grid(&self) -> AttentionGrid {
        self.grid
    }

    /// Checks both components against the grid and against each other.
    pub fn validate(&self, tensor: &AttentionTensor) -> Result<(), GeometryError> {
        let g = self.grid;
        let ensemble = tensor.ensemble().max(1);
        let image_expected = vec![ensemble, g.depth, g.height, g.width];
        if tensor.image.shape() != image_expected.as_slice() {
            return Err(GeometryError::AttentionShape {
                component: "image",
                expected: image_expected,
                found: tensor.image.shape().to_vec(),
            });
        }
        let volume_expected = vec![ensemble, g.depth];
        if tensor.volume.shape() != volume_expected.as_slice() {
            return Err(GeometryError::AttentionShape {
                component: "volume",
                expected: volume_expected,
                found: tensor.volume.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Ensemble-averaged attention on the coarse grid.
    ///
    /// Members are averaged in linear space (`exp` first, then the mean);
    /// each depth bucket's image map is then weighted by that bucket's
    /// volume attention.
    pub fn combine(&self, tensor: &AttentionTensor) -> Result<Array3<f32>, GeometryError> {
        self.validate(tensor)?;
        let empty = || GeometryError::AttentionShape {
            component: "image",
            expected: vec![1, self.grid.depth, self.grid.height, self.grid.width],
            found: tensor.image.shape().to_vec(),
        };

        let mut combined = tensor
            .image
            .mapv(f32::exp)
            .mean_axis(Axis(0))
            .ok_or_else(empty)?;
        let weights = tensor
            .volume
            .mapv(f32::exp)
            .mean_axis(Axis(0))
            .ok_or_else(empty)?;

        for (mut plane, &weight) in combined.outer_iter_mut().zip(weights.iter()) {
            plane *= weight;
        }
        Ok(combined)
    }

    /// Trilinearly resamples the combined attention to `depth × height × width`.
    pub fn upsample(
        &self,
        tensor: &AttentionTensor,
        depth: usize,
        height: usize,
        width: usize,
    ) -> Result<UpsampledAttention, GeometryError> {
        if depth == 0 || height == 0 || width == 0 {
            return Err(GeometryError::EmptyTarget((depth, height, width)));
        }
        let combined = self.combine(tensor)?;
        Ok(UpsampledAttention {
            maps: Self::resample(&combined, (depth, height, width))?,
        })
    }

    fn resample(
        source: &Array3<f32>,
        (depth, height, width): (usize, usize, usize),
    ) -> Result<Array3<f32>, GeometryError> {
        let (d_in, h_in, w_in) = source.dim();
        if d_in == 0 || h_in == 0 || w_in == 0 {
            return Err(GeometryError::AttentionShape {
                component: "image",
                expected: vec![d_in.max(1), h_in.max(1), w_in.max(1)],
                found: vec![d_in, h_in, w_in],
            });
        }
        let z_taps = Interpolator::axis_taps(d_in, depth);
        let y_taps = Interpolator::axis_taps(h_in, height);
        let x_taps = Interpolator::axis_taps(w_in, width);
        let view = source.view();

        let mut maps = Array3::<f32>::zeros((depth, height, width));
        maps.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(z_taps.par_iter())
            .for_each(|(mut plane, &z)| {
                for ((y, x), value) in plane.indexed_iter_mut() {
                    *value = Interpolator::trilinear_interpolate(&view, z, y_taps[y], x_taps[x]);
                }
            });
        Ok(maps)
    }
}
