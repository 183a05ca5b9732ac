use ndarray::{Array3, s};

use crate::error::GeometryError;
use crate::slice::RawSlice;
use crate::volume::Volume;

pub struct SeriesAssembler;

impl SeriesAssembler {
    /// Stack `slices` into one volume, in the order given.
    ///
    /// Every slice must share the first slice's (height, width); the first
    /// one that does not is reported by index and nothing is built.
    pub fn assemble(
        series_id: impl Into<String>,
        slices: Vec<RawSlice>,
    ) -> Result<Volume, GeometryError> {
        let Some(first) = slices.first() else {
            return Err(GeometryError::EmptySeries);
        };
        Self::validate_dimensions(&slices)?;

        let (height, width) = first.dim();
        let spacing = slices
            .iter()
            .find_map(RawSlice::spacing)
            .map(|(row, column)| (row, column, 1.0));

        let mut volume = Array3::<f32>::zeros((slices.len(), height, width));
        let mut keys = Vec::with_capacity(slices.len());
        for (i, slice) in slices.into_iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.pixels());
            keys.push(slice.key().to_string());
        }

        Ok(Volume::new(series_id.into(), volume, keys, spacing))
    }

    fn validate_dimensions(slices: &[RawSlice]) -> Result<(), GeometryError> {
        let expected = slices[0].dim();
        match slices.iter().position(|slice| slice.dim() != expected) {
            Some(index) => Err(GeometryError::SliceDimensions {
                index,
                expected,
                found: slices[index].dim(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn slice(index: usize, (h, w): (usize, usize), value: f32) -> RawSlice {
        RawSlice::new(Array2::from_elem((h, w), value), index, 8, format!("{index:03}.png"))
    }

    #[test]
    fn stacks_in_given_order() {
        let slices = vec![slice(2, (3, 4), 2.0), slice(0, (3, 4), 0.0), slice(1, (3, 4), 1.0)];
        let volume = SeriesAssembler::assemble("s1", slices).unwrap();

        assert_eq!(volume.dim(), (3, 3, 4));
        assert_eq!(volume.series_id(), "s1");
        assert_eq!(volume.keys(), ["002.png", "000.png", "001.png"]);
        assert_eq!(volume.data()[[0, 1, 1]], 2.0);
        assert_eq!(volume.data()[[1, 1, 1]], 0.0);
        assert_eq!(volume.spacing(), None);
    }

    #[test]
    fn depth_matches_slice_count() {
        let slices: Vec<_> = (0..10).map(|i| slice(i, (5, 5), i as f32)).collect();
        let volume = SeriesAssembler::assemble("s", slices).unwrap();
        assert_eq!(volume.depth(), 10);
    }

    #[test]
    fn mismatched_slice_is_named() {
        let slices = vec![
            slice(0, (4, 4), 0.0),
            slice(1, (4, 4), 0.0),
            slice(2, (4, 5), 0.0),
            slice(3, (3, 4), 0.0),
        ];
        let err = SeriesAssembler::assemble("s", slices).unwrap_err();
        assert_eq!(
            err,
            GeometryError::SliceDimensions {
                index: 2,
                expected: (4, 4),
                found: (4, 5),
            }
        );
    }

    #[test]
    fn empty_series_builds_nothing() {
        assert_eq!(
            SeriesAssembler::assemble("s", Vec::new()).unwrap_err(),
            GeometryError::EmptySeries
        );
    }

    #[test]
    fn spacing_comes_from_first_slice_that_has_it() {
        let slices = vec![
            slice(0, (2, 2), 0.0),
            slice(1, (2, 2), 0.0).with_spacing(Some((0.6, 0.8))),
        ];
        let volume = SeriesAssembler::assemble("s", slices).unwrap();
        assert_eq!(volume.spacing(), Some((0.6, 0.8, 1.0)));
    }
}
