use ndarray::ArrayView3;

pub(crate) struct Interpolator;

/// Neighbouring source indices and the weight of the upper one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Tap {
    pub lo: usize,
    pub hi: usize,
    pub frac: f32,
}

impl Interpolator {
    /// Maps output index `dst` on an axis of `out_len` samples back onto an
    /// axis of `in_len` samples, pixel centres aligned (half-pixel offset).
    #[inline]
    pub(crate) fn source_coordinate(dst: usize, in_len: usize, out_len: usize) -> f32 {
        let scale = in_len as f32 / out_len as f32;
        let src = scale * (dst as f32 + 0.5) - 0.5;
        src.max(0.0).min(in_len.saturating_sub(1) as f32)
    }

    /// Precomputed taps for every output index of one axis. An empty source
    /// axis yields taps at index 0, which callers must not sample.
    pub(crate) fn axis_taps(in_len: usize, out_len: usize) -> Vec<Tap> {
        (0..out_len)
            .map(|dst| {
                let src = Self::source_coordinate(dst, in_len, out_len);
                let lo = src.floor() as usize;
                Tap {
                    lo,
                    hi: (lo + 1).min(in_len.saturating_sub(1)),
                    frac: src - lo as f32,
                }
            })
            .collect()
    }

    #[inline]
    fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a.mul_add(1.0 - t, b * t)
    }

    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<f32>, z: Tap, y: Tap, x: Tap) -> f32 {
        let c000 = volume[[z.lo, y.lo, x.lo]];
        let c001 = volume[[z.lo, y.lo, x.hi]];
        let c010 = volume[[z.lo, y.hi, x.lo]];
        let c011 = volume[[z.lo, y.hi, x.hi]];
        let c100 = volume[[z.hi, y.lo, x.lo]];
        let c101 = volume[[z.hi, y.lo, x.hi]];
        let c110 = volume[[z.hi, y.hi, x.lo]];
        let c111 = volume[[z.hi, y.hi, x.hi]];

        let c00 = Self::lerp(c000, c001, x.frac);
        let c01 = Self::lerp(c010, c011, x.frac);
        let c10 = Self::lerp(c100, c101, x.frac);
        let c11 = Self::lerp(c110, c111, x.frac);

        let c0 = Self::lerp(c00, c01, y.frac);
        let c1 = Self::lerp(c10, c11, y.frac);

        Self::lerp(c0, c1, z.frac)
    }
}
