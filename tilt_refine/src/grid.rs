//! Half-plane Fourier grids and their frequency coordinates.
//!
//! A grid of `width` × `height` cells stores the transform of a real image of
//! height `height`. Columns hold the non-negative x-frequencies. Rows hold all
//! y-frequencies: row `y` maps to `y` when `y < width` and to `y - height`
//! otherwise.

use common::Buffer2;
use glam::{DMat2, DVec2};
use rustfft::num_complex::Complex;

use crate::error::{Error, Result};

pub type Complex64 = Complex<f64>;

/// Complex Fourier array (predictions, observations, cross-correlation).
pub type ComplexGrid = Buffer2<Complex64>;

/// Real Fourier array (power, phase, weight, fitted surface).
pub type RealGrid = Buffer2<f64>;

/// Signed frequency index of row `y`.
///
/// The threshold is the grid width, not `height / 2`.
#[inline]
pub fn signed_row(y: usize, width: usize, height: usize) -> f64 {
    if y < width {
        y as f64
    } else {
        y as f64 - height as f64
    }
}

pub(crate) fn ensure_shape<T>(
    what: &'static str,
    expected: (usize, usize),
    grid: &Buffer2<T>,
) -> Result<()> {
    if grid.shape() != expected {
        return Err(Error::ShapeMismatch {
            what,
            expected,
            actual: grid.shape(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and positive, got {value}"
        )));
    }
    Ok(())
}

/// Maps grid indices to normalised spatial frequencies.
///
/// `(x, y)` becomes `M · (x, signed_row(y)) / (height × pixel_size)`, where
/// `M` is the magnification correction (identity unless set).
#[derive(Debug, Clone, Copy)]
pub struct FrequencyMapper {
    width: usize,
    height: usize,
    extent: f64,
    mag_correction: DMat2,
}

impl FrequencyMapper {
    pub fn new(width: usize, height: usize, pixel_size: f64) -> Self {
        Self {
            width,
            height,
            extent: height as f64 * pixel_size,
            mag_correction: DMat2::IDENTITY,
        }
    }

    pub fn with_mag_correction(mut self, mag_correction: DMat2) -> Self {
        self.mag_correction = mag_correction;
        self
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Sampling extent `height × pixel_size`.
    #[inline]
    pub fn extent(&self) -> f64 {
        self.extent
    }

    /// Signed, uncorrected coordinate of a cell in grid units.
    #[inline]
    pub fn signed_coords(&self, x: usize, y: usize) -> DVec2 {
        DVec2::new(x as f64, signed_row(y, self.width, self.height))
    }

    /// Normalised, magnification-corrected frequency of a cell.
    #[inline]
    pub fn frequency(&self, x: usize, y: usize) -> DVec2 {
        let p = self.mag_correction * self.signed_coords(x, y);
        DVec2::new(p.x / self.extent, p.y / self.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_row_wraps_at_width() {
        // H = 8, W = 5
        assert_eq!(signed_row(0, 5, 8), 0.0);
        assert_eq!(signed_row(3, 5, 8), 3.0);
        assert_eq!(signed_row(4, 5, 8), 4.0);
        assert_eq!(signed_row(5, 5, 8), -3.0);
        assert_eq!(signed_row(6, 5, 8), -2.0);
        assert_eq!(signed_row(7, 5, 8), -1.0);
    }

    #[test]
    fn test_signed_row_square_grid_never_wraps() {
        for y in 0..32 {
            assert_eq!(signed_row(y, 32, 32), y as f64);
        }
    }

    #[test]
    fn test_frequency_normalisation() {
        let mapper = FrequencyMapper::new(5, 8, 1.5);
        assert_eq!(mapper.extent(), 12.0);
        let f = mapper.frequency(2, 6);
        assert_eq!(f, DVec2::new(2.0 / 12.0, -2.0 / 12.0));
    }

    #[test]
    fn test_frequency_identity_matches_plain_division() {
        let mapper = FrequencyMapper::new(17, 32, 0.83);
        for y in 0..32 {
            for x in 0..17 {
                let f = mapper.frequency(x, y);
                assert_eq!(f.x, x as f64 / mapper.extent());
                assert_eq!(f.y, signed_row(y, 17, 32) / mapper.extent());
            }
        }
    }

    #[test]
    fn test_frequency_applies_mag_correction_before_scaling() {
        let mag = DMat2::from_cols(DVec2::new(1.1, 0.0), DVec2::new(0.2, 0.9));
        let mapper = FrequencyMapper::new(5, 8, 1.0).with_mag_correction(mag);
        let f = mapper.frequency(1, 7);
        // (x, y) = (1, -1)
        let expected = DVec2::new(1.1 * 1.0 + 0.2 * -1.0, 0.9 * -1.0) / 8.0;
        assert!((f - expected).length() < 1e-15, "{f:?} vs {expected:?}");
    }

    #[test]
    fn test_ensure_shape() {
        let grid: RealGrid = Buffer2::new_default(5, 8);
        assert!(ensure_shape("phase", (5, 8), &grid).is_ok());
        assert_eq!(
            ensure_shape("phase", (8, 5), &grid),
            Err(Error::ShapeMismatch {
                what: "phase",
                expected: (8, 5),
                actual: (5, 8),
            })
        );
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("pixel_size", 1.0).is_ok());
        assert!(ensure_positive("pixel_size", 0.0).is_err());
        assert!(ensure_positive("pixel_size", -1.0).is_err());
        assert!(ensure_positive("pixel_size", f64::NAN).is_err());
        assert!(ensure_positive("pixel_size", f64::INFINITY).is_err());
    }
}
