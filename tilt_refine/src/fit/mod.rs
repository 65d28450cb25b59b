//! Weighted least-squares fit of the beam-tilt phase model.
//!
//! The phase of the accumulated cross-correlation is modelled as
//!
//! ```text
//! φ(x', y') = s0·x' + s1·y' + t0·q·x' + t1·q·y',   q = x'² + y'²
//! ```
//!
//! where `(x', y')` is the magnification-corrected, normalised frequency. The
//! linear terms absorb a residual translation, the cubic terms are caused by
//! beam tilt and convert to an angle through the spherical aberration and the
//! electron wavelength.


use std::f64::consts::PI;
use std::ops::AddAssign;

use glam::{DMat2, DVec2};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::grid::{ensure_positive, ensure_shape, FrequencyMapper, RealGrid};
use crate::linalg::Mat4;

/// Optical constants and geometry for one tilt fit.
#[derive(Debug, Clone)]
pub struct TiltFitConfig {
    /// Spherical aberration in mm.
    pub spherical_aberration: f64,
    /// Electron wavelength, same length unit as `pixel_size`.
    pub wavelength: f64,
    pub pixel_size: f64,
    /// Anisotropic magnification correction applied to `(x, y)` before
    /// normalisation.
    pub mag_correction: DMat2,
}

impl TiltFitConfig {
    pub fn new(spherical_aberration: f64, wavelength: f64, pixel_size: f64) -> Self {
        Self {
            spherical_aberration,
            wavelength,
            pixel_size,
            mag_correction: DMat2::IDENTITY,
        }
    }

    pub fn with_pixel_size(mut self, pixel_size: f64) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_mag_correction(mut self, mag_correction: DMat2) -> Self {
        self.mag_correction = mag_correction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("spherical_aberration", self.spherical_aberration)?;
        ensure_positive("wavelength", self.wavelength)?;
        ensure_positive("pixel_size", self.pixel_size)?;
        if !self.mag_correction.is_finite() {
            return Err(Error::InvalidConfig(
                "mag_correction must be finite".to_string(),
            ));
        }
        Ok(())
    }

    fn mapper(&self, width: usize, height: usize) -> FrequencyMapper {
        FrequencyMapper::new(width, height, self.pixel_size)
            .with_mag_correction(self.mag_correction)
    }
}

impl Default for TiltFitConfig {
    /// 300 kV, Cs = 2.7 mm, 1 Å pixels.
    fn default() -> Self {
        Self::new(2.7, crate::ctf::electron_wavelength(300.0), 1.0)
    }
}

/// Convert a cubic phase coefficient into a beam-tilt angle in degrees.
///
/// `cs` is in mm, `wavelength` in the pixel-size length unit.
#[inline]
pub fn tilt_angle(coefficient: f64, cs: f64, wavelength: f64) -> f64 {
    -coefficient * 180.0 / (0.360 * cs * 10_000_000.0 * wavelength * wavelength * PI)
}

/// Inverse of [`tilt_angle`].
#[inline]
pub fn tilt_coefficient(angle_deg: f64, cs: f64, wavelength: f64) -> f64 {
    -angle_deg * (0.360 * cs * 10_000_000.0 * wavelength * wavelength * PI) / 180.0
}

// =============================================================================
// Normal equations
// =============================================================================

/// Weighted moments of the four basis functions `x'`, `y'`, `q·x'`, `q·y'`.
///
/// Only nine distinct matrix moments exist: the `q·x'·y'` moment fills both
/// the (0, 3) and (1, 2) slots of the assembled matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalEquations {
    xx: f64,
    xy: f64,
    q_xx: f64,
    yy: f64,
    q_xy: f64,
    q_yy: f64,
    qq_xx: f64,
    qq_xy: f64,
    qq_yy: f64,
    rhs: [f64; 4],
}

impl NormalEquations {
    /// Add one sample at normalised frequency `p` with phase `v` and weight `g`.
    #[inline]
    pub fn add_sample(&mut self, p: DVec2, v: f64, g: f64) {
        let (x, y) = (p.x, p.y);
        let q = x * x + y * y;

        self.xx += g * x * x;
        self.xy += g * x * y;
        self.q_xx += g * q * x * x;

        self.yy += g * y * y;
        self.q_xy += g * q * x * y;
        self.q_yy += g * q * y * y;

        self.qq_xx += g * q * q * x * x;
        self.qq_xy += g * q * q * x * y;

        self.qq_yy += g * q * q * y * y;

        self.rhs[0] += g * x * v;
        self.rhs[1] += g * y * v;
        self.rhs[2] += g * q * x * v;
        self.rhs[3] += g * q * y * v;
    }

    /// Serial pass over every cell. This is the reference accumulation.
    pub fn accumulate(
        phase: &RealGrid,
        weight: &RealGrid,
        mapper: &FrequencyMapper,
    ) -> Result<Self> {
        check_maps(phase, weight, mapper)?;
        let mut eq = Self::default();
        for yi in 0..mapper.height() {
            eq.add_row(phase, weight, mapper, yi);
        }
        Ok(eq)
    }

    /// Parallel pass: one partial sum per row, combined in row order so the
    /// result does not depend on the thread count.
    pub fn accumulate_par(
        phase: &RealGrid,
        weight: &RealGrid,
        mapper: &FrequencyMapper,
    ) -> Result<Self> {
        check_maps(phase, weight, mapper)?;
        let partials: Vec<Self> = (0..mapper.height())
            .into_par_iter()
            .map(|yi| {
                let mut row = Self::default();
                row.add_row(phase, weight, mapper, yi);
                row
            })
            .collect();

        let mut eq = Self::default();
        for partial in &partials {
            eq += *partial;
        }
        Ok(eq)
    }

    fn add_row(
        &mut self,
        phase: &RealGrid,
        weight: &RealGrid,
        mapper: &FrequencyMapper,
        yi: usize,
    ) {
        let phase_row = phase.row(yi);
        let weight_row = weight.row(yi);
        for xi in 0..mapper.width() {
            self.add_sample(mapper.frequency(xi, yi), phase_row[xi], weight_row[xi]);
        }
    }

    /// Symmetric 4×4 normal-equations matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rows([
            [self.xx, self.xy, self.q_xx, self.q_xy],
            [self.xy, self.yy, self.q_xy, self.q_yy],
            [self.q_xx, self.q_xy, self.qq_xx, self.qq_xy],
            [self.q_xy, self.q_yy, self.qq_xy, self.qq_yy],
        ])
    }

    #[inline]
    pub fn rhs(&self) -> [f64; 4] {
        self.rhs
    }

    /// Solve for `(s0, s1, t0, t1)`.
    ///
    /// The matrix is diagonally equilibrated before inversion, so the
    /// singularity decision is the same whatever length unit the pixel size
    /// is given in.
    pub fn solve(&self) -> Result<[f64; 4]> {
        let a = self.matrix();
        if !a.is_finite() || self.rhs.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteMoments);
        }

        let a_inv = a.inverse_equilibrated().ok_or(Error::SingularSystem)?;
        let opt = a_inv.mul_vec(&self.rhs);

        if opt.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteSolution);
        }
        Ok(opt)
    }
}

impl AddAssign for NormalEquations {
    fn add_assign(&mut self, other: Self) {
        self.xx += other.xx;
        self.xy += other.xy;
        self.q_xx += other.q_xx;
        self.yy += other.yy;
        self.q_xy += other.q_xy;
        self.q_yy += other.q_yy;
        self.qq_xx += other.qq_xx;
        self.qq_xy += other.qq_xy;
        self.qq_yy += other.qq_yy;
        for (dst, src) in self.rhs.iter_mut().zip(other.rhs) {
            *dst += src;
        }
    }
}

fn check_maps(phase: &RealGrid, weight: &RealGrid, mapper: &FrequencyMapper) -> Result<()> {
    let shape = (mapper.width(), mapper.height());
    ensure_shape("phase", shape, phase)?;
    ensure_shape("weight", shape, weight)?;
    if phase.is_empty() {
        return Err(Error::EmptyGrid);
    }
    Ok(())
}

// =============================================================================
// Fit result
// =============================================================================

/// Fitted coefficients and derived tilt angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltFit {
    /// Linear phase coefficient along x' (translation).
    pub shift_x: f64,
    /// Linear phase coefficient along y' (translation).
    pub shift_y: f64,
    /// Raw cubic coefficient along x'.
    pub tilt_coeff_x: f64,
    /// Raw cubic coefficient along y'.
    pub tilt_coeff_y: f64,
    /// Beam tilt in degrees.
    pub tilt_x: f64,
    pub tilt_y: f64,
}

/// Magnitude and direction of the linear and cubic coefficient pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarSummary {
    pub shift_magnitude: f64,
    /// Degrees, `atan2(shift_y, shift_x)`.
    pub shift_direction: f64,
    pub tilt_magnitude: f64,
    /// Degrees, `atan2(tilt_coeff_y, tilt_coeff_x)`.
    pub tilt_direction: f64,
}

impl TiltFit {
    pub fn from_solution(opt: [f64; 4], config: &TiltFitConfig) -> Self {
        let cs = config.spherical_aberration;
        let lambda = config.wavelength;
        Self {
            shift_x: opt[0],
            shift_y: opt[1],
            tilt_coeff_x: opt[2],
            tilt_coeff_y: opt[3],
            tilt_x: tilt_angle(opt[2], cs, lambda),
            tilt_y: tilt_angle(opt[3], cs, lambda),
        }
    }

    /// `[shift_x, shift_y, tilt_coeff_x, tilt_coeff_y]`
    #[inline]
    pub fn coefficients(&self) -> [f64; 4] {
        [self.shift_x, self.shift_y, self.tilt_coeff_x, self.tilt_coeff_y]
    }

    /// Model phase at normalised frequency `p`.
    #[inline]
    pub fn phase_at(&self, p: DVec2) -> f64 {
        let q = p.x * p.x + p.y * p.y;
        p.x * self.shift_x
            + p.y * self.shift_y
            + q * p.x * self.tilt_coeff_x
            + q * p.y * self.tilt_coeff_y
    }

    /// Fitted phase surface on a `width` × `height` grid, using the same
    /// coordinate mapping as the fit itself.
    pub fn surface(&self, width: usize, height: usize, config: &TiltFitConfig) -> RealGrid {
        let mapper = config.mapper(width, height);
        RealGrid::from_fn(width, height, |x, y| self.phase_at(mapper.frequency(x, y)))
    }

    pub fn polar(&self) -> PolarSummary {
        PolarSummary {
            shift_magnitude: self.shift_x.hypot(self.shift_y),
            shift_direction: self.shift_y.atan2(self.shift_x).to_degrees(),
            tilt_magnitude: self.tilt_coeff_x.hypot(self.tilt_coeff_y),
            tilt_direction: self.tilt_coeff_y.atan2(self.tilt_coeff_x).to_degrees(),
        }
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Fit shift and tilt coefficients to a phase map with per-pixel weights.
pub fn fit_tilt_shift(
    phase: &RealGrid,
    weight: &RealGrid,
    config: &TiltFitConfig,
) -> Result<TiltFit> {
    config.validate()?;
    let mapper = config.mapper(phase.width(), phase.height());
    let eq = NormalEquations::accumulate(phase, weight, &mapper)?;
    finish(&eq, config)
}

/// [`fit_tilt_shift`] with the moments accumulated in parallel.
pub fn fit_tilt_shift_par(
    phase: &RealGrid,
    weight: &RealGrid,
    config: &TiltFitConfig,
) -> Result<TiltFit> {
    config.validate()?;
    let mapper = config.mapper(phase.width(), phase.height());
    let eq = NormalEquations::accumulate_par(phase, weight, &mapper)?;
    finish(&eq, config)
}

fn finish(eq: &NormalEquations, config: &TiltFitConfig) -> Result<TiltFit> {
    let opt = match eq.solve() {
        Ok(opt) => opt,
        Err(e) => {
            tracing::warn!("Beam tilt fit failed: {}", e);
            return Err(e);
        }
    };
    let fit = TiltFit::from_solution(opt, config);

    tracing::info!(
        "Tilt fit solution: {}, {}, {}, {}",
        opt[0],
        opt[1],
        opt[2],
        opt[3]
    );
    tracing::info!("tilt_x = {}", fit.tilt_x);
    tracing::info!("tilt_y = {}", fit.tilt_y);

    Ok(fit)
}

/// Weighted RMS of `phase − fitted` over all cells.
pub fn weighted_rms_residual(
    phase: &RealGrid,
    weight: &RealGrid,
    fitted: &RealGrid,
) -> Result<f64> {
    let shape = phase.shape();
    ensure_shape("weight", shape, weight)?;
    ensure_shape("fitted surface", shape, fitted)?;

    let (sum_sq, sum_w) = phase
        .iter()
        .zip(weight.iter())
        .zip(fitted.iter())
        .fold((0.0, 0.0), |(sum_sq, sum_w), ((&v, &g), &f)| {
            let d = v - f;
            (sum_sq + g * d * d, sum_w + g)
        });

    if sum_w == 0.0 {
        return Err(Error::ZeroTotalWeight);
    }
    Ok((sum_sq / sum_w).sqrt())
}
