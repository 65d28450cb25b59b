//! CTF-weighted cross-spectrum accumulation.
//!
//! For every Fourier cell the accumulator adds
//!
//! ```text
//! xy[y, x] += c · conj(prediction[y, x]) · observation[y, x]
//! w[y, x]  += c² · |prediction[y, x]|²
//! ```
//!
//! where `c` is the CTF at the cell's frequency. The two sums are kept across
//! many images and later turned into the phase and weight maps the tilt
//! fitter consumes.


use common::parallel::par_rows2_mut;
use rayon::prelude::*;

use crate::ctf::CtfModel;
use crate::error::{Error, Result};
use crate::fit::{fit_tilt_shift, TiltFit, TiltFitConfig};
use crate::grid::{ensure_positive, ensure_shape, Complex64, ComplexGrid, FrequencyMapper, RealGrid};

/// Add one (prediction, observation) pair into `xy_dest` and `w_dest`.
///
/// All four grids must share the same shape; nothing is written otherwise.
pub fn update_tilt_shift(
    prediction: &ComplexGrid,
    observation: &ComplexGrid,
    ctf: &impl CtfModel,
    pixel_size: f64,
    xy_dest: &mut ComplexGrid,
    w_dest: &mut RealGrid,
) -> Result<()> {
    check_inputs(prediction, observation, pixel_size, xy_dest, w_dest)?;
    if prediction.is_empty() {
        return Ok(());
    }

    let kernel = RowKernel::new(prediction, observation, ctf, pixel_size);
    kernel.run(0, xy_dest.pixels_mut(), w_dest.pixels_mut());
    Ok(())
}

/// Parallel variant of [`update_tilt_shift`].
///
/// The destinations are split into disjoint row-aligned chunks, one writer
/// per cell, so the result is identical to the serial version. The `&mut`
/// borrows keep two calls from touching the same destinations at once.
pub fn update_tilt_shift_par(
    prediction: &ComplexGrid,
    observation: &ComplexGrid,
    ctf: &impl CtfModel,
    pixel_size: f64,
    xy_dest: &mut ComplexGrid,
    w_dest: &mut RealGrid,
) -> Result<()> {
    check_inputs(prediction, observation, pixel_size, xy_dest, w_dest)?;
    if prediction.is_empty() {
        return Ok(());
    }

    let width = prediction.width();
    let kernel = RowKernel::new(prediction, observation, ctf, pixel_size);
    par_rows2_mut(xy_dest.pixels_mut(), w_dest.pixels_mut(), width).for_each(
        |(first_row, (xy_chunk, w_chunk))| {
            kernel.run(first_row, xy_chunk, w_chunk);
        },
    );
    Ok(())
}

fn check_inputs(
    prediction: &ComplexGrid,
    observation: &ComplexGrid,
    pixel_size: f64,
    xy_dest: &ComplexGrid,
    w_dest: &RealGrid,
) -> Result<()> {
    ensure_positive("pixel_size", pixel_size)?;
    let shape = prediction.shape();
    ensure_shape("observation", shape, observation)?;
    ensure_shape("cross-correlation destination", shape, xy_dest)?;
    ensure_shape("weight destination", shape, w_dest)?;
    Ok(())
}

struct RowKernel<'a, C: ?Sized> {
    prediction: &'a ComplexGrid,
    observation: &'a ComplexGrid,
    ctf: &'a C,
    mapper: FrequencyMapper,
}

impl<'a, C: CtfModel + ?Sized> RowKernel<'a, C> {
    fn new(
        prediction: &'a ComplexGrid,
        observation: &'a ComplexGrid,
        ctf: &'a C,
        pixel_size: f64,
    ) -> Self {
        Self {
            prediction,
            observation,
            ctf,
            mapper: FrequencyMapper::new(prediction.width(), prediction.height(), pixel_size),
        }
    }

    /// Accumulate the complete rows held by the chunks, starting at `first_row`.
    fn run(&self, first_row: usize, xy_chunk: &mut [Complex64], w_chunk: &mut [f64]) {
        let width = self.mapper.width();
        let rows = xy_chunk
            .chunks_exact_mut(width)
            .zip(w_chunk.chunks_exact_mut(width));

        for (local_y, (xy_row, w_row)) in rows.enumerate() {
            let y = first_row + local_y;
            let pred_row = self.prediction.row(y);
            let obs_row = self.observation.row(y);

            for x in 0..width {
                let f = self.mapper.frequency(x, y);
                let c = self.ctf.value(f.x, f.y);
                let p = pred_row[x];

                xy_row[x] += c * p.conj() * obs_row[x];
                w_row[x] += c * c * p.norm_sqr();
            }
        }
    }
}

// =============================================================================
// Owned accumulator
// =============================================================================

/// Which accumulated quantity weights a pixel in the tilt fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightSource {
    /// `|xy|`, the magnitude of the cross-correlation.
    #[default]
    Magnitude,
    /// The CTF²-weighted power accumulator.
    Power,
    /// `|xy| / sqrt(power)`, zero where the power is zero.
    NormalizedAmplitude,
}

/// How phase and weight maps are derived from an accumulator.
#[derive(Debug, Clone, Default)]
pub struct PhaseMapConfig {
    pub weight: WeightSource,
    /// Resolution (in pixel-size units, e.g. Å) below which frequencies are
    /// excluded. Pixels with `|f| < 1 / min_resolution` get zero weight.
    pub min_resolution: Option<f64>,
}

impl PhaseMapConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(resolution) = self.min_resolution {
            ensure_positive("min_resolution", resolution)?;
        }
        Ok(())
    }
}

/// Phase and weight maps ready for [`fit_tilt_shift`].
#[derive(Debug, Clone)]
pub struct PhaseMaps {
    pub phase: RealGrid,
    pub weight: RealGrid,
}

/// Owns the cross-correlation and power sums for one optics group.
#[derive(Debug, Clone)]
pub struct CrossSpectrumAccumulator {
    xy: ComplexGrid,
    power: RealGrid,
    pixel_size: f64,
    image_count: usize,
}

impl CrossSpectrumAccumulator {
    /// Zero-initialised accumulator for `width` × `height` Fourier grids.
    pub fn new(width: usize, height: usize, pixel_size: f64) -> Result<Self> {
        ensure_positive("pixel_size", pixel_size)?;
        Ok(Self {
            xy: ComplexGrid::new_default(width, height),
            power: RealGrid::new_default(width, height),
            pixel_size,
            image_count: 0,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.xy.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.xy.height()
    }

    #[inline]
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Number of image pairs added so far, including merged ones.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    #[inline]
    pub fn cross_correlation(&self) -> &ComplexGrid {
        &self.xy
    }

    #[inline]
    pub fn power(&self) -> &RealGrid {
        &self.power
    }

    pub fn add(
        &mut self,
        prediction: &ComplexGrid,
        observation: &ComplexGrid,
        ctf: &impl CtfModel,
    ) -> Result<()> {
        update_tilt_shift(
            prediction,
            observation,
            ctf,
            self.pixel_size,
            &mut self.xy,
            &mut self.power,
        )?;
        self.image_count += 1;
        Ok(())
    }

    pub fn add_par(
        &mut self,
        prediction: &ComplexGrid,
        observation: &ComplexGrid,
        ctf: &impl CtfModel,
    ) -> Result<()> {
        update_tilt_shift_par(
            prediction,
            observation,
            ctf,
            self.pixel_size,
            &mut self.xy,
            &mut self.power,
        )?;
        self.image_count += 1;
        Ok(())
    }

    /// Add another accumulator's sums into this one.
    pub fn merge(&mut self, other: &CrossSpectrumAccumulator) -> Result<()> {
        ensure_shape("merged accumulator", self.xy.shape(), &other.xy)?;
        if other.pixel_size != self.pixel_size {
            return Err(Error::InvalidConfig(format!(
                "cannot merge accumulators with pixel sizes {} and {}",
                self.pixel_size, other.pixel_size
            )));
        }

        self.xy
            .par_iter_mut()
            .zip(other.xy.par_iter())
            .for_each(|(dst, src)| *dst += *src);
        self.power
            .par_iter_mut()
            .zip(other.power.par_iter())
            .for_each(|(dst, src)| *dst += *src);
        self.image_count += other.image_count;

        tracing::debug!(
            "Merged accumulator with {} images, total {}",
            other.image_count,
            self.image_count
        );
        Ok(())
    }

    /// Derive phase and weight maps. The phase is `arg(xy)`.
    pub fn phase_maps(&self, config: &PhaseMapConfig) -> Result<PhaseMaps> {
        config.validate()?;

        let phase = self.xy.map(|v| v.arg());
        let mut weight = match config.weight {
            WeightSource::Magnitude => self.xy.map(|v| v.norm()),
            WeightSource::Power => self.power.clone(),
            WeightSource::NormalizedAmplitude => {
                let pixels = self
                    .xy
                    .iter()
                    .zip(self.power.iter())
                    .map(|(xy, &p)| if p > 0.0 { xy.norm() / p.sqrt() } else { 0.0 })
                    .collect();
                RealGrid::new(self.width(), self.height(), pixels)
            }
        };

        if let Some(resolution) = config.min_resolution {
            let cutoff = 1.0 / resolution;
            let mapper = FrequencyMapper::new(self.width(), self.height(), self.pixel_size);
            let mut excluded = 0usize;
            for y in 0..self.height() {
                for x in 0..self.width() {
                    if mapper.frequency(x, y).length() < cutoff {
                        weight[(x, y)] = 0.0;
                        excluded += 1;
                    }
                }
            }
            tracing::debug!(
                "Excluded {} pixels below {:.2} resolution from the tilt fit",
                excluded,
                resolution
            );
        }

        Ok(PhaseMaps { phase, weight })
    }

    /// Derive phase maps and fit the tilt/shift model in one call.
    pub fn fit(&self, maps: &PhaseMapConfig, fit: &TiltFitConfig) -> Result<TiltFit> {
        if fit.pixel_size != self.pixel_size {
            return Err(Error::InvalidConfig(format!(
                "fit pixel size {} differs from accumulator pixel size {}",
                fit.pixel_size, self.pixel_size
            )));
        }
        let PhaseMaps { phase, weight } = self.phase_maps(maps)?;
        tracing::info!(
            "Fitting beam tilt from {} accumulated images",
            self.image_count
        );
        fit_tilt_shift(&phase, &weight, fit)
    }
}
