//! Tilt refine - beam-tilt estimation from Fourier-space cross spectra.
//!
//! The crate provides:
//! - CTF-weighted cross-spectrum accumulation over many (prediction,
//!   observation) image pairs, serial or row-parallel
//! - Derivation of phase and weight maps from the accumulated sums
//! - A weighted least-squares fit of a linear + cubic phase model, with the
//!   cubic terms converted to beam-tilt angles
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tilt_refine::{CrossSpectrumAccumulator, PhaseMapConfig, TiltFitConfig};
//!
//! let mut acc = CrossSpectrumAccumulator::new(width, height, pixel_size)?;
//! for (prediction, observation, ctf) in particles {
//!     acc.add_par(&prediction, &observation, &ctf)?;
//! }
//!
//! let config = TiltFitConfig::new(cs_mm, wavelength, pixel_size);
//! let fit = acc.fit(&PhaseMapConfig::default(), &config)?;
//! println!("beam tilt: {:.4}, {:.4} deg", fit.tilt_x, fit.tilt_y);
//! ```

pub mod accumulate;
pub mod ctf;
pub mod error;
pub mod fit;
pub mod fourier;
pub mod grid;
pub mod linalg;

pub use accumulate::{
    update_tilt_shift, update_tilt_shift_par, CrossSpectrumAccumulator, PhaseMapConfig,
    PhaseMaps, WeightSource,
};
pub use ctf::{electron_wavelength, CtfModel, UnitCtf};
pub use error::{Error, Result};
pub use fit::{
    fit_tilt_shift, fit_tilt_shift_par, tilt_angle, tilt_coefficient, weighted_rms_residual,
    NormalEquations, PolarSummary, TiltFit, TiltFitConfig,
};
pub use fourier::half_spectrum;
pub use grid::{signed_row, Complex64, ComplexGrid, FrequencyMapper, RealGrid};
pub use linalg::{Mat4, SquareMatrix};
