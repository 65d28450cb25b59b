//! Half-plane 2D Fourier transform of real images.

use common::parallel::par_rows_mut;
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::grid::{Complex64, ComplexGrid, RealGrid};

/// Forward, unnormalised 2D DFT of a real `w` × `h` image.
///
/// Only the non-negative x-frequencies are kept, so the result is
/// `(w / 2 + 1)` × `h`, the layout the accumulator and the fitter expect.
/// A zero-width image has no frequencies and yields a `0` × `h` grid.
pub fn half_spectrum(image: &RealGrid) -> ComplexGrid {
    let (width, height) = image.shape();
    if width == 0 {
        return ComplexGrid::new_default(0, height);
    }
    let half_width = width / 2 + 1;
    if height == 0 {
        return ComplexGrid::new_default(half_width, 0);
    }

    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(width);
    let col_fft = planner.plan_fft_forward(height);

    let mut rows: Vec<Complex64> = image.iter().map(|&v| Complex::new(v, 0.0)).collect();
    par_rows_mut(&mut rows, width).for_each(|(_, chunk)| row_fft.process(chunk));

    let columns: Vec<Vec<Complex64>> = (0..half_width)
        .into_par_iter()
        .map(|x| {
            let mut column: Vec<Complex64> = (0..height).map(|y| rows[y * width + x]).collect();
            col_fft.process(&mut column);
            column
        })
        .collect();

    ComplexGrid::from_fn(half_width, height, |x, y| columns[x][y])
}
