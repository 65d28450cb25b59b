//! The contrast-transfer function as an injected capability.
//!
//! The accumulator only needs a real aberration value per spatial frequency,
//! so any model (or a plain closure) can be plugged in.

/// Real-valued aberration factor as a function of normalised frequency.
///
/// Implementations must be side-effect free. The parallel accumulator calls
/// `value` from several threads at once.
pub trait CtfModel: Sync {
    fn value(&self, fx: f64, fy: f64) -> f64;
}

impl<F> CtfModel for F
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    #[inline]
    fn value(&self, fx: f64, fy: f64) -> f64 {
        self(fx, fy)
    }
}

/// CTF that is 1 everywhere (no aberration weighting).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitCtf;

impl CtfModel for UnitCtf {
    #[inline]
    fn value(&self, _fx: f64, _fy: f64) -> f64 {
        1.0
    }
}

/// Relativistic electron wavelength in Å for an acceleration voltage in kV.
pub fn electron_wavelength(voltage_kv: f64) -> f64 {
    let volts = voltage_kv * 1e3;
    12.2643247 / (volts * (1.0 + volts * 0.978466e-6)).sqrt()
}
