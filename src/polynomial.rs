use crate::color::{GainTriple, Temperature};

/// Granularity used when reporting polynomial estimates.
pub const DISPLAY_STEP: Temperature = 100;

/// Quadratic regression of temperature against the white point table,
/// evaluated without normalization or clamping.
#[allow(clippy::unreadable_literal)]
pub fn estimate(gain: GainTriple) -> f64 {
    let GainTriple { red: r, green: g, blue: b } = gain;
    64465.0 - 109049.0 * r + 46013.0 * r * r - 4322.0 * g + 10708.0 * g * g - 2662.0 * b
        + 1355.0 * b * b
}

pub fn round_to_step(value: f64, step: Temperature) -> Temperature {
    let step = f64::from(step.max(1));
    ((value / step).round() * step) as Temperature
}

pub fn inverse(gain: GainTriple) -> Temperature {
    round_to_step(estimate(gain), DISPLAY_STEP)
}
