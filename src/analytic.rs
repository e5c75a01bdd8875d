//! Logarithmic regression of redshift's black-body table, without the table.
//!
//! Each channel is modelled as `K0 + K1 * ln(T - T0)`, with `T0 = 700K` on the
//! warm side (red pinned at 1.0) and `T0 = 6500K - 700K` on the cool side
//! (blue pinned at 1.0).

use crate::color::{GainTriple, TEMPERATURE_NORM, TEMPERATURE_ZERO, Temperature};

#[derive(Copy, Clone, Debug)]
struct Coefficients {
    k0: f64,
    k1: f64,
}

impl Coefficients {
    fn gain(self, log: f64) -> f64 {
        (self.k0 + self.k1 * log).clamp(0.0, 1.0)
    }
}

#[allow(clippy::unreadable_literal)]
const WARM_GREEN: Coefficients = Coefficients {
    k0: -1.47751309139817,
    k1: 0.28590164772055,
};
#[allow(clippy::unreadable_literal)]
const WARM_BLUE: Coefficients = Coefficients {
    k0: -4.38321650114872,
    k1: 0.6212158769447,
};
#[allow(clippy::unreadable_literal)]
const COOL_RED: Coefficients = Coefficients {
    k0: 1.75390204039018,
    k1: -0.1150805671482,
};
#[allow(clippy::unreadable_literal)]
const COOL_GREEN: Coefficients = Coefficients {
    k0: 1.49221604915144,
    k1: -0.07513509588921,
};

const WARM_ORIGIN: f64 = TEMPERATURE_ZERO as f64;
const COOL_ORIGIN: f64 = (TEMPERATURE_NORM - TEMPERATURE_ZERO) as f64;

pub fn forward(temp: Temperature) -> GainTriple {
    let t = f64::from(temp);
    if temp < TEMPERATURE_NORM {
        if temp < TEMPERATURE_ZERO {
            return GainTriple::new(1.0, 0.0, 0.0);
        }
        let log = (t - WARM_ORIGIN).ln();
        GainTriple::new(1.0, WARM_GREEN.gain(log), WARM_BLUE.gain(log))
    } else {
        let log = (t - COOL_ORIGIN).ln();
        GainTriple::new(COOL_RED.gain(log), COOL_GREEN.gain(log), 1.0)
    }
}

/// Which branch of [`forward`] produced a (normalized) gain triple.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Region {
    /// Green and blue both saturated at zero.
    Floor,
    /// Warm side with blue saturated at zero: only green carries information.
    WarmGreenOnly,
    /// Warm side, green and blue both in range.
    WarmJoint,
    /// Neutral point and above.
    Cool,
}

impl Region {
    pub fn classify(gain: GainTriple) -> Self {
        if gain.blue - gain.red < 0.0 {
            if gain.blue > 0.0 {
                Region::WarmJoint
            } else if gain.green > 0.0 {
                Region::WarmGreenOnly
            } else {
                Region::Floor
            }
        } else {
            Region::Cool
        }
    }

    fn temperature(self, gain: GainTriple) -> f64 {
        let d = gain.blue - gain.red;
        match self {
            Region::Floor => WARM_ORIGIN,
            Region::WarmGreenOnly => {
                ((gain.green - WARM_GREEN.k0) / WARM_GREEN.k1).exp() + WARM_ORIGIN
            }
            Region::WarmJoint => {
                ((gain.green + d + 1.0 - (WARM_GREEN.k0 + WARM_BLUE.k0))
                    / (WARM_GREEN.k1 + WARM_BLUE.k1))
                    .exp()
                    + WARM_ORIGIN
            }
            Region::Cool => {
                ((gain.green + 1.0 - d - (COOL_GREEN.k0 + COOL_RED.k0))
                    / (COOL_GREEN.k1 + COOL_RED.k1))
                    .exp()
                    + COOL_ORIGIN
            }
        }
    }
}

/// Estimates the temperature that [`forward`] would have turned into `gain`.
/// Uniform brightness scaling is removed first; an all-zero triple maps to the floor.
pub fn inverse(gain: GainTriple) -> Temperature {
    let Some(gain) = gain.normalized() else {
        return TEMPERATURE_ZERO;
    };
    let region = Region::classify(gain);
    tracing::debug!(?region, ?gain, "inverting analytic model");
    region.temperature(gain).round() as Temperature
}
