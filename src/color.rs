use std::ops::Add;

/// Color temperature in Kelvin.
pub type Temperature = i32;

/// Temperature at which every channel gain is 1.0.
pub const TEMPERATURE_NORM: Temperature = 6500;
/// Physical floor: below this the analytic model collapses green and blue to zero.
pub const TEMPERATURE_ZERO: Temperature = 700;

/// Per-channel linear multipliers applied to an otherwise neutral ramp.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GainTriple {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl GainTriple {
    pub const NEUTRAL: Self = Self::new(1.0, 1.0, 1.0);
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    pub fn max(self) -> f64 {
        self.red.max(self.green).max(self.blue)
    }

    /// Divides every channel by the dominant one, removing uniform brightness
    /// scaling. `None` for an all-zero (or negative) triple.
    pub fn normalized(self) -> Option<Self> {
        let max = self.max();
        if max > 0.0 {
            Some(self.scale(1.0 / max))
        } else {
            None
        }
    }

    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.red * factor, self.green * factor, self.blue * factor)
    }
}

impl Add for GainTriple {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.red + rhs.red,
            self.green + rhs.green,
            self.blue + rhs.blue,
        )
    }
}
