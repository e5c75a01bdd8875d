use crate::color::GainTriple;

const GAMMA_MULT: f64 = u16::MAX as f64;

/// One controller's lookup table, one `u16` sequence per channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

impl GammaRamp {
    /// Linear ramp from 0 to full scale, what a compositor applies by default.
    pub fn identity(size: usize) -> Self {
        let denom = size.saturating_sub(1).max(1) as f64;
        let channel: Vec<u16> = (0..size)
            .map(|i| (GAMMA_MULT * i as f64 / denom).round() as u16)
            .collect();
        Self {
            red: channel.clone(),
            green: channel.clone(),
            blue: channel,
        }
    }

    pub fn size(&self) -> usize {
        self.red.len()
    }

    /// Copies the ramp into `buf` as consecutive red, green and blue planes.
    pub fn write_planar(&self, buf: &mut [u16]) {
        let size = self.size();
        buf[..size].copy_from_slice(&self.red);
        buf[size..2 * size].copy_from_slice(&self.green);
        buf[2 * size..3 * size].copy_from_slice(&self.blue);
    }
}

fn sample(level: f64, gain: f64) -> u16 {
    // `as` saturates, the clamp keeps the bound explicit
    (level * gain).round().clamp(0.0, GAMMA_MULT) as u16
}

/// Builds a ramp of `size` entries where entry `i` is `65535 * i / size`
/// scaled by the channel gain.
pub fn encode(gain: GainTriple, size: usize) -> GammaRamp {
    let mut ramp = GammaRamp {
        red: Vec::with_capacity(size),
        green: Vec::with_capacity(size),
        blue: Vec::with_capacity(size),
    };
    for i in 0..size {
        let level = GAMMA_MULT * i as f64 / size as f64;
        ramp.red.push(sample(level, gain.red));
        ramp.green.push(sample(level, gain.green));
        ramp.blue.push(sample(level, gain.blue));
    }
    ramp
}

/// Recovers the gain triple from the terminal sample of each channel,
/// normalized by the level [`encode`] uses at that index,
/// `65535 * (size - 1) / size`. Ramps with fewer than two entries carry no
/// gain information.
pub fn decode(ramp: &GammaRamp) -> Option<GainTriple> {
    let size = ramp.size();
    if size < 2 || ramp.green.len() != size || ramp.blue.len() != size {
        return None;
    }
    let last = size - 1;
    let scale = GAMMA_MULT * last as f64 / size as f64;
    Some(GainTriple::new(
        f64::from(ramp.red[last]) / scale,
        f64::from(ramp.green[last]) / scale,
        f64::from(ramp.blue[last]) / scale,
    ))
}
