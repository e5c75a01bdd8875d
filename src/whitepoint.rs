use crate::color::{GainTriple, Temperature};

pub const TABLE_MIN: Temperature = 1000;
pub const TABLE_MAX: Temperature = 10000;
pub const TABLE_STEP: Temperature = 500;

/// Black-body white points sampled every 500K from 1000K, after redshift's
/// colorramp table. The trailing 10500K entry gives 10000K a successor.
#[allow(clippy::excessive_precision)]
#[rustfmt::skip]
pub static WHITEPOINTS: [GainTriple; 20] = [
    GainTriple::new(1.00000000, 0.18172716, 0.00000000), // 1000K
    GainTriple::new(1.00000000, 0.42322816, 0.00000000),
    GainTriple::new(1.00000000, 0.54360078, 0.08679949),
    GainTriple::new(1.00000000, 0.64373109, 0.28819679),
    GainTriple::new(1.00000000, 0.71976951, 0.42860152),
    GainTriple::new(1.00000000, 0.77987699, 0.54642268),
    GainTriple::new(1.00000000, 0.82854786, 0.64816570),
    GainTriple::new(1.00000000, 0.86860704, 0.73688797),
    GainTriple::new(1.00000000, 0.90198230, 0.81465502),
    GainTriple::new(1.00000000, 0.93853986, 0.88130458),
    GainTriple::new(1.00000000, 0.97107439, 0.94305985),
    GainTriple::new(1.00000000, 1.00000000, 1.00000000), // 6500K
    GainTriple::new(0.95160805, 0.96983355, 1.00000000),
    GainTriple::new(0.91194747, 0.94470005, 1.00000000),
    GainTriple::new(0.87906581, 0.92357340, 1.00000000),
    GainTriple::new(0.85139976, 0.90559011, 1.00000000),
    GainTriple::new(0.82782969, 0.89011714, 1.00000000),
    GainTriple::new(0.80753191, 0.87667891, 1.00000000),
    GainTriple::new(0.78988728, 0.86491137, 1.00000000), // 10000K
    GainTriple::new(0.77442176, 0.85453121, 1.00000000),
];

pub fn in_table_range(temp: Temperature) -> bool {
    (TABLE_MIN..=TABLE_MAX).contains(&temp)
}

/// Linear interpolation between the two white points bracketing `temp`.
/// Temperatures outside the table fall back to the neutral point.
pub fn interpolate(temp: Temperature) -> GainTriple {
    if !in_table_range(temp) {
        return GainTriple::NEUTRAL;
    }
    let offset = temp - TABLE_MIN;
    let index = (offset / TABLE_STEP) as usize;
    let ratio = f64::from(offset % TABLE_STEP) / f64::from(TABLE_STEP);

    let lower = WHITEPOINTS[index];
    if ratio == 0.0 {
        return lower;
    }
    let upper = WHITEPOINTS[index + 1];
    let mix = |a: f64, b: f64| a * (1.0 - ratio) + b * ratio;
    GainTriple::new(
        mix(lower.red, upper.red),
        mix(lower.green, upper.green),
        mix(lower.blue, upper.blue),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    #[test]
    fn table_covers_range_with_terminal_successor() {
        let covered = ((TABLE_MAX - TABLE_MIN) / TABLE_STEP + 1) as usize;
        assert_eq!(WHITEPOINTS.len(), covered + 1);
    }

    #[test]
    fn neutral_point_is_unity() {
        assert_eq!(interpolate(6500), GainTriple::NEUTRAL);
    }

    #[test]
    fn table_ends_are_returned_verbatim() {
        assert_eq!(interpolate(TABLE_MIN), WHITEPOINTS[0]);
        assert_eq!(interpolate(TABLE_MAX), WHITEPOINTS[18]);
    }

    #[test]
    fn midpoint_mixes_neighbours() {
        let gain = interpolate(1250);
        assert_eq!(gain.red, 1.0);
        assert_abs_diff_eq!(gain.green, 0.30247766, epsilon = 1e-7);
        assert_eq!(gain.blue, 0.0);
    }

    #[test]
    fn interpolation_stays_between_neighbours() {
        let gain = interpolate(7100);
        assert!(gain.red < WHITEPOINTS[12].red && gain.red > WHITEPOINTS[13].red);
        assert_eq!(gain.blue, 1.0);
    }

    #[test_case(0)]
    #[test_case(999)]
    #[test_case(10001)]
    #[test_case(-4000)]
    fn out_of_range_falls_back_to_neutral(temp: Temperature) {
        assert_eq!(interpolate(temp), GainTriple::NEUTRAL);
    }
}
