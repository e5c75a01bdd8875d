use clap::Parser;
use std::path::PathBuf;

use crate::color::Temperature;
use crate::display::{Invocation, Request, Target};
use crate::model::ColorModel;

const SOCKET_NAME: &str = "wlsct.sock";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wlsct",
    version,
    about = "Set or estimate the Wayland screen color temperature",
    after_help = "A temperature of 0 resets the display to 6500K.\n\
                  Without a temperature, or with a negative one, the current one is\n\
                  estimated for each screen."
)]
pub struct Opts {
    /// Temperature in Kelvin, or the shift amount with --delta
    #[arg(allow_negative_numbers = true)]
    pub temperature: Option<String>,

    /// Shift the current temperature by the given value
    #[arg(short = 'd', long = "delta")]
    pub delta: bool,

    /// Only act on this screen
    #[arg(short = 's', long = "screen")]
    pub screen: Option<usize>,

    /// Only act on this controller of each screen
    #[arg(short = 'c', long = "crtc")]
    pub crtc: Option<usize>,

    /// Temperature model used to build and read gamma ramps
    #[arg(short = 'm', long = "model", value_enum, default_value_t = ColorModel::Analytic)]
    pub model: ColorModel,

    /// Print debugging information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Control socket shared with a running instance
    #[arg(long = "socket")]
    pub socket: Option<PathBuf>,

    /// Exit right after applying instead of holding the gamma ramps
    #[arg(long = "no-hold")]
    pub no_hold: bool,
}

impl Opts {
    pub fn invocation(&self) -> Invocation {
        let value = self.temperature.as_deref().map(parse_temperature);
        let request = match (value, self.delta) {
            (None, false) => Request::Estimate,
            // a negative absolute temperature asks for the current one
            (Some(temp), false) if temp < 0 => Request::Estimate,
            (Some(temp), false) => Request::Set(temp),
            (value, true) => Request::Shift(value.unwrap_or(0)),
        };
        Invocation {
            request,
            target: Target {
                screen: self.screen,
                crtc: self.crtc,
            },
            model: self.model,
        }
    }

    pub fn socket_path(&self) -> Option<PathBuf> {
        self.socket.clone().or_else(|| {
            std::env::var_os("XDG_RUNTIME_DIR").map(|dir| PathBuf::from(dir).join(SOCKET_NAME))
        })
    }
}

/// Reads a leading optionally signed integer; anything else is `0`.
pub fn parse_temperature(s: &str) -> Temperature {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<Temperature>()
        .map(|value| sign * value)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{self, tests::FakeDisplay};
    use crate::ramp::GammaRamp;
    use test_case::test_case;

    fn parse(args: &[&str]) -> Opts {
        Opts::try_parse_from(std::iter::once("wlsct").chain(args.iter().copied())).unwrap()
    }

    #[test_case("4500" => 4500)]
    #[test_case("-300" => -300)]
    #[test_case("+250" => 250)]
    #[test_case("3000K" => 3000)]
    #[test_case("warm" => 0)]
    #[test_case("" => 0)]
    #[test_case("99999999999" => 0)]
    fn lenient_temperature(s: &str) -> Temperature {
        parse_temperature(s)
    }

    #[test]
    fn no_arguments_estimates() {
        let opts = parse(&[]);
        assert_eq!(opts.invocation().request, Request::Estimate);
        assert_eq!(opts.invocation().model, ColorModel::Analytic);
    }

    #[test]
    fn temperature_sets() {
        let invocation = parse(&["3200", "-s", "0", "-c", "1", "-m", "table"]).invocation();
        assert_eq!(invocation.request, Request::Set(3200));
        assert_eq!(
            invocation.target,
            Target {
                screen: Some(0),
                crtc: Some(1)
            }
        );
        assert_eq!(invocation.model, ColorModel::Table);
    }

    #[test]
    fn unparsable_temperature_resets() {
        assert_eq!(parse(&["dusk"]).invocation().request, Request::Set(0));
    }

    #[test_case("-300")]
    #[test_case("-1")]
    fn negative_temperature_estimates(value: &str) {
        assert_eq!(parse(&[value]).invocation().request, Request::Estimate);
    }

    #[test]
    fn negative_temperature_leaves_ramps_alone() {
        let mut display = FakeDisplay::with_sizes(&[&[256]]);
        let reports = display::run(&mut display, &parse(&["-300"]).invocation()).unwrap();
        assert_eq!(display.writes, 0);
        assert_eq!(display.ramps[&0], GammaRamp::identity(256));
        assert_eq!(reports[0].temperature, Some(6500));
    }

    #[test]
    fn negative_delta() {
        let opts = parse(&["-d", "-500", "-v"]);
        assert!(opts.verbose);
        assert_eq!(opts.invocation().request, Request::Shift(-500));
    }

    #[test]
    fn delta_without_value_is_noop_shift() {
        assert_eq!(parse(&["--delta"]).invocation().request, Request::Shift(0));
    }

    #[test]
    fn explicit_socket_wins() {
        let opts = parse(&["--socket", "/tmp/x.sock"]);
        assert_eq!(opts.socket_path(), Some(PathBuf::from("/tmp/x.sock")));
    }
}
