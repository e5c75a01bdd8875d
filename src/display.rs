use serde::{Deserialize, Serialize};

use crate::color::{GainTriple, TEMPERATURE_NORM, Temperature};
use crate::error::DisplayError;
use crate::model::ColorModel;
use crate::ramp::{self, GammaRamp};

/// A controller owned by the display: an opaque id and its ramp size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControllerHandle {
    pub id: u32,
    pub ramp_size: usize,
}

/// The seam to whatever owns the gamma ramps.
pub trait GammaDisplay {
    fn screen_count(&self) -> usize;

    /// Controllers of `screen` in a stable order.
    fn controllers(&self, screen: usize) -> Vec<ControllerHandle>;

    fn get_ramp(&self, controller: &ControllerHandle) -> Option<GammaRamp>;

    /// Replaces the controller's whole ramp at once.
    fn set_ramp(
        &mut self,
        controller: &ControllerHandle,
        ramp: &GammaRamp,
    ) -> Result<(), DisplayError>;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub screen: Option<usize>,
    /// Out-of-range indexes select every controller.
    pub crtc: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Estimate,
    Set(Temperature),
    Shift(Temperature),
}

impl Request {
    pub fn changes_gamma(self) -> bool {
        !matches!(self, Request::Estimate)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub request: Request,
    pub target: Target,
    pub model: ColorModel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenReport {
    pub screen: usize,
    /// Estimated (or just applied) temperature; `None` when no controller
    /// of the screen has a usable ramp or none took the new one.
    pub temperature: Option<Temperature>,
}

fn select(controllers: Vec<ControllerHandle>, crtc: Option<usize>) -> Vec<ControllerHandle> {
    match crtc {
        Some(index) if index < controllers.len() => vec![controllers[index]],
        _ => controllers,
    }
}

/// Average of the gains decoded from every selected controller. Zero-size
/// and unreadable controllers contribute nothing. The mean, not the sum,
/// keeps the pooled gain in [0, 1] for the polynomial inverse.
pub fn pooled_gain<D: GammaDisplay + ?Sized>(
    display: &D,
    screen: usize,
    crtc: Option<usize>,
) -> Option<GainTriple> {
    let mut sum = GainTriple::ZERO;
    let mut count = 0usize;
    for controller in select(display.controllers(screen), crtc) {
        if controller.ramp_size == 0 {
            continue;
        }
        let Some(gain) = display.get_ramp(&controller).as_ref().and_then(ramp::decode) else {
            continue;
        };
        tracing::debug!(
            controller = controller.id,
            red = gain.red,
            green = gain.green,
            blue = gain.blue,
            "decoded gamma"
        );
        sum = sum + gain;
        count += 1;
    }
    (count > 0).then(|| sum.scale(1.0 / count as f64))
}

pub fn estimate<D: GammaDisplay + ?Sized>(
    display: &D,
    screen: usize,
    crtc: Option<usize>,
    model: ColorModel,
) -> Option<Temperature> {
    pooled_gain(display, screen, crtc).map(|gain| model.inverse(gain))
}

/// Writes the ramp for `temp` to every selected controller of `screen`,
/// returning how many controllers were updated.
pub fn apply<D: GammaDisplay + ?Sized>(
    display: &mut D,
    screen: usize,
    crtc: Option<usize>,
    temp: Temperature,
    model: ColorModel,
) -> usize {
    let gain = model.forward(temp);
    tracing::debug!(
        temp,
        red = gain.red,
        green = gain.green,
        blue = gain.blue,
        "gamma"
    );
    let mut applied = 0;
    for controller in select(display.controllers(screen), crtc) {
        if controller.ramp_size == 0 {
            continue;
        }
        let ramp = ramp::encode(gain, controller.ramp_size);
        match display.set_ramp(&controller, &ramp) {
            Ok(()) => applied += 1,
            Err(err) => tracing::warn!(controller = controller.id, "failed to set gamma: {err}"),
        }
    }
    applied
}

fn screens<D: GammaDisplay + ?Sized>(
    display: &D,
    target: Target,
) -> Result<std::ops::Range<usize>, DisplayError> {
    let count = display.screen_count();
    match target.screen {
        Some(index) if index >= count => Err(DisplayError::InvalidScreen { index, count }),
        Some(index) => Ok(index..index + 1),
        None => Ok(0..count),
    }
}

/// Runs one invocation against every targeted screen.
pub fn run<D: GammaDisplay + ?Sized>(
    display: &mut D,
    invocation: &Invocation,
) -> Result<Vec<ScreenReport>, DisplayError> {
    let Invocation {
        request,
        target,
        model,
    } = *invocation;
    let mut reports = Vec::new();
    for screen in screens(display, target)? {
        let temperature = match request {
            Request::Estimate => estimate(display, screen, target.crtc, model),
            Request::Set(temp) => {
                let temp = model.sanitize(temp);
                let applied = apply(display, screen, target.crtc, temp, model);
                tracing::debug!(screen, temp, controllers = applied, "set temperature");
                (applied > 0).then_some(temp)
            }
            Request::Shift(delta) => {
                let current =
                    estimate(display, screen, target.crtc, model).unwrap_or(TEMPERATURE_NORM);
                let temp = model.clamp(current.saturating_add(delta));
                let applied = apply(display, screen, target.crtc, temp, model);
                tracing::debug!(screen, current, temp, controllers = applied, "shifted temperature");
                (applied > 0).then_some(temp)
            }
        };
        reports.push(ScreenReport {
            screen,
            temperature,
        });
    }
    Ok(reports)
}
