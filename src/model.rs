use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::color::{GainTriple, TEMPERATURE_NORM, TEMPERATURE_ZERO, Temperature};
use crate::{analytic, polynomial, whitepoint};

/// A matched forward/inverse model pair.
#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorModel {
    /// Logarithmic regression and its algebraic inverse
    #[default]
    Analytic,
    /// White point table interpolation, estimated by quadratic regression
    Table,
}

impl ColorModel {
    /// Maps a requested temperature into the model's domain. `0` always means
    /// the neutral point.
    pub fn sanitize(self, temp: Temperature) -> Temperature {
        if temp == 0 {
            return TEMPERATURE_NORM;
        }
        match self {
            ColorModel::Analytic if temp < TEMPERATURE_ZERO => {
                tracing::warn!("temperatures below {TEMPERATURE_ZERO}K cannot be displayed");
                TEMPERATURE_ZERO
            }
            ColorModel::Table if !whitepoint::in_table_range(temp) => {
                tracing::warn!(
                    "{temp}K is outside {}..={}K, using {TEMPERATURE_NORM}K",
                    whitepoint::TABLE_MIN,
                    whitepoint::TABLE_MAX
                );
                TEMPERATURE_NORM
            }
            _ => temp,
        }
    }

    /// Saturates a shifted temperature at the model's domain bounds.
    pub fn clamp(self, temp: Temperature) -> Temperature {
        let (low, high) = match self {
            ColorModel::Analytic => (TEMPERATURE_ZERO, Temperature::MAX),
            ColorModel::Table => (whitepoint::TABLE_MIN, whitepoint::TABLE_MAX),
        };
        let clamped = temp.clamp(low, high);
        if clamped != temp {
            tracing::warn!("{temp}K cannot be displayed, using {clamped}K");
        }
        clamped
    }

    pub fn forward(self, temp: Temperature) -> GainTriple {
        match self {
            ColorModel::Analytic => analytic::forward(temp),
            ColorModel::Table => whitepoint::interpolate(temp),
        }
    }

    pub fn inverse(self, gain: GainTriple) -> Temperature {
        match self {
            ColorModel::Analytic => analytic::inverse(gain),
            ColorModel::Table => polynomial::inverse(gain),
        }
    }
}
