//! Reduction of raw observations into report statistics.
//!
//! Every figure in a report is rounded to one decimal place with
//! round-half-to-even, so `1.25` becomes `1.2` and `1.35` becomes `1.4`.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    error::OverflowError,
    model::{PrecipitationObservation, TemperatureObservation, WeatherType},
};

pub const REPORT_DECIMAL_PLACES: u32 = 1;

/// Statistics for one report window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub rain_fall_total_inches: Decimal,
    pub snow_total_inches: Decimal,
    pub average_high_f: Option<Decimal>,
    pub average_low_f: Option<Decimal>,
}

pub fn round_one_place(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(REPORT_DECIMAL_PLACES, RoundingStrategy::MidpointNearestEven)
}

/// Rounded total of `kind` precipitation. Zero when nothing matches.
pub fn total_for(
    observations: &[PrecipitationObservation],
    kind: &WeatherType,
) -> Result<Decimal, OverflowError> {
    let total = observations
        .iter()
        .filter(|obs| &obs.weather_type == kind)
        .try_fold(Decimal::ZERO, |sum, obs| sum.checked_add(obs.amount_inches))
        .ok_or(OverflowError { field: kind_field(kind) })?;

    Ok(round_one_place(total))
}

/// Rounded arithmetic mean, or `None` for an empty input. `field` names the
/// figure in the overflow error.
pub fn average_of<I>(values: I, field: &'static str) -> Result<Option<Decimal>, OverflowError>
where
    I: IntoIterator<Item = Decimal>,
{
    let overflow = || OverflowError { field };

    let (sum, count) = values
        .into_iter()
        .try_fold((Decimal::ZERO, 0u64), |(sum, count), value| {
            Some((sum.checked_add(value)?, count + 1))
        })
        .ok_or_else(overflow)?;

    if count == 0 {
        return Ok(None);
    }

    let mean = sum.checked_div(Decimal::from(count)).ok_or_else(overflow)?;
    Ok(Some(round_one_place(mean)))
}

fn kind_field(kind: &WeatherType) -> &'static str {
    match kind {
        WeatherType::Rain => "rainFallTotalInches",
        WeatherType::Snow => "snowTotalInches",
        WeatherType::Other(_) => "precipitationTotalInches",
    }
}

pub fn summarize(
    precipitation: &[PrecipitationObservation],
    temperature: &[TemperatureObservation],
) -> Result<Summary, OverflowError> {
    Ok(Summary {
        rain_fall_total_inches: total_for(precipitation, &WeatherType::Rain)?,
        snow_total_inches: total_for(precipitation, &WeatherType::Snow)?,
        average_high_f: average_of(temperature.iter().map(|obs| obs.temp_high_f), "averageHighF")?,
        average_low_f: average_of(temperature.iter().map(|obs| obs.temp_low_f), "averageLowF")?,
    })
}
