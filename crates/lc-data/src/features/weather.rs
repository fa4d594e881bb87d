//! Weather-derived features: wind at hub height and humidity physics.

use lc_types::{Dataset, LcResult};

/// Height of the measured wind speed, in metres.
const MEASURED_HEIGHT: f64 = 10.0;
/// Height of the extrapolated wind speed, in metres.
const HUB_HEIGHT: f64 = 100.0;
/// Power-law exponent for the wind profile over open land.
const WIND_SHEAR_EXPONENT: f64 = 0.143;
/// Logistic fit of a generic turbine power curve, normalised to rated power.
const POWER_CURVE_STEEPNESS: f64 = 0.664;
const POWER_CURVE_CENTER: f64 = 8.07;

/// Specific gas constants, J/(kg K).
const R_DRY_AIR: f64 = 287.058;
const R_WATER_VAPOUR: f64 = 461.495;

const WIND_FEATURES: [&str; 2] = ["windspeed_100mExtrapolated", "windPowerFit_extrapolated"];
const HUMIDITY_FEATURES: [&str; 4] = [
    "saturation_pressure",
    "vapour_pressure",
    "dewpoint",
    "air_density",
];

fn wanted(features: Option<&[String]>, name: &str) -> bool {
    features.map_or(true, |list| list.iter().any(|f| f == name))
}

pub(super) fn extrapolate_windspeed(windspeed: f64) -> f64 {
    windspeed * (HUB_HEIGHT / MEASURED_HEIGHT).powf(WIND_SHEAR_EXPONENT)
}

/// Normalised turbine output (0..1) for a hub-height wind speed.
pub(super) fn turbine_power(windspeed: f64) -> f64 {
    1.0 / (1.0 + (-POWER_CURVE_STEEPNESS * (windspeed - POWER_CURVE_CENTER)).exp())
}

/// Adds hub-height wind speed and normalised wind power when a `windspeed`
/// column is present.
pub(super) fn add_additional_wind_features(
    data: &mut Dataset,
    features: Option<&[String]>,
) -> LcResult<()> {
    if !WIND_FEATURES.iter().any(|f| wanted(features, f)) {
        return Ok(());
    }
    let Some(windspeed) = data.column("windspeed") else {
        return Ok(());
    };

    let extrapolated: Vec<f64> = windspeed.iter().map(|v| extrapolate_windspeed(*v)).collect();
    let power: Vec<f64> = extrapolated.iter().map(|v| turbine_power(*v)).collect();

    if wanted(features, WIND_FEATURES[0]) {
        data.insert_column(WIND_FEATURES[0], extrapolated)?;
    }
    if wanted(features, WIND_FEATURES[1]) {
        data.insert_column(WIND_FEATURES[1], power)?;
    }
    Ok(())
}

/// Saturation vapour pressure in hPa for a temperature in °C (Magnus-Tetens).
pub(super) fn saturation_pressure(temperature: f64) -> f64 {
    6.1078 * 10f64.powf(7.5 * temperature / (237.3 + temperature))
}

/// Dew point in °C for a vapour pressure in hPa.
pub(super) fn dewpoint(vapour_pressure: f64) -> f64 {
    let x = (vapour_pressure / 6.1078).ln();
    237.3 * x / (7.5 * std::f64::consts::LN_10 - x)
}

/// Moist air density in kg/m³ from pressure (Pa), temperature (°C) and
/// vapour pressure (hPa).
pub(super) fn air_density(pressure: f64, temperature: f64, vapour_pressure: f64) -> f64 {
    let kelvin = temperature + 273.15;
    let vapour_pa = vapour_pressure * 100.0;
    (pressure - vapour_pa) / (R_DRY_AIR * kelvin) + vapour_pa / (R_WATER_VAPOUR * kelvin)
}

/// Adds humidity-derived columns when `temp`, `humidity` and `pressure` are
/// present. Humidity is a fraction; values above 1 are read as percentages.
pub(super) fn add_humidity_features(
    data: &mut Dataset,
    features: Option<&[String]>,
) -> LcResult<()> {
    if !HUMIDITY_FEATURES.iter().any(|f| wanted(features, f)) {
        return Ok(());
    }
    let (Some(temp), Some(humidity), Some(pressure)) = (
        data.column("temp"),
        data.column("humidity"),
        data.column("pressure"),
    ) else {
        return Ok(());
    };

    let n = temp.len();
    let mut saturation = Vec::with_capacity(n);
    let mut vapour = Vec::with_capacity(n);
    let mut dew = Vec::with_capacity(n);
    let mut density = Vec::with_capacity(n);
    for row in 0..n {
        let rh = if humidity[row] > 1.0 {
            humidity[row] / 100.0
        } else {
            humidity[row]
        };
        let psat = saturation_pressure(temp[row]);
        let pv = rh * psat;
        saturation.push(psat);
        vapour.push(pv);
        dew.push(dewpoint(pv));
        density.push(air_density(pressure[row], temp[row], pv));
    }

    for (name, values) in HUMIDITY_FEATURES
        .iter()
        .zip([saturation, vapour, dew, density])
    {
        if wanted(features, name) {
            data.insert_column(*name, values)?;
        }
    }
    Ok(())
}
