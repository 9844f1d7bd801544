use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Convert degrees Fahrenheit to the API's integer tenths, rounding to the
/// nearest tenth.
pub fn to_tenths(degrees_f: f64) -> i32 {
    (degrees_f * 10.0).round() as i32
}

pub fn from_tenths(tenths: i32) -> f64 {
    f64::from(tenths) / 10.0
}

/// Lowest setpoint sent to a thermostat, 40 °F.
pub const MIN_SETPOINT_TENTHS: i32 = 400;
/// Highest setpoint sent to a thermostat, 95 °F.
pub const MAX_SETPOINT_TENTHS: i32 = 950;

pub fn clamp_setpoint(tenths_f: i32) -> i32 {
    tenths_f.clamp(MIN_SETPOINT_TENTHS, MAX_SETPOINT_TENTHS)
}

/// Display scale for temperatures. The client itself only deals in tenths of
/// a degree Fahrenheit; this is passed to whatever renders a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureScale {
    #[default]
    Fahrenheit,
    Celsius,
    Kelvin,
    Rankine,
}

impl TemperatureScale {
    pub fn convert(&self, tenths_f: i32) -> f64 {
        let f = from_tenths(tenths_f);
        match self {
            TemperatureScale::Fahrenheit => f,
            TemperatureScale::Celsius => (f - 32.0) * 5.0 / 9.0,
            TemperatureScale::Kelvin => (f - 32.0) * 5.0 / 9.0 + 273.15,
            TemperatureScale::Rankine => f + 459.67,
        }
    }

    /// Inverse of [`convert`](Self::convert).
    pub fn to_tenths_f(&self, value: f64) -> i32 {
        let f = match self {
            TemperatureScale::Fahrenheit => value,
            TemperatureScale::Celsius => value * 9.0 / 5.0 + 32.0,
            TemperatureScale::Kelvin => (value - 273.15) * 9.0 / 5.0 + 32.0,
            TemperatureScale::Rankine => value - 459.67,
        };
        to_tenths(f)
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TemperatureScale::Fahrenheit => "°F",
            TemperatureScale::Celsius => "°C",
            TemperatureScale::Kelvin => "K",
            TemperatureScale::Rankine => "°Ra",
        }
    }

    pub fn format(&self, tenths_f: i32) -> String {
        format!("{:.1}{}", self.convert(tenths_f), self.suffix())
    }
}

impl FromStr for TemperatureScale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f" | "fahrenheit" => Ok(TemperatureScale::Fahrenheit),
            "c" | "celsius" => Ok(TemperatureScale::Celsius),
            "k" | "kelvin" => Ok(TemperatureScale::Kelvin),
            "r" | "ra" | "rankine" => Ok(TemperatureScale::Rankine),
            other => Err(Error::InvalidValue(format!(
                "unknown temperature scale `{}` (expected F, C, K or R)",
                other
            ))),
        }
    }
}

impl fmt::Display for TemperatureScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_tenths_rounds() {
        assert_eq!(to_tenths(78.0), 780);
        assert_eq!(to_tenths(68.04), 680);
        assert_eq!(to_tenths(68.06), 681);
        assert_eq!(to_tenths(-0.5), -5);
    }

    #[test]
    fn test_format_per_scale() {
        assert_eq!(TemperatureScale::Fahrenheit.format(712), "71.2°F");
        assert_eq!(TemperatureScale::Celsius.format(320), "0.0°C");
        assert_eq!(TemperatureScale::Kelvin.format(320), "273.1K");
        assert_eq!(TemperatureScale::Rankine.format(0), "459.7°Ra");
    }

    #[test]
    fn test_celsius_round_trip_to_wire() {
        assert_eq!(TemperatureScale::Celsius.to_tenths_f(20.0), 680);
        assert_eq!(TemperatureScale::Celsius.to_tenths_f(25.5), 779);
        assert_eq!(TemperatureScale::Fahrenheit.to_tenths_f(72.5), 725);
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!("C".parse::<TemperatureScale>().unwrap(), TemperatureScale::Celsius);
        assert_eq!(
            "rankine".parse::<TemperatureScale>().unwrap(),
            TemperatureScale::Rankine
        );
        assert!(matches!(
            "x".parse::<TemperatureScale>(),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_clamp_setpoint() {
        assert_eq!(clamp_setpoint(720), 720);
        assert_eq!(clamp_setpoint(100), MIN_SETPOINT_TENTHS);
        assert_eq!(clamp_setpoint(1200), MAX_SETPOINT_TENTHS);
        assert_eq!(clamp_setpoint(i32::MIN), MIN_SETPOINT_TENTHS);
    }
}
