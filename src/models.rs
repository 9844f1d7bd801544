use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::queries;

/// A thermostat record as returned by `GET /1/thermostat`.
///
/// Only the identity fields and the sensor list are typed. Runtime, settings,
/// program and equipment status stay as raw JSON and are read through
/// accessors that fail with [`Error::MalformedResponse`] when a field is
/// missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thermostat {
    pub identifier: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_sensors: Option<Vec<RemoteSensor>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Thermostat {
    /// Look up a dotted path such as `runtime.desiredHeat`.
    pub fn field(&self, path: &str) -> Result<&Value> {
        let mut segments = path.split('.');
        let mut value = segments.next().and_then(|first| self.extra.get(first));
        for segment in segments {
            value = value.and_then(|v| v.get(segment));
        }
        value.ok_or_else(|| {
            Error::MalformedResponse(format!(
                "thermostat {} is missing `{}`",
                self.identifier, path
            ))
        })
    }

    fn int_field(&self, path: &str) -> Result<i32> {
        self.field(path)?
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "thermostat {}: `{}` is not an integer",
                    self.identifier, path
                ))
            })
    }

    fn str_field(&self, path: &str) -> Result<&str> {
        self.field(path)?.as_str().ok_or_else(|| {
            Error::MalformedResponse(format!(
                "thermostat {}: `{}` is not a string",
                self.identifier, path
            ))
        })
    }

    pub fn remote_sensors(&self) -> Result<&[RemoteSensor]> {
        self.remote_sensors.as_deref().ok_or_else(|| {
            Error::MalformedResponse(format!(
                "thermostat {} has no remoteSensors list",
                self.identifier
            ))
        })
    }

    /// Current temperature in tenths of a degree Fahrenheit.
    pub fn actual_temperature(&self) -> Result<i32> {
        self.int_field("runtime.actualTemperature")
    }

    pub fn desired_heat(&self) -> Result<i32> {
        self.int_field("runtime.desiredHeat")
    }

    pub fn desired_cool(&self) -> Result<i32> {
        self.int_field("runtime.desiredCool")
    }

    fn parsed_field<T: FromStr<Err = Error>>(&self, path: &str) -> Result<T> {
        let raw = self.str_field(path)?;
        raw.parse().map_err(|_| {
            Error::MalformedResponse(format!(
                "thermostat {}: `{}` has unexpected value `{}`",
                self.identifier, path, raw
            ))
        })
    }

    pub fn hvac_mode(&self) -> Result<HvacMode> {
        self.parsed_field("settings.hvacMode")
    }

    pub fn fan_mode(&self) -> Result<FanMode> {
        self.parsed_field("runtime.desiredFanMode")
    }

    pub fn current_climate_ref(&self) -> Result<&str> {
        self.str_field("program.currentClimateRef")
    }

    /// Equipment currently running, e.g. `["heatPump", "fan"]`.
    pub fn equipment_status(&self) -> Result<Vec<&str>> {
        Ok(self
            .str_field("equipmentStatus")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect())
    }

    pub fn heater_on(&self) -> Result<bool> {
        let status = self.equipment_status()?;
        Ok(status
            .iter()
            .any(|s| s.starts_with("heatPump") || s.starts_with("auxHeat")))
    }

    pub fn cooler_on(&self) -> Result<bool> {
        let status = self.equipment_status()?;
        Ok(status.iter().any(|s| s.starts_with("compCool")))
    }

    pub fn fan_on(&self) -> Result<bool> {
        let status = self.equipment_status()?;
        Ok(status.iter().any(|s| *s == "fan" || *s == "ventilator"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSensor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub in_use: bool,
    #[serde(default)]
    pub capability: Vec<Capability>,
}

impl RemoteSensor {
    /// The thermostat's own built-in sensor.
    pub fn is_thermostat(&self) -> bool {
        self.sensor_type == "thermostat"
    }

    pub fn is_remote(&self) -> bool {
        self.sensor_type == "ecobee3_remote_sensor"
    }

    /// Tenths of a degree Fahrenheit; `None` while the sensor reports `unknown`.
    pub fn temperature(&self) -> Result<Option<i32>> {
        let capability = queries::find_capability(self, "temperature")?;
        capability.numeric_value()
    }

    pub fn humidity(&self) -> Result<Option<i32>> {
        let capability = queries::find_capability(self, "humidity")?;
        capability.numeric_value()
    }

    pub fn occupied(&self) -> Result<bool> {
        let capability = queries::find_capability(self, "occupancy")?;
        match capability.value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(Error::MalformedResponse(format!(
                "sensor {}: occupancy value `{}` is not a boolean",
                self.name, other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    pub id: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    pub value: String,
}

impl Capability {
    fn numeric_value(&self) -> Result<Option<i32>> {
        if self.value == "unknown" {
            return Ok(None);
        }
        self.value.parse::<i32>().map(Some).map_err(|_| {
            Error::MalformedResponse(format!(
                "capability {} value `{}` is not numeric",
                self.capability_type, self.value
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HvacMode {
    Auto,
    AuxHeatOnly,
    Cool,
    Heat,
    Off,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Auto => "auto",
            HvacMode::AuxHeatOnly => "auxHeatOnly",
            HvacMode::Cool => "cool",
            HvacMode::Heat => "heat",
            HvacMode::Off => "off",
        }
    }
}

impl FromStr for HvacMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(HvacMode::Auto),
            "auxHeatOnly" | "aux-heat-only" => Ok(HvacMode::AuxHeatOnly),
            "cool" => Ok(HvacMode::Cool),
            "heat" => Ok(HvacMode::Heat),
            "off" => Ok(HvacMode::Off),
            other => Err(Error::InvalidValue(format!(
                "unknown hvac mode `{}`, expected auto, auxHeatOnly, cool, heat or off",
                other
            ))),
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FanMode {
    Auto,
    On,
}

impl FromStr for FanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(FanMode::Auto),
            "on" => Ok(FanMode::On),
            other => Err(Error::InvalidValue(format!(
                "unknown fan mode `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanMode::Auto => f.write_str("auto"),
            FanMode::On => f.write_str("on"),
        }
    }
}

/// How long a hold lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldType {
    /// Until the next scheduled program transition.
    #[default]
    NextTransition,
    /// Until explicitly resumed.
    Indefinite,
}

impl HoldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldType::NextTransition => "nextTransition",
            HoldType::Indefinite => "indefinite",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermostat() -> Thermostat {
        serde_json::from_str(
            r#"{
                "identifier": "311000000001",
                "name": "Hallway",
                "runtime": {"actualTemperature": 712, "desiredHeat": 680, "desiredCool": 780, "desiredFanMode": "auto"},
                "settings": {"hvacMode": "auxHeatOnly"},
                "program": {"currentClimateRef": "home"},
                "equipmentStatus": "auxHeat1,fan",
                "remoteSensors": []
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_thermostat_accessors() {
        let t = thermostat();
        assert_eq!(t.actual_temperature().unwrap(), 712);
        assert_eq!(t.desired_heat().unwrap(), 680);
        assert_eq!(t.desired_cool().unwrap(), 780);
        assert_eq!(t.hvac_mode().unwrap(), HvacMode::AuxHeatOnly);
        assert_eq!(t.fan_mode().unwrap(), FanMode::Auto);
        assert_eq!(t.current_climate_ref().unwrap(), "home");
        assert_eq!(t.equipment_status().unwrap(), vec!["auxHeat1", "fan"]);
        assert!(t.heater_on().unwrap());
        assert!(!t.cooler_on().unwrap());
        assert!(t.fan_on().unwrap());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let t: Thermostat =
            serde_json::from_str(r#"{"identifier": "1", "name": "Bare"}"#).unwrap();
        match t.desired_heat() {
            Err(Error::MalformedResponse(msg)) => assert!(msg.contains("runtime.desiredHeat")),
            other => panic!("expected malformed response, got {:?}", other),
        }
        assert!(matches!(
            t.remote_sensors(),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_idle_equipment_status() {
        let t: Thermostat = serde_json::from_str(
            r#"{"identifier": "1", "name": "Idle", "equipmentStatus": ""}"#,
        )
        .unwrap();
        assert!(t.equipment_status().unwrap().is_empty());
        assert!(!t.heater_on().unwrap());
    }

    #[test]
    fn test_sensor_capabilities() {
        let sensor: RemoteSensor = serde_json::from_str(
            r#"{"id": "rs:100:1", "name": "Bedroom", "type": "ecobee3_remote_sensor", "code": "rs:100", "inUse": true,
                "capability": [
                    {"id": "1", "type": "temperature", "value": "unknown"},
                    {"id": "2", "type": "occupancy", "value": "true"}
                ]}"#,
        )
        .unwrap();
        assert!(sensor.is_remote());
        assert!(!sensor.is_thermostat());
        assert_eq!(sensor.temperature().unwrap(), None);
        assert!(sensor.occupied().unwrap());
        assert!(matches!(sensor.humidity(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_hvac_mode_parsing() {
        assert_eq!("heat".parse::<HvacMode>().unwrap(), HvacMode::Heat);
        assert_eq!(HvacMode::AuxHeatOnly.to_string(), "auxHeatOnly");
        match "warm".parse::<HvacMode>() {
            Err(Error::InvalidValue(msg)) => assert!(msg.contains("warm")),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_mode_in_payload_is_malformed() {
        let t: Thermostat = serde_json::from_str(
            r#"{"identifier": "1", "name": "Odd", "settings": {"hvacMode": "turbo"}}"#,
        )
        .unwrap();
        match t.hvac_mode() {
            Err(Error::MalformedResponse(msg)) => assert!(msg.contains("settings.hvacMode")),
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }
}
