//! Lookups over fetched thermostat records.
//!
//! Every lookup expects exactly one match. No match and more than one match
//! are both reported as [`Error::NotFound`], so a duplicated sensor code can
//! never silently resolve to whichever record happens to come first.

use crate::error::{Error, Result};
use crate::models::{Capability, RemoteSensor, Thermostat};

fn exactly_one<'a, T, I>(matches: I, what: impl FnOnce() -> String) -> Result<&'a T>
where
    I: Iterator<Item = &'a T>,
{
    let found: Vec<&T> = matches.collect();
    match found.as_slice() {
        [one] => Ok(*one),
        [] => Err(Error::NotFound(format!("no {}", what()))),
        many => Err(Error::NotFound(format!(
            "{} matches for {}, expected exactly one",
            many.len(),
            what()
        ))),
    }
}

pub fn find_thermostat<'a>(
    thermostats: &'a [Thermostat],
    identifier: &str,
) -> Result<&'a Thermostat> {
    exactly_one(
        thermostats.iter().filter(|t| t.identifier == identifier),
        || format!("thermostat with identifier {}", identifier),
    )
}

pub fn find_remote_sensor<'a>(
    thermostat: &'a Thermostat,
    code: &str,
) -> Result<&'a RemoteSensor> {
    exactly_one(
        thermostat
            .remote_sensors()?
            .iter()
            .filter(|s| s.code.as_deref() == Some(code)),
        || format!("sensor with code {} on thermostat {}", code, thermostat.identifier),
    )
}

/// The thermostat's own built-in sensor from its sensor list.
pub fn thermostat_sensor(thermostat: &Thermostat) -> Result<&RemoteSensor> {
    exactly_one(
        thermostat.remote_sensors()?.iter().filter(|s| s.is_thermostat()),
        || format!("built-in sensor on thermostat {}", thermostat.identifier),
    )
}

/// Search every thermostat's sensor list for `code`.
pub fn find_sensor_by_code<'a>(
    thermostats: &'a [Thermostat],
    code: &str,
) -> Result<(&'a Thermostat, &'a RemoteSensor)> {
    let mut found = Vec::new();
    for thermostat in thermostats {
        for sensor in thermostat.remote_sensors()? {
            if sensor.code.as_deref() == Some(code) {
                found.push((thermostat, sensor));
            }
        }
    }
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::NotFound(format!("no sensor with code {}", code))),
        n => Err(Error::NotFound(format!(
            "{} sensors share code {}, expected exactly one",
            n, code
        ))),
    }
}

pub fn find_capability<'a>(
    sensor: &'a RemoteSensor,
    capability_type: &str,
) -> Result<&'a Capability> {
    exactly_one(
        sensor
            .capability
            .iter()
            .filter(|c| c.capability_type == capability_type),
        || format!("{} capability on sensor {}", capability_type, sensor.name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor(code: Option<&str>, sensor_type: &str, name: &str) -> serde_json::Value {
        json!({
            "id": format!("{}-id", name),
            "name": name,
            "type": sensor_type,
            "code": code,
            "inUse": true,
            "capability": [{"id": "1", "type": "temperature", "value": "701"}]
        })
    }

    fn thermostat(identifier: &str, sensors: Vec<serde_json::Value>) -> Thermostat {
        serde_json::from_value(json!({
            "identifier": identifier,
            "name": format!("T{}", identifier),
            "remoteSensors": sensors,
        }))
        .unwrap()
    }

    #[test]
    fn test_find_remote_sensor_unique() {
        let t = thermostat(
            "1",
            vec![
                sensor(None, "thermostat", "Main"),
                sensor(Some("rs:100"), "ecobee3_remote_sensor", "Bedroom"),
                sensor(Some("rs:101"), "ecobee3_remote_sensor", "Office"),
            ],
        );
        let found = find_remote_sensor(&t, "rs:100").unwrap();
        assert_eq!(found.name, "Bedroom");
        assert_eq!(thermostat_sensor(&t).unwrap().name, "Main");
    }

    #[test]
    fn test_find_remote_sensor_missing() {
        let t = thermostat("1", vec![sensor(Some("rs:101"), "ecobee3_remote_sensor", "Office")]);
        match find_remote_sensor(&t, "rs:100") {
            Err(Error::NotFound(msg)) => assert!(msg.contains("rs:100")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_find_remote_sensor_ambiguous() {
        let t = thermostat(
            "1",
            vec![
                sensor(Some("rs:100"), "ecobee3_remote_sensor", "Bedroom"),
                sensor(Some("rs:100"), "ecobee3_remote_sensor", "Nursery"),
            ],
        );
        match find_remote_sensor(&t, "rs:100") {
            Err(Error::NotFound(msg)) => assert!(msg.starts_with("2 matches")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_find_thermostat() {
        let thermostats = vec![thermostat("1", vec![]), thermostat("2", vec![])];
        assert_eq!(find_thermostat(&thermostats, "2").unwrap().name, "T2");
        assert!(matches!(
            find_thermostat(&thermostats, "3"),
            Err(Error::NotFound(_))
        ));

        let duplicated = vec![thermostat("1", vec![]), thermostat("1", vec![])];
        assert!(matches!(
            find_thermostat(&duplicated, "1"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_find_sensor_by_code_across_thermostats() {
        let thermostats = vec![
            thermostat("1", vec![sensor(Some("rs:100"), "ecobee3_remote_sensor", "Bedroom")]),
            thermostat("2", vec![sensor(Some("rs:200"), "ecobee3_remote_sensor", "Garage")]),
        ];
        let (owner, found) = find_sensor_by_code(&thermostats, "rs:200").unwrap();
        assert_eq!(owner.identifier, "2");
        assert_eq!(found.name, "Garage");

        let shared = vec![
            thermostat("1", vec![sensor(Some("rs:100"), "ecobee3_remote_sensor", "Bedroom")]),
            thermostat("2", vec![sensor(Some("rs:100"), "ecobee3_remote_sensor", "Garage")]),
        ];
        assert!(matches!(
            find_sensor_by_code(&shared, "rs:100"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_find_capability() {
        let t = thermostat("1", vec![sensor(Some("rs:100"), "ecobee3_remote_sensor", "Bedroom")]);
        let s = find_remote_sensor(&t, "rs:100").unwrap();
        assert_eq!(find_capability(s, "temperature").unwrap().value, "701");
        assert!(matches!(
            find_capability(s, "occupancy"),
            Err(Error::NotFound(_))
        ));
    }
}
