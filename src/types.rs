use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::{HoldType, HvacMode, Thermostat};

/// Status codes ecobee uses to report a rejected or expired access token.
/// Expired tokens come back as HTTP 500 with code 14, not as a 401.
pub const AUTH_FAILURE_CODES: [i64; 3] = [1, 14, 16];

#[derive(Debug, Deserialize)]
pub struct PinResponse {
    #[serde(rename = "ecobeePin")]
    pub ecobee_pin: String,
    pub code: String,
    pub scope: Option<String>,
    /// Minutes until the pin expires.
    pub expires_in: Option<u64>,
    /// Recommended seconds between token polls.
    pub interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApiStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: ApiStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatListResponse {
    pub thermostat_list: Vec<Thermostat>,
    pub status: Option<ApiStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_runtime: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_sensors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_program: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_equipment_status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_settings: Option<bool>,
}

impl Selection {
    /// Every thermostat registered to the account, with the substructures the
    /// client reads.
    pub fn registered() -> Self {
        Self {
            selection_type: "registered".to_string(),
            selection_match: None,
            include_runtime: Some(true),
            include_sensors: Some(true),
            include_program: Some(true),
            include_equipment_status: Some(true),
            include_settings: Some(true),
        }
    }

    pub fn thermostat(identifier: &str) -> Self {
        Self {
            selection_type: "thermostats".to_string(),
            selection_match: Some(identifier.to_string()),
            include_runtime: None,
            include_sensors: None,
            include_program: None,
            include_equipment_status: None,
            include_settings: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SelectionRequest {
    pub selection: Selection,
}

#[derive(Debug, Clone, Serialize)]
pub struct Function {
    #[serde(rename = "type")]
    pub function_type: String,
    pub params: Map<String, Value>,
}

impl Function {
    fn new(function_type: &str, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            function_type: function_type.to_string(),
            params,
        }
    }

    /// Temperatures are tenths of a degree Fahrenheit, sent as strings.
    pub fn set_hold_temperatures(cool_tenths: i32, heat_tenths: i32, hold_type: HoldType) -> Self {
        Self::new(
            "setHold",
            json!({
                "holdType": hold_type.as_str(),
                "coolHoldTemp": cool_tenths.to_string(),
                "heatHoldTemp": heat_tenths.to_string(),
            }),
        )
    }

    pub fn set_climate_hold(climate_ref: &str, hold_type: HoldType) -> Self {
        Self::new(
            "setHold",
            json!({
                "holdType": hold_type.as_str(),
                "holdClimateRef": climate_ref,
            }),
        )
    }

    pub fn resume_program(resume_all: bool) -> Self {
        Self::new(
            "resumeProgram",
            json!({ "resumeAll": resume_all.to_string() }),
        )
    }
}

/// Body of a `POST /1/thermostat` update.
#[derive(Debug, Serialize)]
pub struct UpdateRequest {
    pub selection: Selection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<Function>>,
}

impl UpdateRequest {
    pub fn hvac_mode(identifier: &str, mode: HvacMode) -> Self {
        Self {
            selection: Selection::thermostat(identifier),
            thermostat: Some(json!({ "settings": { "hvacMode": mode.as_str() } })),
            functions: None,
        }
    }

    pub fn function(identifier: &str, function: Function) -> Self {
        Self {
            selection: Selection::thermostat(identifier),
            thermostat: None,
            functions: Some(vec![function]),
        }
    }
}
