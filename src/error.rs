use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Transport failure talking to the API.
    Network(reqwest::Error),
    /// The API still rejected the access token after a successful refresh.
    AuthExpired,
    /// No usable tokens. When `pin` is set, a fresh pin flow has already been
    /// started and the user needs to enter it in the ecobee portal.
    AuthRequired { pin: Option<String> },
    /// Requesting a pin failed or returned an unusable payload.
    Auth(String),
    NotFound(String),
    MalformedResponse(String),
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },
    /// A value given by the user that does not name anything valid.
    InvalidValue(String),
    Config(String),
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
}

impl Error {
    /// Whether the host needs the user to (re)authorize the app.
    pub fn needs_user_authorization(&self) -> bool {
        matches!(self, Error::AuthRequired { .. } | Error::AuthExpired)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Network(err) => write!(f, "Network error: {}", err),
            Error::AuthExpired => write!(
                f,
                "Authentication expired: the API rejected the refreshed access token"
            ),
            Error::AuthRequired { pin: Some(pin) } => write!(
                f,
                "Authorization required: enter PIN {} under My Apps at https://www.ecobee.com/consumerportal",
                pin
            ),
            Error::AuthRequired { pin: None } => {
                write!(f, "Authorization required: request a new PIN")
            }
            Error::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            Error::Api {
                status,
                code: Some(code),
                message,
            } => write!(f, "API error (http {}, code {}): {}", status, code, message),
            Error::Api {
                status,
                code: None,
                message,
            } => write!(f, "API error (http {}): {}", status, message),
            Error::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Yaml(err) => write!(f, "YAML parsing error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Network(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Yaml(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_required_mentions_pin() {
        let err = Error::AuthRequired {
            pin: Some("ab12".to_string()),
        };
        assert!(err.to_string().contains("ab12"));
        assert!(err.needs_user_authorization());
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 500,
            code: Some(3),
            message: "Processing error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (http 500, code 3): Processing error"
        );
        assert!(!err.needs_user_authorization());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound("sensor rs:100".to_string());
        assert_eq!(err.to_string(), "Not found: sensor rs:100");
    }

    #[test]
    fn test_invalid_value_does_not_blame_the_server() {
        let err = Error::InvalidValue("unknown hvac mode `turbo`".to_string());
        assert_eq!(err.to_string(), "Invalid value: unknown hvac mode `turbo`");
    }
}
