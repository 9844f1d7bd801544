pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod queries;
pub mod store;
pub mod temperature;
pub mod types;

pub use auth::{AuthState, ExchangeOutcome, PinGrant, TokenManager};
pub use cache::{Clock, ResponseCache, SystemClock};
pub use client::EcobeeClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{Capability, FanMode, HoldType, HvacMode, RemoteSensor, Thermostat};
pub use store::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use temperature::TemperatureScale;
