use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{AuthState, ExchangeOutcome, PinGrant, TokenManager};
use crate::cache::{Clock, ResponseCache, SystemClock};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{HoldType, HvacMode, RemoteSensor, Thermostat};
use crate::queries;
use crate::store::{CredentialStore, Credentials};
use crate::temperature;
use crate::types::{
    Function, Selection, SelectionRequest, StatusResponse, ThermostatListResponse, UpdateRequest,
    AUTH_FAILURE_CODES,
};

/// Everything that must change together sits behind one lock.
struct Inner {
    tokens: TokenManager,
    cache: ResponseCache,
}

/// Status and body of an API response, read in full so ecobee's status
/// object can be inspected on any HTTP status.
struct RawResponse {
    status: StatusCode,
    body: String,
}

impl RawResponse {
    fn api_status(&self) -> Option<crate::types::ApiStatus> {
        serde_json::from_str::<StatusResponse>(&self.body)
            .ok()
            .map(|r| r.status)
    }

    fn is_auth_failure(&self) -> bool {
        if matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return true;
        }
        self.api_status()
            .map(|s| AUTH_FAILURE_CODES.contains(&s.code))
            .unwrap_or(false)
    }

    fn into_body(self) -> Result<String> {
        let api_status = self.api_status();
        let failed_status = api_status.as_ref().filter(|s| s.code != 0);

        if self.status.is_success() && failed_status.is_none() {
            return Ok(self.body);
        }

        let (code, message) = match api_status {
            Some(status) => (Some(status.code), status.message),
            None => (None, self.body),
        };
        error!(
            "ecobee API request failed (http {}, code {:?}): {}",
            self.status, code, message
        );
        Err(Error::Api {
            status: self.status.as_u16(),
            code,
            message,
        })
    }
}

/// Cached, self-refreshing client for the ecobee API.
///
/// One instance per account. All operations serialize on an internal lock,
/// so at most one token refresh is ever in flight and readers always see a
/// complete thermostat list.
pub struct EcobeeClient {
    client: reqwest::Client,
    base_url: String,
    inner: Mutex<Inner>,
}

impl EcobeeClient {
    pub fn new(api_key: Option<String>, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::with_config(api_key, store, ClientConfig::default())
    }

    pub fn with_config(
        api_key: Option<String>,
        store: Arc<dyn CredentialStore>,
        config: ClientConfig,
    ) -> Result<Self> {
        Self::with_clock(api_key, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api_key: Option<String>,
        store: Arc<dyn CredentialStore>,
        config: ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let tokens = TokenManager::new(client.clone(), base_url.clone(), api_key, store)?;
        let cache = ResponseCache::new(config.cache_ttl, clock);

        Ok(Self {
            client,
            base_url,
            inner: Mutex::new(Inner { tokens, cache }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn request_pin(&self) -> Result<PinGrant> {
        self.inner.lock().await.tokens.request_pin().await
    }

    /// One attempt at exchanging the pending pin for tokens.
    pub async fn complete_authorization(&self) -> Result<ExchangeOutcome> {
        self.inner.lock().await.tokens.exchange_tokens().await
    }

    pub async fn refresh_tokens(&self) -> Result<()> {
        self.inner.lock().await.tokens.refresh().await
    }

    /// Drop all tokens and cached data.
    pub async fn logout(&self) {
        let mut inner = self.inner.lock().await;
        inner.tokens.invalidate();
        inner.cache.invalidate();
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.tokens.is_authenticated()
    }

    /// Pin waiting to be entered in the ecobee portal, if any.
    pub async fn pin(&self) -> Option<String> {
        self.inner.lock().await.tokens.pin().map(str::to_owned)
    }

    pub async fn auth_state(&self) -> AuthState {
        self.inner.lock().await.tokens.state().clone()
    }

    pub async fn credentials(&self) -> Credentials {
        self.inner.lock().await.tokens.credentials().clone()
    }

    fn get_headers(token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );

        let auth_value = format!("Bearer {}", token);
        let auth_value = HeaderValue::from_str(&auth_value).map_err(|_| {
            Error::MalformedResponse("access token is not a valid header value".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn bearer(tokens: &TokenManager) -> Result<String> {
        tokens
            .access_token()
            .map(str::to_owned)
            .ok_or_else(|| Error::AuthRequired {
                pin: tokens.pin().map(str::to_owned),
            })
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<RawResponse> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    /// Send a request with the current access token. On an authorization
    /// failure, refresh once and send it once more.
    async fn send_authorized<F>(&self, tokens: &mut TokenManager, build: F) -> Result<String>
    where
        F: Fn(HeaderMap) -> reqwest::RequestBuilder,
    {
        let headers = Self::get_headers(&Self::bearer(tokens)?)?;
        let response = self.execute(build(headers)).await?;
        if !response.is_auth_failure() {
            return response.into_body();
        }

        warn!(
            "ecobee rejected the access token (http {}); refreshing tokens and trying again",
            response.status
        );
        tokens.refresh().await?;

        let headers = Self::get_headers(&Self::bearer(tokens)?)?;
        let retry = self.execute(build(headers)).await?;
        if retry.is_auth_failure() {
            error!("ecobee rejected the refreshed access token");
            return Err(Error::AuthExpired);
        }
        retry.into_body()
    }

    async fn fetch_live(&self, tokens: &mut TokenManager) -> Result<Vec<Thermostat>> {
        let url = format!("{}/1/thermostat", self.base_url);
        let selection = serde_json::to_string(&SelectionRequest {
            selection: Selection::registered(),
        })?;

        let body = self
            .send_authorized(tokens, |headers| {
                self.client
                    .get(&url)
                    .headers(headers)
                    .query(&[("json", selection.as_str())])
            })
            .await?;

        match serde_json::from_str::<ThermostatListResponse>(&body) {
            Ok(response) => {
                debug!("Found {} thermostats", response.thermostat_list.len());
                Ok(response.thermostat_list)
            }
            Err(e) => {
                error!("Failed to parse thermostat list: {}", e);
                debug!("Raw response: {}", body);
                Err(Error::MalformedResponse(format!("thermostat list: {}", e)))
            }
        }
    }

    /// Thermostats registered to the account, served from cache while fresh.
    pub async fn get_thermostats(&self, force_refresh: bool) -> Result<Arc<Vec<Thermostat>>> {
        let mut guard = self.inner.lock().await;
        let Inner { tokens, cache } = &mut *guard;
        cache
            .get_or_fetch(force_refresh, move || self.fetch_live(tokens))
            .await
    }

    /// Always ask the API, then cache the result.
    pub async fn fetch_thermostats(&self) -> Result<Arc<Vec<Thermostat>>> {
        self.get_thermostats(true).await
    }

    /// The last fetched list, however old. Never touches the network.
    pub async fn cached_thermostats(&self) -> Option<Arc<Vec<Thermostat>>> {
        self.inner
            .lock()
            .await
            .cache
            .snapshot()
            .map(|s| Arc::clone(&s.thermostats))
    }

    pub async fn invalidate_cache(&self) {
        self.inner.lock().await.cache.invalidate();
    }

    pub async fn thermostat(&self, identifier: &str) -> Result<Thermostat> {
        let thermostats = self.get_thermostats(false).await?;
        queries::find_thermostat(&thermostats, identifier).cloned()
    }

    /// The sensor with `code`, searched across every thermostat.
    pub async fn find_sensor_by_code(&self, code: &str) -> Result<RemoteSensor> {
        let thermostats = self.get_thermostats(false).await?;
        let (_, sensor) = queries::find_sensor_by_code(&thermostats, code)?;
        Ok(sensor.clone())
    }

    async fn update(&self, request: &UpdateRequest, action: &str) -> Result<()> {
        let url = format!("{}/1/thermostat", self.base_url);
        debug!("Sending {} to ecobee: {:?}", action, request);

        let mut guard = self.inner.lock().await;
        let Inner { tokens, cache } = &mut *guard;
        self.send_authorized(tokens, |headers| {
            self.client
                .post(&url)
                .headers(headers)
                .query(&[("format", "json")])
                .json(request)
        })
        .await?;

        cache.invalidate();
        info!("{} succeeded", action);
        Ok(())
    }

    pub async fn set_hvac_mode(&self, identifier: &str, mode: HvacMode) -> Result<()> {
        self.update(
            &UpdateRequest::hvac_mode(identifier, mode),
            &format!("set hvac mode {} on {}", mode, identifier),
        )
        .await
    }

    /// Temperatures are tenths of a degree Fahrenheit.
    pub async fn set_hold_temperatures(
        &self,
        identifier: &str,
        cool_tenths: i32,
        heat_tenths: i32,
        hold_type: HoldType,
    ) -> Result<()> {
        self.update(
            &UpdateRequest::function(
                identifier,
                Function::set_hold_temperatures(cool_tenths, heat_tenths, hold_type),
            ),
            &format!(
                "set hold cool={} heat={} on {}",
                cool_tenths, heat_tenths, identifier
            ),
        )
        .await
    }

    /// Hold at the given setpoints in degrees Fahrenheit until the next
    /// program transition.
    pub async fn set_hold(&self, identifier: &str, cool_f: f64, heat_f: f64) -> Result<()> {
        self.set_hold_temperatures(
            identifier,
            temperature::to_tenths(cool_f),
            temperature::to_tenths(heat_f),
            HoldType::NextTransition,
        )
        .await
    }

    pub async fn set_climate_hold(
        &self,
        identifier: &str,
        climate_ref: &str,
        hold_type: HoldType,
    ) -> Result<()> {
        self.update(
            &UpdateRequest::function(
                identifier,
                Function::set_climate_hold(climate_ref, hold_type),
            ),
            &format!("set climate hold {} on {}", climate_ref, identifier),
        )
        .await
    }

    pub async fn resume_program(&self, identifier: &str, resume_all: bool) -> Result<()> {
        self.update(
            &UpdateRequest::function(identifier, Function::resume_program(resume_all)),
            &format!("resume program on {}", identifier),
        )
        .await
    }
}
