use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::{CredentialStore, Credentials};
use crate::types::{PinResponse, TokenResponse};

/// Scope requested for the developer app.
pub const SCOPE: &str = "smartWrite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Waiting for the user to enter the pin in the ecobee portal. `pin` is
    /// `None` when the authorization code was restored from the store.
    PinPending {
        pin: Option<String>,
        authorization_code: String,
    },
    Authenticated,
}

/// What a successful pin request hands back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinGrant {
    pub pin: String,
    pub authorization_code: String,
    /// Minutes until the pin expires.
    pub expires_in: Option<u64>,
    /// Recommended seconds between authorization polls.
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Authorized,
    /// The user has not entered the pin yet. Try again later.
    Pending,
}

/// Owns the credentials and walks the pin / token / refresh state machine.
pub struct TokenManager {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    state: AuthState,
    store: Arc<dyn CredentialStore>,
}

impl TokenManager {
    /// Restore credentials from `store`. An explicit `api_key` replaces the
    /// stored one, and tokens issued for a different key are dropped.
    ///
    /// An unreadable store is treated as empty; the next successful save
    /// replaces it.
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let stored = match store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable stored credentials: {}", e);
                None
            }
        };

        let credentials = match (api_key, stored) {
            (Some(key), Some(stored)) if stored.api_key == key => stored,
            (Some(key), Some(_)) => {
                info!("API key changed; discarding stored tokens");
                Credentials::new(key)
            }
            (Some(key), None) => Credentials::new(key),
            (None, Some(stored)) if !stored.api_key.is_empty() => stored,
            (None, _) => {
                return Err(Error::Config(
                    "No API key configured. Create one under Developer in the ecobee portal."
                        .to_string(),
                ))
            }
        };

        let state = if credentials.has_tokens() {
            AuthState::Authenticated
        } else if !credentials.authorization_code.is_empty() {
            AuthState::PinPending {
                pin: None,
                authorization_code: credentials.authorization_code.clone(),
            }
        } else {
            AuthState::Unauthenticated
        };
        debug!("Token manager starting in state {:?}", state);

        Ok(Self {
            client,
            base_url,
            credentials,
            state,
            store,
        })
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn pin(&self) -> Option<&str> {
        match &self.state {
            AuthState::PinPending { pin, .. } => pin.as_deref(),
            _ => None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        match self.state {
            AuthState::Authenticated if !self.credentials.access_token.is_empty() => {
                Some(&self.credentials.access_token)
            }
            _ => None,
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.credentials) {
            warn!("Failed to persist ecobee credentials: {}", e);
        }
    }

    /// Ask ecobee for a pin the user enters under My Apps in the portal.
    /// Starts a fresh authorization; any existing tokens are dropped.
    pub async fn request_pin(&mut self) -> Result<PinGrant> {
        debug!("Requesting ecobee PIN");

        let response = self
            .client
            .get(format!("{}/authorize", self.base_url))
            .query(&[
                ("response_type", "ecobeePin"),
                ("client_id", self.credentials.api_key.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("PIN request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("PIN request failed: {}", e)))?;

        if !status.is_success() {
            error!("PIN request rejected with status {}", status);
            return Err(Error::Auth(format!(
                "PIN request rejected ({}): {}",
                status, response_text
            )));
        }

        let pin_response: PinResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::Auth(format!("Failed to parse PIN response: {}", e)))?;

        self.credentials.clear_tokens();
        self.credentials.authorization_code = pin_response.code.clone();
        self.state = AuthState::PinPending {
            pin: Some(pin_response.ecobee_pin.clone()),
            authorization_code: pin_response.code.clone(),
        };
        self.persist();

        info!(
            "Authorize the app with PIN {} under My Apps at https://www.ecobee.com/consumerportal",
            pin_response.ecobee_pin
        );

        Ok(PinGrant {
            pin: pin_response.ecobee_pin,
            authorization_code: pin_response.code,
            expires_in: pin_response.expires_in,
            interval: pin_response.interval,
        })
    }

    /// Trade the authorization code for tokens. Returns
    /// [`ExchangeOutcome::Pending`] until the user has entered the pin.
    pub async fn exchange_tokens(&mut self) -> Result<ExchangeOutcome> {
        let authorization_code = match &self.state {
            AuthState::PinPending {
                authorization_code, ..
            } => authorization_code.clone(),
            AuthState::Authenticated => {
                debug!("Already authenticated; nothing to exchange");
                return Ok(ExchangeOutcome::Authorized);
            }
            AuthState::Unauthenticated => return Err(Error::AuthRequired { pin: None }),
        };

        debug!("Exchanging authorization code for tokens");
        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .query(&[
                ("grant_type", "ecobeePin"),
                ("code", authorization_code.as_str()),
                ("client_id", self.credentials.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            info!(
                "Token exchange not granted yet ({}); waiting for the PIN to be entered",
                status
            );
            debug!("Token exchange response: {}", response_text);
            return Ok(ExchangeOutcome::Pending);
        }

        let tokens: TokenResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::MalformedResponse(format!("token response: {}", e)))?;

        self.credentials.access_token = tokens.access_token;
        self.credentials.refresh_token = tokens.refresh_token;
        self.credentials.authorization_code.clear();
        self.state = AuthState::Authenticated;
        self.persist();

        info!("Authenticated with ecobee");
        Ok(ExchangeOutcome::Authorized)
    }

    /// Rotate the token pair.
    ///
    /// If ecobee rejects the refresh token, the manager falls back to
    /// `Unauthenticated`, immediately requests a new pin and returns
    /// [`Error::AuthRequired`] carrying that pin. A transport failure leaves
    /// the current tokens in place.
    pub async fn refresh(&mut self) -> Result<()> {
        if self.credentials.refresh_token.is_empty() {
            warn!("No refresh token available");
            return Err(self.reauthenticate().await);
        }

        debug!("Refreshing ecobee tokens");
        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .query(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("client_id", self.credentials.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            warn!("Token refresh rejected ({}): {}", status, response_text);
            return Err(self.reauthenticate().await);
        }

        let tokens: TokenResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::MalformedResponse(format!("refresh response: {}", e)))?;

        // ecobee issues a new refresh token every time; the old one is dead.
        self.credentials.access_token = tokens.access_token;
        self.credentials.refresh_token = tokens.refresh_token;
        self.state = AuthState::Authenticated;
        self.persist();

        match tokens.expires_in {
            Some(secs) => info!("Refreshed ecobee tokens (valid for {}s)", secs),
            None => info!("Refreshed ecobee tokens"),
        }
        Ok(())
    }

    async fn reauthenticate(&mut self) -> Error {
        self.credentials.clear_tokens();
        self.state = AuthState::Unauthenticated;
        self.persist();

        match self.request_pin().await {
            Ok(grant) => Error::AuthRequired {
                pin: Some(grant.pin),
            },
            Err(e) => {
                error!("Could not start a new authorization: {}", e);
                Error::AuthRequired { pin: None }
            }
        }
    }

    /// Forget every token and pending authorization. The API key is kept.
    pub fn invalidate(&mut self) {
        self.credentials.clear_tokens();
        self.credentials.authorization_code.clear();
        self.state = AuthState::Unauthenticated;
        self.persist();
        info!("Signed out of ecobee");
    }
}
