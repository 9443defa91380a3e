//! Three-legged OAuth 1.0a handshake with the token store as cache.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::oauth::{self, Params};
use crate::tokens::{TokenPair, TokenStore};
use crate::transport::HttpTransport;
use crate::verifier::{AuthorizeRequest, VerifierSource};

pub const REQUEST_TOKEN_URL: &str = "https://authentication.fatsecret.com/oauth/request_token";
pub const AUTHORIZE_URL: &str = "https://authentication.fatsecret.com/oauth/authorize";
pub const ACCESS_TOKEN_URL: &str = "https://authentication.fatsecret.com/oauth/access_token";
pub const API_URL: &str = "https://platform.fatsecret.com/rest/server.api";

/// Callback value for flows where the user copies the verifier by hand.
pub const OUT_OF_BAND: &str = "oob";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub request_token: String,
    pub authorize: String,
    pub access_token: String,
    pub api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            request_token: REQUEST_TOKEN_URL.to_string(),
            authorize: AUTHORIZE_URL.to_string(),
            access_token: ACCESS_TOKEN_URL.to_string(),
            api: API_URL.to_string(),
        }
    }
}

/// Application key and secret issued by the API provider.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoToken,
    RequestTokenObtained,
    AwaitingUserVerifier,
    AccessTokenObtained,
}

pub struct AuthFlow {
    credentials: Credentials,
    endpoints: Endpoints,
    callback_url: String,
    store: TokenStore,
    transport: Arc<dyn HttpTransport>,
    verifier: Box<dyn VerifierSource>,
    state: AuthState,
}

impl AuthFlow {
    pub fn new(
        credentials: Credentials,
        store: TokenStore,
        transport: Arc<dyn HttpTransport>,
        verifier: Box<dyn VerifierSource>,
    ) -> Self {
        Self {
            credentials,
            endpoints: Endpoints::default(),
            callback_url: OUT_OF_BAND.to_string(),
            store,
            transport,
            verifier,
            state: AuthState::NoToken,
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = callback_url.into();
        self
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Return the cached access token, or run the full handshake and cache
    /// its result.
    pub fn authenticate(&mut self) -> Result<TokenPair> {
        if let Some(pair) = self.store.load() {
            debug!("Using stored access token");
            self.state = AuthState::AccessTokenObtained;
            return Ok(pair);
        }
        self.state = AuthState::NoToken;

        let request = self.request_token()?;
        let authorization = self.await_verifier(&request)?;
        let access = self.access_token(&request, &authorization.oauth_verifier)?;

        if let Err(e) = self.store.save(&access) {
            warn!(error = %e, "Could not persist access token");
        }
        info!("Obtained new access token");
        Ok(access)
    }

    /// Called after the API rejected `rejected`. Another process may have
    /// stored a newer pair; otherwise the stored pair is dropped and the
    /// handshake runs again.
    pub fn refresh(&mut self, rejected: &TokenPair) -> Result<TokenPair> {
        match self.store.load() {
            Some(stored) if stored != *rejected => {
                info!("Picked up a newer stored access token");
                self.state = AuthState::AccessTokenObtained;
                Ok(stored)
            }
            _ => {
                warn!("Stored access token was rejected, re-authenticating");
                self.logout();
                self.authenticate()
            }
        }
    }

    /// Forget the stored access token.
    pub fn logout(&mut self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not clear token file");
        }
        self.state = AuthState::NoToken;
    }

    fn request_token(&mut self) -> Result<TokenPair> {
        let url = self.endpoints.request_token.clone();
        let query = self.signed_query(
            &url,
            vec![("oauth_callback".to_string(), self.callback_url.clone())],
            None,
        )?;
        let pair = self.exchange(&url, &query, "request token")?;
        self.state = AuthState::RequestTokenObtained;
        debug!("Obtained request token");
        Ok(pair)
    }

    fn await_verifier(&mut self, request: &TokenPair) -> Result<crate::verifier::Authorization> {
        let authorize = AuthorizeRequest {
            url: format!(
                "{}?oauth_token={}",
                self.endpoints.authorize,
                oauth::percent_encode(&request.token)
            ),
            request_token: request.token.clone(),
        };
        let authorization = self.verifier.obtain(&authorize)?;
        if authorization.oauth_token != request.token {
            return Err(Error::AuthFlow(
                "authorization callback does not match the issued request token".to_string(),
            ));
        }
        self.state = AuthState::AwaitingUserVerifier;
        Ok(authorization)
    }

    fn access_token(&mut self, request: &TokenPair, verifier: &str) -> Result<TokenPair> {
        let url = self.endpoints.access_token.clone();
        let query = self.signed_query(
            &url,
            vec![
                ("oauth_token".to_string(), request.token.clone()),
                ("oauth_verifier".to_string(), verifier.to_string()),
            ],
            Some(&request.secret),
        )?;
        let pair = self.exchange(&url, &query, "access token")?;
        self.state = AuthState::AccessTokenObtained;
        Ok(pair)
    }

    fn signed_query(&self, url: &str, extra: Params, token_secret: Option<&str>) -> Result<Params> {
        let mut params = oauth::protocol_params(
            &self.credentials.consumer_key,
            &oauth::nonce(),
            oauth::timestamp(),
        );
        params.extend(extra);
        let signature = oauth::sign(
            "GET",
            url,
            &params,
            &self.credentials.consumer_secret,
            token_secret,
        )?;
        params.push(("oauth_signature".to_string(), signature));
        Ok(params)
    }

    fn exchange(&self, url: &str, query: &[(String, String)], what: &str) -> Result<TokenPair> {
        let response = self
            .transport
            .get(url, query)
            .map_err(|e| Error::AuthFlow(format!("failed to get {what}: {e}")))?;
        if !response.is_ok() {
            return Err(Error::AuthFlow(format!(
                "failed to get {what} ({}): {}",
                response.status, response.body
            )));
        }
        TokenPair::from_form(&response.body).ok_or_else(|| {
            Error::AuthFlow(format!("malformed {what} response: {}", response.body))
        })
    }
}
