use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use flux_types::api::{RefreshRequest, TokenPair};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::refresh::RefreshGate;
use crate::store::{CredentialStore, Credentials};

/// Body placeholder for requests without one.
pub(crate) const NO_BODY: Option<&()> = None;

/// Typed client for the Flux backend. Cheap to clone; every clone shares
/// the credential store and the refresh gate, so concurrent requests
/// across clones still coordinate on a single in-flight refresh.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    gate: RefreshGate,
}

impl ApiClient {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http: reqwest::Client::new(),
                config,
                store,
                gate: RefreshGate::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    /// Current access token, if logged in. The gateway reads this on every
    /// connection attempt so reconnects pick up refreshed tokens.
    pub fn access_token(&self) -> Option<String> {
        self.inner.store.load().map(|c| c.access_token)
    }

    pub(crate) fn url_for(&self, path: &str) -> Url {
        self.inner.config.api_url(path)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.inner.http.request(method, self.url_for(path))
    }

    // -- Unauthenticated requests --

    pub(crate) async fn send_public<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, ApiError> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        decode(check(resp).await?).await
    }

    // -- Authenticated requests --

    /// Send with a bearer token; on 401, run the shared refresh and retry
    /// the original request exactly once with the fresh token.
    pub(crate) async fn send_authed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, ApiError> {
        let url = self.url_for(path);
        let resp = self.dispatch_authed(method, url, body).await?;
        decode(resp).await
    }

    /// Authenticated request whose response body is discarded.
    pub(crate) async fn send_authed_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<(), ApiError> {
        let url = self.url_for(path);
        self.dispatch_authed(method, url, body).await?;
        Ok(())
    }

    /// Authenticated GET with a query string.
    pub(crate) async fn get_authed_query<T: DeserializeOwned>(
        &self,
        path: &str,
        pairs: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let mut url = self.url_for(path);
        url.query_pairs_mut().extend_pairs(pairs);
        let resp = self.dispatch_authed(Method::GET, url, NO_BODY).await?;
        decode(resp).await
    }

    async fn dispatch_authed(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<Response, ApiError> {
        let creds = self.inner.store.load().ok_or(ApiError::Unauthorized)?;
        let seen_generation = self.inner.store.generation();

        let resp = self
            .build_authed(method.clone(), url.clone(), body, &creds.access_token)
            .send()
            .await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return check(resp).await;
        }

        debug!("{} {} returned 401, attempting token refresh", method, url.path());
        let fresh = self.refresh_credentials(seen_generation).await?;

        let retry = self
            .build_authed(method, url, body, &fresh.access_token)
            .send()
            .await?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        check(retry).await
    }

    fn build_authed(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + ?Sized)>,
        access_token: &str,
    ) -> RequestBuilder {
        let mut req = self.inner.http.request(method, url).bearer_auth(access_token);
        if let Some(body) = body {
            req = req.json(body);
        }
        req
    }

    /// Exchange the stored refresh token for a new pair, coordinated
    /// through the refresh gate so concurrent 401s trigger one backend
    /// call. Failure clears the store and ends the session.
    pub async fn refresh_credentials(
        &self,
        seen_generation: u64,
    ) -> Result<Credentials, ApiError> {
        self.inner
            .gate
            .refresh(self.inner.store.as_ref(), seen_generation, |current| {
                self.perform_refresh(current)
            })
            .await
    }

    async fn perform_refresh(&self, current: Credentials) -> Result<Credentials, ApiError> {
        let resp = self
            .request(Method::POST, "/users/refresh")
            .json(&RefreshRequest {
                refresh_token: current.refresh_token,
            })
            .send()
            .await?;

        let pair: TokenPair = decode(check(resp).await?).await?;
        Ok(Credentials {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }
}

/// Map non-2xx responses to `ApiError::Status`, using the backend's
/// `detail` field as the message when the body carries one.
async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = match resp.text().await {
        Ok(body) => serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or(body),
        Err(_) => String::new(),
    };

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
