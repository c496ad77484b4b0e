use reqwest::Method;
use tracing::{info, warn};

use flux_types::api::{RefreshRequest, RegisterRequest, TokenPair};
use flux_types::models::User;

use crate::client::{ApiClient, NO_BODY};
use crate::error::ApiError;
use crate::store::Credentials;

impl ApiClient {
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        self.send_public(
            Method::POST,
            "/users/register",
            Some(&RegisterRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            }),
        )
        .await
    }

    /// OAuth2 password login. On success both tokens are persisted; on
    /// failure the store is left untouched and the caller stays logged out.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let resp = self
            .request(Method::POST, "/users/token")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: "login failed".into(),
            });
        }

        let pair: TokenPair = resp.json().await?;
        self.store().save(&Credentials {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
        })?;
        info!("logged in as {username}");
        Ok(pair)
    }

    /// Notify the backend (best effort) and clear stored credentials.
    /// The local session ends regardless of the backend outcome.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Some(creds) = self.store().load() {
            let result = self
                .request(Method::POST, "/users/logout")
                .json(&RefreshRequest {
                    refresh_token: creds.refresh_token,
                })
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    warn!("logout rejected by backend: {}", resp.status());
                }
                Err(e) => warn!("logout notification failed: {e}"),
                Ok(_) => {}
            }
        }
        self.store().clear()?;
        info!("logged out");
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.send_authed(Method::GET, "/users/me", NO_BODY).await
    }

    pub async fn profile(&self, username: &str) -> Result<User, ApiError> {
        self.send_authed(Method::GET, &format!("/users/profile/{username}"), NO_BODY)
            .await
    }
}
