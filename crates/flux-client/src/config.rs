use url::Url;

use crate::error::ApiError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Backend endpoints. `ws_base` defaults to `api_base` with the scheme
/// swapped to its WebSocket counterpart.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: Url,
    pub ws_base: Url,
}

impl ClientConfig {
    pub fn new(api_base: Url) -> Self {
        let ws_base = ws_base_from(&api_base);
        Self { api_base, ws_base }
    }

    /// Read `FLUX_API_URL` / `FLUX_WS_URL` from the environment, falling
    /// back to localhost defaults. The binary loads `.env` before this.
    pub fn from_env() -> Result<Self, ApiError> {
        let api_base = std::env::var("FLUX_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let api_base = Url::parse(&api_base).map_err(invalid_url)?;

        let ws_base = match std::env::var("FLUX_WS_URL") {
            Ok(raw) => Url::parse(&raw).map_err(invalid_url)?,
            Err(_) => ws_base_from(&api_base),
        };

        Ok(Self { api_base, ws_base })
    }

    /// Join a path onto the REST base URL, keeping any prefix the base
    /// already carries (e.g. a reverse-proxy mount like `/api`).
    pub fn api_url(&self, path: &str) -> Url {
        let mut url = self.api_base.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}{path}"));
        url
    }
}

fn ws_base_from(api_base: &Url) -> Url {
    let mut ws = api_base.clone();
    let scheme = match api_base.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    // Only fails for schemes Url considers special-cased; ws/wss are fine.
    let _ = ws.set_scheme(scheme);
    ws
}

fn invalid_url(e: url::ParseError) -> ApiError {
    ApiError::Config(format!("invalid base URL: {e}"))
}
