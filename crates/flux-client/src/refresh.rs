use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::store::{CredentialStore, Credentials};

/// Single-flight guard around the credential refresh.
///
/// Every caller that sees a 401 funnels through [`RefreshGate::refresh`].
/// The async mutex serializes them; the store generation recorded *before*
/// the failed request tells a queued caller whether the refresh it was
/// waiting on already happened, in which case it takes the fresh
/// credentials without issuing a second backend call. At most one refresh
/// reaches the backend per expiry, no matter how many requests discover
/// the expiry concurrently.
#[derive(Default)]
pub struct RefreshGate {
    lock: Mutex<()>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `perform` at most once across concurrent callers.
    ///
    /// `seen_generation` is the store generation observed when the caller
    /// read the now-rejected access token. `perform` exchanges the current
    /// refresh token for a new pair; any failure is terminal for the
    /// session: the store is cleared and `SessionExpired` is returned.
    pub async fn refresh<F, Fut>(
        &self,
        store: &dyn CredentialStore,
        seen_generation: u64,
        perform: F,
    ) -> Result<Credentials, ApiError>
    where
        F: FnOnce(Credentials) -> Fut,
        Fut: std::future::Future<Output = Result<Credentials, ApiError>>,
    {
        let _guard = self.lock.lock().await;

        // A queued caller whose refresh already happened while it waited:
        // the store moved past the generation it saw, so whatever is in
        // there now is the result of that refresh (or of a logout).
        if store.generation() != seen_generation {
            return store.load().ok_or(ApiError::SessionExpired);
        }

        let current = match store.load() {
            Some(creds) => creds,
            None => return Err(ApiError::SessionExpired),
        };

        match perform(current).await {
            Ok(fresh) => {
                store.save(&fresh)?;
                info!("credentials refreshed");
                Ok(fresh)
            }
            Err(e) => {
                // One attempt only. A rejected refresh token ends the
                // session; stale credentials must not survive it.
                warn!("credential refresh failed: {e}");
                store.clear()?;
                Err(ApiError::SessionExpired)
            }
        }
    }
}
