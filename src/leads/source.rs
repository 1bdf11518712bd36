//! Lead Source
//!
//! Wraps a `LeadsApi` with the session token lookup and the cached lead set
//! the screen renders from.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::{FetchLeadsRequest, LeadError, LeadsApi};
use super::LeadRecord;

/// Session token collaborator (the signed-in user's bearer token)
#[async_trait]
pub trait SessionTokenProvider: Send + Sync {
    async fn get_token(&self) -> Option<String>;
}

/// Fixed token, e.g. from the CLI or environment
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider(pub Option<String>);

#[async_trait]
impl SessionTokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Lead list with a wholesale-replaced cache
pub struct LeadSource {
    api: Arc<dyn LeadsApi>,
    tokens: Arc<dyn SessionTokenProvider>,
    cache: RwLock<Arc<Vec<LeadRecord>>>,
}

impl LeadSource {
    pub fn new(api: Arc<dyn LeadsApi>, tokens: Arc<dyn SessionTokenProvider>) -> Self {
        Self {
            api,
            tokens,
            cache: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current cached lead set
    pub fn leads(&self) -> Arc<Vec<LeadRecord>> {
        Arc::clone(&self.cache.read())
    }

    pub async fn fetch(&self, request: &FetchLeadsRequest) -> Result<Arc<Vec<LeadRecord>>, LeadError> {
        self.fetch_until_cancelled(request, &CancellationToken::new()).await
    }

    /// Fetch one page and replace the cache, unless `cancel` fired while the
    /// request was in flight. Fails fast without a token. No retry.
    pub async fn fetch_until_cancelled(
        &self,
        request: &FetchLeadsRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<Vec<LeadRecord>>, LeadError> {
        let token = match self.tokens.get_token().await {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                warn!("No session token; skipping lead fetch");
                return Err(LeadError::AuthRequired);
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Lead fetch abandoned on teardown");
                return Err(LeadError::Cancelled);
            }
            result = self.api.fetch_leads(&token, request) => result,
        };

        if cancel.is_cancelled() {
            info!("Lead fetch finished after teardown; discarding");
            return Err(LeadError::Cancelled);
        }

        let leads = Arc::new(result.map_err(|e| {
            warn!(error = %e, "Lead fetch failed; keeping cached leads");
            e
        })?);
        *self.cache.write() = Arc::clone(&leads);
        Ok(leads)
    }
}
