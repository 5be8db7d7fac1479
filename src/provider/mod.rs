//! Translation provider clients
//!
//! A [`ProviderClient`] translates one text fragment per call, with retries
//! already applied, and can probe its endpoint. Execution workers obtain their
//! own client from a [`ProviderFactory`] so that tests can substitute scripted
//! providers for the HTTP implementation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::Result;
use crate::config::{HttpClientConfig, ProviderConfig, RetryConfig};
use crate::types::{ConnectionTestResult, TranslateField, TranslationResult};

mod http;
mod response;

pub use http::HttpProviderClient;

/// A configured translation endpoint
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Translate one fragment, retrying transient failures
    ///
    /// Never returns an error: failures are reported through
    /// [`TranslationResult::success`] and [`TranslationResult::error_message`].
    async fn translate(&self, text: &str, field: TranslateField) -> TranslationResult;

    /// Issue a single minimal request to validate endpoint and credentials
    async fn test_connection(&self) -> ConnectionTestResult;
}

/// Builds provider clients from their configuration
pub trait ProviderFactory: Send + Sync {
    /// Create a client for `provider`
    fn client(&self, provider: &ProviderConfig) -> Result<Arc<dyn ProviderClient>>;
}

/// Factory for [`HttpProviderClient`]s sharing one retry policy and timeout set
#[derive(Clone, Debug, Default)]
pub struct HttpProviderFactory {
    retry: RetryConfig,
    http: HttpClientConfig,
}

impl HttpProviderFactory {
    /// Create a factory using the given retry policy and timeouts
    pub fn new(retry: RetryConfig, http: HttpClientConfig) -> Self {
        Self { retry, http }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn client(&self, provider: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        let client = HttpProviderClient::new(provider.clone(), self.retry.clone(), &self.http)?;
        Ok(Arc::new(client))
    }
}
