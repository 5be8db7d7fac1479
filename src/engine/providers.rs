//! Provider connectivity testing.

use super::BiblioTranslator;
use crate::config::{ProviderConfig, validate_providers};
use crate::error::Result;
use crate::types::ConnectionTestResult;

impl BiblioTranslator {
    /// Probe a provider endpoint with a single minimal request
    ///
    /// An unreachable endpoint or a rejected key is reported through the
    /// returned [`ConnectionTestResult`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration itself is invalid or no client
    /// can be built for it.
    pub async fn test_provider(&self, provider: &ProviderConfig) -> Result<ConnectionTestResult> {
        validate_providers(std::slice::from_ref(provider))?;

        let client = self.providers.client(provider)?;
        Ok(client.test_connection().await)
    }
}
