//! External geocoding provider trait.

use async_trait::async_trait;

use crate::error::GeocodeResult;
use crate::types::geo::ProviderMatch;

/// A single free-text lookup against an external geocoding service.
///
/// `Ok(None)` means the provider answered but found nothing.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn lookup(&self, query: &str) -> GeocodeResult<Option<ProviderMatch>>;

    /// Name for logging.
    fn name(&self) -> &str {
        "provider"
    }
}

#[async_trait]
impl<T: GeocodeProvider + ?Sized> GeocodeProvider for std::sync::Arc<T> {
    async fn lookup(&self, query: &str) -> GeocodeResult<Option<ProviderMatch>> {
        (**self).lookup(query).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
