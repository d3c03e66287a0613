use crate::{GenreAnalysis, LlmProvider, ProviderError, TrackQuery};

/// Placeholder provider so the pipeline can run without any API key.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl LlmProvider for NoopProvider {
    async fn analyze(&self, _query: &TrackQuery) -> Result<GenreAnalysis, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
