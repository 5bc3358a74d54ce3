pub mod batch;
pub mod provider;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use batch::{
    BatchItem, BatchItemReport, BatchReport, BatchVectorizer, BatchVectorizerConfig, ItemOutcome,
    SinkError, VectorSink,
};
pub use provider::{HttpVectorProvider, ProviderConfig};

/// Failure of a single external vector-generation call. In batch
/// contexts these are always isolated per item, never batch-fatal.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("provider returned {got} components, expected {expected}")]
    WrongDimension { got: usize, expected: usize },
}

/// What gets embedded: choice label text or an image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedInput {
    Text(String),
    Image(String),
}

/// The opaque external vector provider. Dimensionality is fixed per
/// modality for a given provider instance; everything downstream
/// assumes vectors of one semantic family share it.
#[async_trait]
pub trait VectorProvider: Send + Sync {
    /// Implementation name, recorded in logs.
    fn name(&self) -> &'static str;

    fn text_dimension(&self) -> usize;

    fn image_dimension(&self) -> usize;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    async fn embed_image(&self, image_ref: &str) -> Result<Vec<f32>, ProviderError>;

    /// Dispatch on input modality and enforce the family dimension.
    async fn embed(&self, input: &EmbedInput) -> Result<Vec<f32>, ProviderError> {
        let (vector, expected) = match input {
            EmbedInput::Text(text) => (self.embed_text(text).await?, self.text_dimension()),
            EmbedInput::Image(image_ref) => {
                (self.embed_image(image_ref).await?, self.image_dimension())
            }
        };

        if vector.len() != expected {
            return Err(ProviderError::WrongDimension {
                got: vector.len(),
                expected,
            });
        }
        Ok(vector)
    }
}
