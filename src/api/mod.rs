pub mod client;
pub mod error;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{LlamaClient, LLAMA2_STOP_MARKERS};
pub use error::ModelError;
pub use stream::{fragment_stream, StreamEvent, StreamParser};

use crate::types::Message;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Raw response body chunks as they arrive from the server.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ModelError>> + Send>>;

/// Assistant content fragments in arrival order. Finite and single-pass: the
/// loop drains it completely before touching the conversation again.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// The model runtime as seen by the turn loop.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Tokenizes `text` with the model's own vocabulary.
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError>;

    /// Starts a streaming completion over the whole transcript.
    ///
    /// Fails with [`ModelError::BudgetExceeded`] when the composed prompt does
    /// not fit the model's context window.
    async fn stream_complete(
        &self,
        messages: &[Message],
        stop: &[&str],
    ) -> Result<FragmentStream, ModelError>;
}
