use super::{FragmentStream, ModelError, ModelService};
use crate::types::Message;
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// One scripted reply of [`MockModelService`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Fragments(Vec<String>),
    BudgetExceeded,
}

impl MockReply {
    pub fn text(fragments: &[&str]) -> Self {
        MockReply::Fragments(fragments.iter().map(|f| f.to_string()).collect())
    }
}

/// Scripted stand-in for the model server. Tokenization counts one token per
/// whitespace-separated word plus a leading BOS token, which keeps costs easy
/// to predict in tests.
#[derive(Clone, Default)]
pub struct MockModelService {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockModelService {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::default(),
        }
    }

    /// Every transcript passed to `stream_complete`, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token_count(text: &str) -> usize {
        text.split_whitespace().count() + 1
    }
}

#[async_trait]
impl ModelService for MockModelService {
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        Ok((0..Self::token_count(text) as u32).collect())
    }

    async fn stream_complete(
        &self,
        messages: &[Message],
        _stop: &[&str],
    ) -> Result<FragmentStream, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ModelError::Protocol("MockModelService: no more replies".into()))?;

        match reply {
            MockReply::Fragments(fragments) => {
                let items: Vec<Result<String, ModelError>> =
                    fragments.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            MockReply::BudgetExceeded => Err(ModelError::BudgetExceeded(
                "the request exceeds the available context size".into(),
            )),
        }
    }
}
