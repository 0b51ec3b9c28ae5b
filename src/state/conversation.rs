use crate::api::{ModelError, ModelService};
use crate::types::{Message, Role};

/// Token cost of one transcript entry: the role wrapped as `<role></role>`
/// plus the content, each tokenized on its own.
pub async fn message_cost<M>(model: &M, message: &Message) -> Result<usize, ModelError>
where
    M: ModelService + ?Sized,
{
    let role_tag = format!("<{0}></{0}>", message.role);
    let role_tokens = model.tokenize(&role_tag).await?;
    let content_tokens = model.tokenize(&message.content).await?;
    Ok(role_tokens.len() + content_tokens.len())
}

pub fn wrap_user_input(input: &str) -> String {
    if input.is_empty() {
        String::new()
    } else {
        format!("<USER>\n{input}\n</USER>")
    }
}

pub fn wrap_system_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!("<SYSTEM>\n{output}\n</SYSTEM>\n")
    }
}

/// The transcript sent to the model together with its running token count.
///
/// The first message is always the system preamble. The count only grows as
/// messages are appended; [`Conversation::reset`] is the only way back down,
/// and it drops everything but the preamble.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    system_cost: usize,
    token_count: usize,
    pending_system_output: String,
}

impl Conversation {
    pub async fn start<M>(model: &M, preamble: impl Into<String>) -> Result<Self, ModelError>
    where
        M: ModelService + ?Sized,
    {
        let system = Message::system(preamble);
        let system_cost = message_cost(model, &system).await?;
        Ok(Self {
            messages: vec![system],
            system_cost,
            token_count: system_cost,
            pending_system_output: String::new(),
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn exceeds(&self, budget: usize) -> bool {
        self.token_count > budget
    }

    pub fn pending_system_output(&self) -> &str {
        &self.pending_system_output
    }

    /// Appends `message` and adds its cost to the running count.
    pub async fn append<M>(&mut self, model: &M, message: Message) -> Result<usize, ModelError>
    where
        M: ModelService + ?Sized,
    {
        debug_assert!(message.role != Role::System, "only the preamble is a system turn");
        let cost = message_cost(model, &message).await?;
        self.messages.push(message);
        self.token_count += cost;
        Ok(cost)
    }

    /// Stores the wrapped output of this turn's scripts for the next user turn.
    pub fn set_pending_system_output(&mut self, captured: &str) {
        self.pending_system_output = wrap_system_output(captured);
    }

    /// Builds the next user message, consuming any pending script output.
    pub fn compose_user_turn(&mut self, input: &str) -> Message {
        let mut content = std::mem::take(&mut self.pending_system_output);
        content.push_str(&wrap_user_input(input));
        Message::user(content)
    }

    pub fn reset(&mut self) {
        self.messages.truncate(1);
        self.token_count = self.system_cost;
        self.pending_system_output.clear();
    }
}
