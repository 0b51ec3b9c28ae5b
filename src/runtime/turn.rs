use anyhow::{Context, Result};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::frontend::{Frontend, PromptKind};
use crate::api::{FragmentStream, ModelError, ModelService, LLAMA2_STOP_MARKERS};
use crate::shell::{execute_blocks, ScriptRunner};
use crate::state::Conversation;
use crate::types::Message;

pub const RESET_NOTICE: &str = "Sorry, token count exceeded, starting new chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingInput,
    RequestingCompletion,
    StreamingResponse,
    ExecutingScripts,
    Reset,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Reset,
    EndOfInput,
}

/// Drives the conversation: one operator line, one streamed reply, then the
/// gated execution of whatever shell blocks the reply contains.
pub struct TurnLoop<M, F, R> {
    model: M,
    frontend: F,
    runner: R,
    conversation: Conversation,
    budget: usize,
    phase: TurnPhase,
}

impl<M, F, R> TurnLoop<M, F, R>
where
    M: ModelService,
    F: Frontend,
    R: ScriptRunner,
{
    pub async fn new(
        model: M,
        frontend: F,
        runner: R,
        preamble: impl Into<String>,
        budget: usize,
    ) -> Result<Self> {
        let conversation = Conversation::start(&model, preamble)
            .await
            .context("failed to tokenize the system preamble")?;
        tracing::debug!(
            tokens = conversation.token_count(),
            budget,
            "conversation started"
        );
        Ok(Self {
            model,
            frontend,
            runner,
            conversation,
            budget,
            phase: TurnPhase::AwaitingInput,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs turns until `shutdown` fires or operator input ends, then says
    /// goodbye. A turn in flight when `shutdown` fires is abandoned as is,
    /// and so is any error it raised once `shutdown` has fired.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                outcome = self.run_turn() => match outcome {
                    Ok(outcome) => Some(outcome),
                    Err(err) if shutdown.is_cancelled() => {
                        tracing::debug!(error = %err, "turn failed during shutdown");
                        None
                    }
                    Err(err) => return Err(err),
                },
            };

            match outcome {
                Some(TurnOutcome::Completed) | Some(TurnOutcome::Reset) => continue,
                Some(TurnOutcome::EndOfInput) | None => break,
            }
        }

        self.set_phase(TurnPhase::Exit);
        self.frontend.farewell()?;
        Ok(())
    }

    pub async fn run_turn(&mut self) -> Result<TurnOutcome> {
        self.set_phase(TurnPhase::AwaitingInput);
        let prompt = format!(
            "({}/{}) λ : ",
            self.conversation.token_count(),
            self.budget
        );
        let Some(input) = self.frontend.read_line(PromptKind::Input, &prompt).await? else {
            return Ok(TurnOutcome::EndOfInput);
        };

        match self.exchange(&input).await {
            Ok(()) => Ok(TurnOutcome::Completed),
            Err(err) if is_budget_exceeded(&err) => {
                tracing::warn!(error = %err, "token budget exceeded");
                self.reset()?;
                Ok(TurnOutcome::Reset)
            }
            Err(err) => Err(err),
        }
    }

    async fn exchange(&mut self, input: &str) -> Result<()> {
        self.set_phase(TurnPhase::RequestingCompletion);
        let user_turn = self.conversation.compose_user_turn(input);
        self.conversation.append(&self.model, user_turn).await?;
        if self.conversation.exceeds(self.budget) {
            return Err(ModelError::BudgetExceeded(format!(
                "{} tokens against a budget of {}",
                self.conversation.token_count(),
                self.budget
            ))
            .into());
        }

        let mut fragments = self
            .model
            .stream_complete(self.conversation.messages(), &LLAMA2_STOP_MARKERS)
            .await?;

        self.set_phase(TurnPhase::StreamingResponse);
        self.frontend.begin_response()?;
        let mut content = String::new();
        let drained = drain_fragments(&mut fragments, &mut self.frontend, &mut content).await;
        self.frontend.end_response()?;
        drained?;

        self.set_phase(TurnPhase::ExecutingScripts);
        self.conversation
            .append(&self.model, Message::assistant(content.as_str()))
            .await?;
        let report = execute_blocks(&content, &mut self.frontend, &mut self.runner).await?;
        self.conversation.set_pending_system_output(&report.captured);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.set_phase(TurnPhase::Reset);
        self.conversation.reset();
        self.frontend.notice(RESET_NOTICE)
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            tracing::trace!(from = ?self.phase, to = ?phase, "turn phase");
            self.phase = phase;
        }
    }
}

/// Renders every fragment as it arrives and collects them into `content`.
async fn drain_fragments<F>(
    fragments: &mut FragmentStream,
    frontend: &mut F,
    content: &mut String,
) -> Result<()>
where
    F: Frontend + ?Sized,
{
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        frontend.render_fragment(&fragment)?;
        content.push_str(&fragment);
    }
    Ok(())
}

fn is_budget_exceeded(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ModelError>()
        .is_some_and(ModelError::is_budget_exceeded)
}
