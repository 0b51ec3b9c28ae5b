use super::{extract, ScriptRunner};
use crate::runtime::frontend::{Frontend, PromptKind};
use crate::state::wrap_system_output;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Execute,
    Cancel,
}

pub fn confirmation_prompt(index: usize) -> String {
    format!("[Press enter to execute SH BLOCK {index}, or 'n' to cancel] ")
}

/// A bare enter runs the block; anything else, including end of input,
/// cancels it.
pub fn decide(answer: Option<&str>) -> GateDecision {
    match answer {
        Some("") => GateDecision::Execute,
        _ => GateDecision::Cancel,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: Vec<usize>,
    pub cancelled: Vec<usize>,
    /// Output of every executed block, concatenated in execution order.
    pub captured: String,
}

impl ExecutionReport {
    pub fn system_fragment(&self) -> String {
        wrap_system_output(&self.captured)
    }
}

/// Offers each shell block of `assistant_text` to the operator in order and
/// runs the confirmed ones. Blocks are never run concurrently: a later block
/// may depend on what an earlier one did to the shell.
pub async fn execute_blocks<F, R>(
    assistant_text: &str,
    frontend: &mut F,
    runner: &mut R,
) -> Result<ExecutionReport>
where
    F: Frontend + ?Sized,
    R: ScriptRunner + ?Sized,
{
    let mut report = ExecutionReport::default();

    for block in extract(assistant_text) {
        let answer = frontend
            .read_line(PromptKind::Confirmation, &confirmation_prompt(block.index))
            .await?;
        frontend.blank_line()?;

        match decide(answer.as_deref()) {
            GateDecision::Execute => {
                tracing::info!(block = block.index, "executing shell block");
                let mut echo = |line: &str| frontend.mirror_shell_line(line);
                let output = runner.run_script(&block.script, &mut echo).await?;
                frontend.end_shell_output()?;
                report.captured.push_str(&output);
                report.executed.push(block.index);
            }
            GateDecision::Cancel => {
                tracing::info!(block = block.index, "shell block cancelled by operator");
                report.cancelled.push(block.index);
            }
        }
    }

    Ok(report)
}
