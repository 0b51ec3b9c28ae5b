mod bridge;
mod extract;
mod gate;

pub use bridge::{ScriptRunner, ShellBridge, ShellError, ShellSession, SENTINEL_PREFIX};
pub use extract::{extract, ScriptBlock};
pub use gate::{confirmation_prompt, decide, execute_blocks, ExecutionReport, GateDecision};
