pub mod frontend;
pub mod turn;

pub use frontend::{Frontend, PromptKind, TerminalFrontend};
pub use turn::{TurnLoop, TurnOutcome, TurnPhase, RESET_NOTICE};
