mod conversation;
mod preamble;

pub use conversation::{
    message_cost, wrap_system_output, wrap_user_input, Conversation,
};
pub use preamble::{detect_shell_environment, system_preamble};
