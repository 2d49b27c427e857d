//! Typing and system control handlers

use super::{argument, perform, HandlerContext};
use crate::actuator::{Action, SystemAction};
use crate::command::CommandResult;
use devlink_shared::CommandEnvelope;

/// Handle TypingControl
pub async fn handle_typing_control(
    ctx: &HandlerContext,
    command: &CommandEnvelope,
) -> CommandResult {
    let text = argument(command, "typingContent");
    if text.is_empty() {
        return CommandResult::Rejected {
            message: "Nothing to type".into(),
        };
    }

    perform(ctx, Action::Type(text.to_string())).await
}

/// Handle SystemControl; only actions in the closed list are accepted
pub async fn handle_system_control(
    ctx: &HandlerContext,
    command: &CommandEnvelope,
) -> CommandResult {
    match argument(command, "action").parse::<SystemAction>() {
        Ok(action) => perform(ctx, Action::System(action)).await,
        Err(e) => CommandResult::Rejected {
            message: e.to_string(),
        },
    }
}
