//! Application control handler

use super::{argument, perform, HandlerContext};
use crate::actuator::{Action, WindowControl};
use crate::command::CommandResult;
use devlink_shared::CommandEnvelope;

/// Handle AppControl: open, close, minimize or maximize an application
pub async fn handle_app_control(ctx: &HandlerContext, command: &CommandEnvelope) -> CommandResult {
    let name = argument(command, "applicationName").trim();
    if name.is_empty() {
        return CommandResult::Rejected {
            message: "Application name is empty".into(),
        };
    }

    let control: WindowControl = match argument(command, "applicationControlType").parse() {
        Ok(control) => control,
        Err(e) => {
            return CommandResult::Rejected {
                message: e.to_string(),
            }
        }
    };

    perform(
        ctx,
        Action::Application {
            name: name.to_string(),
            control,
        },
    )
    .await
}
