//! Device information handler; answers travel as reports, not replies

use super::{argument, HandlerContext};
use crate::actuator::InfoKind;
use crate::command::CommandResult;
use devlink_shared::CommandEnvelope;
use serde_json::json;

/// Handle DeviceInfo
pub async fn handle_device_info(ctx: &HandlerContext, command: &CommandEnvelope) -> CommandResult {
    let kind: InfoKind = match argument(command, "informationType").parse() {
        Ok(kind) => kind,
        Err(e) => {
            return CommandResult::Rejected {
                message: e.to_string(),
            }
        }
    };

    match ctx.actuator.read_info(kind).await {
        Ok(value) => CommandResult::Report(json!({
            "device": ctx.device_id,
            "info": kind.as_str(),
            "value": value,
        })),
        Err(e) => CommandResult::Failed {
            message: format!("Could not read {}: {}", kind.as_str(), e),
        },
    }
}
