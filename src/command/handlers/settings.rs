//! Brightness and volume handler

use super::{argument, perform, HandlerContext};
use crate::actuator::{Action, Adjustment, Setting};
use crate::command::CommandResult;
use anyhow::{anyhow, Result};
use devlink_shared::CommandEnvelope;

/// Convert a percentage like `"70%"` to the setting's raw level.
///
/// Percentages are clamped to 0..=100 before scaling.
pub fn percent_to_level(value: &str, setting: Setting) -> Result<u8> {
    let trimmed = value.trim().trim_end_matches('%').trim();
    let percent: f64 = trimmed
        .parse()
        .map_err(|_| anyhow!("'{}' is not a percentage", value))?;
    if !percent.is_finite() {
        return Err(anyhow!("'{}' is not a percentage", value));
    }

    let percent = percent.clamp(0.0, 100.0);
    Ok((percent / 100.0 * f64::from(setting.max_level())).round() as u8)
}

fn parse_adjustment(command: &CommandEnvelope) -> Result<Action> {
    let setting: Setting = argument(command, "valueType").parse()?;
    let adjustment: Adjustment = argument(command, "adjustmentType").parse()?;
    let level = percent_to_level(argument(command, "value"), setting)?;
    Ok(Action::Adjust {
        setting,
        adjustment,
        level,
    })
}

/// Handle AdjustSettings
pub async fn handle_adjust_settings(
    ctx: &HandlerContext,
    command: &CommandEnvelope,
) -> CommandResult {
    match parse_adjustment(command) {
        Ok(action) => perform(ctx, action).await,
        Err(e) => CommandResult::Rejected {
            message: e.to_string(),
        },
    }
}
