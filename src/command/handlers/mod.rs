//! Command handlers for each function in the vocabulary

mod app;
mod info;
mod input;
mod settings;
mod web;

pub use app::handle_app_control;
pub use info::handle_device_info;
pub use input::{handle_system_control, handle_typing_control};
pub use settings::handle_adjust_settings;
pub use web::{handle_search_control, handle_website_control};

use crate::actuator::{Action, Actuator};
use crate::command::CommandResult;
use devlink_shared::CommandEnvelope;
use std::sync::Arc;

/// Context passed to command handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub device_id: String,
    pub actuator: Arc<dyn Actuator>,
}

/// Read an argument already checked by the executor
fn argument<'a>(command: &'a CommandEnvelope, key: &str) -> &'a str {
    command.argument_str(key).unwrap_or_default()
}

async fn perform(ctx: &HandlerContext, action: Action) -> CommandResult {
    match ctx.actuator.perform(&action).await {
        Ok(message) => CommandResult::Completed { message },
        Err(e) => CommandResult::Failed {
            message: format!("{} failed: {}", action, e),
        },
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::HandlerContext;
    use crate::actuator::DryRunActuator;
    use devlink_shared::{Arguments, CommandEnvelope, FunctionName};
    use serde_json::Value;
    use std::sync::Arc;

    pub fn context() -> (HandlerContext, Arc<DryRunActuator>) {
        let actuator = Arc::new(DryRunActuator::new());
        let ctx = HandlerContext {
            device_id: "pc".into(),
            actuator: actuator.clone(),
        };
        (ctx, actuator)
    }

    pub fn command(function: FunctionName, arguments: Value) -> CommandEnvelope {
        let arguments: Arguments = arguments.as_object().cloned().unwrap_or_default();
        CommandEnvelope::new(function, arguments)
    }
}
