//! Command executor - validates and dispatches incoming commands

use super::handlers::{self, HandlerContext};
use crate::actuator::Actuator;
use devlink_shared::{now_ms, CommandEnvelope, FunctionName, ReplyEnvelope, ReplyPath};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of command execution
#[derive(Debug, Clone)]
pub enum CommandResult {
    /// Command completed successfully
    Completed { message: String },
    /// Command accepted but execution failed
    Failed { message: String },
    /// Command rejected (bad arguments, unsupported value)
    Rejected { message: String },
    /// Answer to be pushed through the report ingress
    Report(Value),
}

/// Where the answer to a command goes
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Sent back on the command channel
    Reply(ReplyEnvelope),
    /// Posted to the broker's ingress
    Report(Value),
}

/// Executes commands received from the broker
pub struct CommandExecutor {
    ctx: HandlerContext,
    executed: AtomicU64,
}

impl CommandExecutor {
    /// Create a new command executor
    pub fn new(device_id: String, actuator: Arc<dyn Actuator>) -> Self {
        Self {
            ctx: HandlerContext {
                device_id,
                actuator,
            },
            executed: AtomicU64::new(0),
        }
    }

    /// Number of commands executed so far
    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Execute a command and produce its answer
    pub async fn execute(&self, command: &CommandEnvelope) -> Outcome {
        let start_time = now_ms();
        let function = command.function_name;
        self.executed.fetch_add(1, Ordering::Relaxed);

        info!(
            correlation_id = %command.correlation_id,
            function = %function,
            "Executing command"
        );

        let result = match function.validate_arguments(&command.arguments) {
            Err(e) => CommandResult::Rejected {
                message: e.to_string(),
            },
            Ok(()) => self.dispatch(function, command).await,
        };

        let processing_time_ms = now_ms().saturating_sub(start_time);
        match &result {
            CommandResult::Completed { message } => {
                info!(processing_time_ms, "  Command completed: {}", message)
            }
            CommandResult::Failed { message } => {
                warn!(processing_time_ms, "  Command failed: {}", message)
            }
            CommandResult::Rejected { message } => {
                warn!(processing_time_ms, "  Command rejected: {}", message)
            }
            CommandResult::Report(_) => info!(processing_time_ms, "  Report ready"),
        }

        self.outcome_for(command, result)
    }

    async fn dispatch(&self, function: FunctionName, command: &CommandEnvelope) -> CommandResult {
        let ctx = &self.ctx;
        match function {
            FunctionName::AppControl => handlers::handle_app_control(ctx, command).await,
            FunctionName::WebsiteControl => handlers::handle_website_control(ctx, command).await,
            FunctionName::SearchControl => handlers::handle_search_control(ctx, command).await,
            FunctionName::TypingControl => handlers::handle_typing_control(ctx, command).await,
            FunctionName::SystemControl => handlers::handle_system_control(ctx, command).await,
            FunctionName::DeviceInfo => handlers::handle_device_info(ctx, command).await,
            FunctionName::AdjustSettings => handlers::handle_adjust_settings(ctx, command).await,
        }
    }

    /// Route the result along the path the broker is waiting on
    fn outcome_for(&self, command: &CommandEnvelope, result: CommandResult) -> Outcome {
        match command.function_name.reply_path() {
            ReplyPath::Direct => {
                let text = match result {
                    CommandResult::Completed { message } => Value::String(message),
                    CommandResult::Failed { message } => Value::String(format!("Failed: {}", message)),
                    CommandResult::Rejected { message } => {
                        Value::String(format!("Rejected: {}", message))
                    }
                    CommandResult::Report(value) => value,
                };
                Outcome::Reply(ReplyEnvelope::new(command.correlation_id, text))
            }
            ReplyPath::Ingested => match result {
                CommandResult::Report(value) => Outcome::Report(value),
                CommandResult::Completed { message }
                | CommandResult::Failed { message }
                | CommandResult::Rejected { message } => Outcome::Report(json!({
                    "device": self.ctx.device_id,
                    "info": command.argument_str("informationType"),
                    "error": message,
                })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::DryRunActuator;
    use devlink_shared::Arguments;

    fn executor() -> (CommandExecutor, Arc<DryRunActuator>) {
        let actuator = Arc::new(DryRunActuator::new());
        (CommandExecutor::new("pc".into(), actuator.clone()), actuator)
    }

    fn command(function: FunctionName, arguments: Value) -> CommandEnvelope {
        let arguments: Arguments = arguments.as_object().cloned().unwrap_or_default();
        CommandEnvelope::new(function, arguments)
    }

    #[tokio::test]
    async fn test_direct_reply_carries_correlation_id() {
        let (executor, actuator) = executor();
        let cmd = command(
            FunctionName::SystemControl,
            json!({"action": "copy"}),
        );

        match executor.execute(&cmd).await {
            Outcome::Reply(reply) => {
                assert_eq!(reply.correlation_id, cmd.correlation_id);
                assert!(reply.result.as_str().unwrap().starts_with("Done"));
            }
            other => panic!("expected reply, got {:?}", other),
        }
        assert_eq!(actuator.performed().await.len(), 1);
        assert_eq!(executor.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_argument_rejected_in_reply() {
        let (executor, actuator) = executor();
        let cmd = command(FunctionName::AppControl, json!({"applicationName": "notepad"}));

        match executor.execute(&cmd).await {
            Outcome::Reply(reply) => {
                let text = reply.result.as_str().unwrap();
                assert!(text.starts_with("Rejected"));
                assert!(text.contains("applicationControlType"));
            }
            other => panic!("expected reply, got {:?}", other),
        }
        assert!(actuator.performed().await.is_empty());
    }

    #[tokio::test]
    async fn test_device_info_goes_to_report() {
        let (executor, _) = executor();
        let cmd = command(FunctionName::DeviceInfo, json!({"informationType": "location"}));

        match executor.execute(&cmd).await {
            Outcome::Report(report) => assert_eq!(report["info"], "location"),
            other => panic!("expected report, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_device_info_failure_still_reported() {
        let (executor, _) = executor();
        let cmd = command(FunctionName::DeviceInfo, json!({"informationType": "weather"}));

        match executor.execute(&cmd).await {
            Outcome::Report(report) => {
                assert_eq!(report["info"], "weather");
                assert!(report["error"].is_string());
            }
            other => panic!("expected report, got {:?}", other),
        }
    }
}
