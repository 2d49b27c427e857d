//! Command and reply envelopes exchanged over a device channel
//!
//! Outbound (broker → endpoint):
//! ```text
//! {"correlationId": "<uuid>", "functionName": "AppControl", "arguments": {...}}
//! ```
//!
//! Inbound (endpoint → broker):
//! ```text
//! {"correlationId": "<uuid>", "result": <any>}
//! ```
//!
//! Anything inbound without a recognizable `correlationId` is unsolicited data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::FunctionName;

/// String-keyed command arguments
pub type Arguments = serde_json::Map<String, Value>;

/// Token pairing a sent command with its eventual reply.
///
/// UUID v7, so ids are unique per process and sort by mint time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh correlation id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Command sent to exactly one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub correlation_id: CorrelationId,
    pub function_name: FunctionName,
    #[serde(default)]
    pub arguments: Arguments,
}

impl CommandEnvelope {
    /// Build an envelope under a freshly minted correlation id
    pub fn new(function_name: FunctionName, arguments: Arguments) -> Self {
        Self::with_id(CorrelationId::new(), function_name, arguments)
    }

    pub fn with_id(
        correlation_id: CorrelationId,
        function_name: FunctionName,
        arguments: Arguments,
    ) -> Self {
        Self {
            correlation_id,
            function_name,
            arguments,
        }
    }

    /// Read a string argument
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Direct reply to a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub result: Value,
}

impl ReplyEnvelope {
    pub fn new(correlation_id: CorrelationId, result: impl Into<Value>) -> Self {
        Self {
            correlation_id,
            result: result.into(),
        }
    }
}

/// An inbound message after classification
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Carries a well-formed correlation id; may or may not match a pending request
    Reply {
        correlation_id: CorrelationId,
        result: Value,
        /// The message as received
        message: Value,
    },
    /// No usable correlation id
    Unsolicited(Value),
}

impl Inbound {
    /// Classify a raw inbound message
    pub fn classify(message: Value) -> Self {
        let correlation_id = message
            .get("correlationId")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<CorrelationId>().ok());

        match correlation_id {
            Some(correlation_id) => {
                let result = message.get("result").cloned().unwrap_or(Value::Null);
                Inbound::Reply {
                    correlation_id,
                    result,
                    message,
                }
            }
            None => Inbound::Unsolicited(message),
        }
    }

    /// Whether a raw message looks like a direct reply
    pub fn is_reply(message: &Value) -> bool {
        message.get("correlationId").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<CorrelationId>().unwrap(), a);
    }

    #[test]
    fn test_command_wire_format() {
        let mut args = Arguments::new();
        args.insert("applicationName".into(), json!("x"));
        let cmd = CommandEnvelope::new(FunctionName::AppControl, args);

        let wire = serde_json::to_value(&cmd).unwrap();
        assert_eq!(wire["functionName"], "AppControl");
        assert_eq!(wire["arguments"]["applicationName"], "x");
        assert_eq!(wire["correlationId"], cmd.correlation_id.to_string());
        assert_eq!(cmd.argument_str("applicationName"), Some("x"));
    }

    #[test]
    fn test_classify_reply() {
        let id = CorrelationId::new();
        let msg = json!({"correlationId": id.to_string(), "result": "opened"});

        match Inbound::classify(msg.clone()) {
            Inbound::Reply {
                correlation_id,
                result,
                message,
            } => {
                assert_eq!(correlation_id, id);
                assert_eq!(result, json!("opened"));
                assert_eq!(message, msg);
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_reply_without_result() {
        let id = CorrelationId::new();
        let msg = json!({"correlationId": id.to_string()});
        assert!(matches!(
            Inbound::classify(msg),
            Inbound::Reply { result: Value::Null, .. }
        ));
    }

    #[test]
    fn test_classify_unsolicited() {
        let report = json!({"info": "location", "value": "51.5,-0.1"});
        assert_eq!(
            Inbound::classify(report.clone()),
            Inbound::Unsolicited(report)
        );

        // Malformed ids are not replies
        let garbled = json!({"correlationId": "not-a-uuid", "result": 1});
        assert!(matches!(Inbound::classify(garbled), Inbound::Unsolicited(_)));

        let scalar = json!("hello");
        assert!(matches!(Inbound::classify(scalar), Inbound::Unsolicited(_)));
    }
}
