//! Controlled vocabulary of functions an endpoint can be asked to perform

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::{defaults, Arguments};

/// Function names understood by endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionName {
    AppControl,
    WebsiteControl,
    SearchControl,
    TypingControl,
    SystemControl,
    DeviceInfo,
    AdjustSettings,
}

/// How the answer to a command comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPath {
    /// Reply envelope on the device channel, matched by correlation id
    Direct,
    /// Separately pushed report through the ingestion ingress
    Ingested,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FunctionError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function} requires argument '{key}'")]
    MissingArgument {
        function: FunctionName,
        key: &'static str,
    },

    #[error("{function} argument '{key}' must be a string")]
    InvalidArgument {
        function: FunctionName,
        key: &'static str,
    },
}

impl FunctionName {
    pub const ALL: [FunctionName; 7] = [
        FunctionName::AppControl,
        FunctionName::WebsiteControl,
        FunctionName::SearchControl,
        FunctionName::TypingControl,
        FunctionName::SystemControl,
        FunctionName::DeviceInfo,
        FunctionName::AdjustSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::AppControl => "AppControl",
            FunctionName::WebsiteControl => "WebsiteControl",
            FunctionName::SearchControl => "SearchControl",
            FunctionName::TypingControl => "TypingControl",
            FunctionName::SystemControl => "SystemControl",
            FunctionName::DeviceInfo => "DeviceInfo",
            FunctionName::AdjustSettings => "AdjustSettings",
        }
    }

    /// Argument keys the endpoint needs to act on this function
    pub fn required_arguments(&self) -> &'static [&'static str] {
        match self {
            FunctionName::AppControl => &["applicationName", "applicationControlType"],
            FunctionName::WebsiteControl => &["websiteUrl"],
            FunctionName::SearchControl => &["searchPlatform", "searchContent"],
            FunctionName::TypingControl => &["typingContent"],
            FunctionName::SystemControl => &["action"],
            FunctionName::DeviceInfo => &["informationType"],
            FunctionName::AdjustSettings => &["valueType", "adjustmentType", "value"],
        }
    }

    /// Check that every required argument is present and a string
    pub fn validate_arguments(&self, arguments: &Arguments) -> Result<(), FunctionError> {
        for &key in self.required_arguments() {
            match arguments.get(key) {
                None => {
                    return Err(FunctionError::MissingArgument {
                        function: *self,
                        key,
                    })
                }
                Some(value) if !value.is_string() => {
                    return Err(FunctionError::InvalidArgument {
                        function: *self,
                        key,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn reply_path(&self) -> ReplyPath {
        match self {
            FunctionName::DeviceInfo => ReplyPath::Ingested,
            _ => ReplyPath::Direct,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self.reply_path() {
            ReplyPath::Direct => Duration::from_millis(defaults::DIRECT_REPLY_TIMEOUT_MS),
            ReplyPath::Ingested => Duration::from_millis(defaults::INGESTED_REPLY_TIMEOUT_MS),
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionName {
    type Err = FunctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or_else(|| FunctionError::UnknownFunction(s.to_string()))
    }
}
