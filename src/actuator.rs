//! Host actions the agent can perform
//!
//! Handlers translate commands into [`Action`]s; an [`Actuator`] carries them
//! out on the host.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowControl {
    Open,
    Close,
    Minimize,
    Maximize,
}

impl FromStr for WindowControl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            "minimize" => Ok(Self::Minimize),
            "maximize" => Ok(Self::Maximize),
            other => Err(anyhow!("unsupported application control '{}'", other)),
        }
    }
}

/// System-level actions the agent accepts; anything else is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    MinimizeAllWindows,
    Shutdown,
    Sleep,
    Restart,
    SwitchWindow,
    Pause,
    HitEnter,
    FullScreen,
    HitSpace,
    SelectAll,
    Copy,
    Paste,
}

impl SystemAction {
    pub const ALL: [SystemAction; 12] = [
        SystemAction::MinimizeAllWindows,
        SystemAction::Shutdown,
        SystemAction::Sleep,
        SystemAction::Restart,
        SystemAction::SwitchWindow,
        SystemAction::Pause,
        SystemAction::HitEnter,
        SystemAction::FullScreen,
        SystemAction::HitSpace,
        SystemAction::SelectAll,
        SystemAction::Copy,
        SystemAction::Paste,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemAction::MinimizeAllWindows => "minimize all window",
            SystemAction::Shutdown => "shutdown",
            SystemAction::Sleep => "sleep",
            SystemAction::Restart => "restart",
            SystemAction::SwitchWindow => "switch window",
            SystemAction::Pause => "pause",
            SystemAction::HitEnter => "hit enter",
            SystemAction::FullScreen => "full screen",
            SystemAction::HitSpace => "hit space",
            SystemAction::SelectAll => "select all",
            SystemAction::Copy => "copy",
            SystemAction::Paste => "paste",
        }
    }
}

impl FromStr for SystemAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| anyhow!("unsupported system action '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Brightness,
    Volume,
}

impl Setting {
    /// Highest raw level the host accepts for this setting
    pub fn max_level(&self) -> u8 {
        match self {
            Setting::Brightness => 255,
            Setting::Volume => 15,
        }
    }
}

impl FromStr for Setting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brightness" => Ok(Self::Brightness),
            "volume" => Ok(Self::Volume),
            other => Err(anyhow!("unsupported setting '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Increase,
    Decrease,
    Set,
}

impl FromStr for Adjustment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "increase" => Ok(Self::Increase),
            "decrease" => Ok(Self::Decrease),
            "set" => Ok(Self::Set),
            other => Err(anyhow!("unsupported adjustment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    IpAddress,
    InternetSpeed,
    Location,
}

impl InfoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoKind::IpAddress => "ip address",
            InfoKind::InternetSpeed => "internet speed",
            InfoKind::Location => "location",
        }
    }
}

impl FromStr for InfoKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip address" => Ok(Self::IpAddress),
            "internet speed" => Ok(Self::InternetSpeed),
            "location" => Ok(Self::Location),
            other => Err(anyhow!("unsupported information type '{}'", other)),
        }
    }
}

/// One concrete host action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Application { name: String, control: WindowControl },
    OpenUrl(String),
    Type(String),
    System(SystemAction),
    Adjust { setting: Setting, adjustment: Adjustment, level: u8 },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Application { name, control } => write!(f, "{:?} application '{}'", control, name),
            Action::OpenUrl(url) => write!(f, "open {}", url),
            Action::Type(text) => write!(f, "type {} characters", text.chars().count()),
            Action::System(action) => write!(f, "system '{}'", action.as_str()),
            Action::Adjust { setting, adjustment, level } => {
                write!(f, "{:?} {:?} to level {}", adjustment, setting, level)
            }
        }
    }
}

/// Performs actions on the host
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Carry out an action; the returned text becomes the reply result
    async fn perform(&self, action: &Action) -> Result<String>;

    /// Read a piece of host state for a report
    async fn read_info(&self, kind: InfoKind) -> Result<String>;
}

/// Actuator that logs and records actions without touching the host
#[derive(Default)]
pub struct DryRunActuator {
    performed: Mutex<Vec<Action>>,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions performed so far, oldest first
    #[cfg(test)]
    pub async fn performed(&self) -> Vec<Action> {
        self.performed.lock().await.clone()
    }
}

#[async_trait]
impl Actuator for DryRunActuator {
    async fn perform(&self, action: &Action) -> Result<String> {
        let mut performed = self.performed.lock().await;
        performed.push(action.clone());
        info!(%action, total = performed.len(), "[DRY RUN] Performing action");
        Ok(format!("Done: {}", action))
    }

    async fn read_info(&self, kind: InfoKind) -> Result<String> {
        match kind {
            InfoKind::Location => Ok("0.000000,0.000000".into()),
            InfoKind::IpAddress => Ok("127.0.0.1".into()),
            InfoKind::InternetSpeed => Err(anyhow!("internet speed measurement is not available")),
        }
    }
}
