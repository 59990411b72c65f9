//! Auto-lock durations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// How long the vault may stay unlocked without user activity.
///
/// The persisted form is the variant name, so values written by one build are
/// readable by any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AutoLockSetting {
    OneMinute,
    #[default]
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwelveHours,
    TwentyFourHours,
    /// Lock as soon as the app leaves the foreground.
    OnAppExit,
    Never,
}

impl AutoLockSetting {
    /// Every setting, in the order a settings screen would list them.
    pub const ALL: [AutoLockSetting; 9] = [
        AutoLockSetting::OnAppExit,
        AutoLockSetting::OneMinute,
        AutoLockSetting::FiveMinutes,
        AutoLockSetting::FifteenMinutes,
        AutoLockSetting::ThirtyMinutes,
        AutoLockSetting::OneHour,
        AutoLockSetting::TwelveHours,
        AutoLockSetting::TwentyFourHours,
        AutoLockSetting::Never,
    ];

    /// Idle duration in seconds, or `None` for [`AutoLockSetting::Never`].
    pub fn seconds(self) -> Option<i64> {
        match self {
            Self::OnAppExit => Some(0),
            Self::OneMinute => Some(60),
            Self::FiveMinutes => Some(300),
            Self::FifteenMinutes => Some(900),
            Self::ThirtyMinutes => Some(1_800),
            Self::OneHour => Some(3_600),
            Self::TwelveHours => Some(43_200),
            Self::TwentyFourHours => Some(86_400),
            Self::Never => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnAppExit => "OnAppExit",
            Self::OneMinute => "OneMinute",
            Self::FiveMinutes => "FiveMinutes",
            Self::FifteenMinutes => "FifteenMinutes",
            Self::ThirtyMinutes => "ThirtyMinutes",
            Self::OneHour => "OneHour",
            Self::TwelveHours => "TwelveHours",
            Self::TwentyFourHours => "TwentyFourHours",
            Self::Never => "Never",
        }
    }
}

impl fmt::Display for AutoLockSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoLockSetting {
    type Err = KernelError;

    /// Accepts the persisted variant name or a short CLI alias
    /// (`1m`, `5m`, `15m`, `30m`, `1h`, `12h`, `24h`, `exit`, `never`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(setting) = Self::ALL.iter().find(|v| v.as_str() == trimmed) {
            return Ok(*setting);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "exit" | "onappexit" => Ok(Self::OnAppExit),
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" => Ok(Self::OneHour),
            "12h" => Ok(Self::TwelveHours),
            "24h" => Ok(Self::TwentyFourHours),
            "never" => Ok(Self::Never),
            _ => Err(KernelError::UnknownSetting {
                value: trimmed.to_string(),
            }),
        }
    }
}
