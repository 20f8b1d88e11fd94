use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of countdown. Determines the default duration and which statistics
/// bucket a completed interval feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    #[serde(rename = "focus")]
    Focus,
    #[serde(rename = "short")]
    ShortBreak,
    #[serde(rename = "long")]
    LongBreak,
}

impl SessionMode {
    pub const ALL: [SessionMode; 3] = [
        SessionMode::Focus,
        SessionMode::ShortBreak,
        SessionMode::LongBreak,
    ];

    pub fn is_break(self) -> bool {
        !matches!(self, SessionMode::Focus)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Focus => "focus",
            SessionMode::ShortBreak => "short",
            SessionMode::LongBreak => "long",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "focus" => Ok(SessionMode::Focus),
            "short" | "short-break" | "short_break" => Ok(SessionMode::ShortBreak),
            "long" | "long-break" | "long_break" => Ok(SessionMode::LongBreak),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// Configured default durations, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Durations {
    pub focus: u32,
    pub short_break: u32,
    pub long_break: u32,
}

impl Durations {
    pub fn minutes(&self, mode: SessionMode) -> u32 {
        let min = match mode {
            SessionMode::Focus => self.focus,
            SessionMode::ShortBreak => self.short_break,
            SessionMode::LongBreak => self.long_break,
        };
        // A countdown must be strictly positive.
        min.max(1)
    }

    /// Duration in seconds.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn seconds(&self, mode: SessionMode) -> u64 {
        u64::from(self.minutes(mode)).saturating_mul(60)
    }
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            focus: 25,
            short_break: 5,
            long_break: 15,
        }
    }
}
