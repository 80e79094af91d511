use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfluxError;

/// Observability level used by strategies that log
///
/// Levels are ordered: `None < Errors < Warnings < Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Errors,
    Warnings,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Errors => "errors",
            LogLevel::Warnings => "warnings",
            LogLevel::Info => "info",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(LogLevel::None),
            "errors" => Ok(LogLevel::Errors),
            "warnings" => Ok(LogLevel::Warnings),
            "info" => Ok(LogLevel::Info),
            other => Err(ConfluxError::config(format!("Unknown log level '{}'", other))),
        }
    }
}

/// Options passed to every strategy when a coordinator activates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOptions {
    /// Falls back to the coordinator's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl ActivationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn merged_with(mut self, defaults: &ActivationOptions) -> Self {
        if self.log_level.is_none() {
            self.log_level = defaults.log_level;
        }
        self
    }
}
