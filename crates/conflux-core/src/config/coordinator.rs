use super::activation::{ActivationOptions, LogLevel};
use serde::{Deserialize, Serialize};

/// Configuration for a coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Applied to every activation that leaves an option unset
    /// Default: log level `info`
    #[serde(default = "default_activation_options")]
    pub default_activation_options: ActivationOptions,
}

fn default_activation_options() -> ActivationOptions {
    ActivationOptions::new().with_log_level(LogLevel::Info)
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_activation_options: default_activation_options(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_log_level(mut self, level: LogLevel) -> Self {
        self.default_activation_options.log_level = Some(level);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(
            config.default_activation_options.log_level,
            Some(LogLevel::Info)
        );
    }

    #[test]
    fn test_camel_case_document() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"defaultActivationOptions": {"logLevel": "errors"}}"#)
                .unwrap();
        assert_eq!(
            config.default_activation_options.log_level,
            Some(LogLevel::Errors)
        );
    }
}
