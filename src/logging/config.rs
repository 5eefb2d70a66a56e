use std::env;

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Custom log directory path (overrides auto-detection)
    pub custom_log_dir: Option<String>,

    /// Log level for console output (default: "info")
    pub console_log_level: String,

    /// Log level for file output (default: "debug")
    pub file_log_level: String,

    /// Enable the JSON file layers; console logging is always on
    pub file_logging_enabled: bool,

    /// Slow request threshold in milliseconds (default: 5000)
    pub slow_request_threshold_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            custom_log_dir: None,
            console_log_level: "info".to_string(),
            file_log_level: "debug".to_string(),
            file_logging_enabled: true,
            slow_request_threshold_ms: 5000,
        }
    }
}

impl LogConfig {
    /// Load logging configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("LONGFORM_LOG_DIR") {
            config.custom_log_dir = Some(dir);
        }
        if let Ok(level) = env::var("LONGFORM_CONSOLE_LOG_LEVEL") {
            config.console_log_level = level;
        }
        if let Ok(level) = env::var("LONGFORM_FILE_LOG_LEVEL") {
            config.file_log_level = level;
        }
        if let Ok(enabled) = env::var("LONGFORM_FILE_LOGGING") {
            config.file_logging_enabled = !matches!(enabled.as_str(), "0" | "false" | "off");
        }
        if let Some(threshold) = env::var("LOG_SLOW_REQUEST_THRESHOLD_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.slow_request_threshold_ms = threshold;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels() {
        let config = LogConfig::default();
        assert_eq!(config.console_log_level, "info");
        assert_eq!(config.file_log_level, "debug");
        assert!(config.file_logging_enabled);
    }

    #[test]
    fn test_file_logging_can_be_disabled() {
        env::set_var("LONGFORM_FILE_LOGGING", "off");
        let config = LogConfig::from_env();
        assert!(!config.file_logging_enabled);
        env::remove_var("LONGFORM_FILE_LOGGING");
    }
}
