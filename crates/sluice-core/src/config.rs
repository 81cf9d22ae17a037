//! Process-wide configuration, loaded once from TOML before any worker
//! starts and then passed down through construction as an `Arc`, never a
//! global mutable. Grounded on `settings.GlobalConfig`.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl LogLevel {
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
        }
    }
}

fn default_chan_buffer_len() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_freq() -> u64 {
    1
}

fn default_python_path() -> String {
    String::new()
}

/// Config TOML keys, matching `GlobalConfig` in the original plus the
/// `LogLevel` key the expanded spec adds.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(rename = "DefaultChanBufferLen", default = "default_chan_buffer_len")]
    pub default_chan_buffer_len: usize,

    #[serde(rename = "LogLevel", default = "default_log_level")]
    pub log_level: String,

    #[serde(rename = "PollPipelineChangesFreq", default = "default_poll_freq")]
    pub poll_pipeline_changes_freq: u64,

    #[serde(rename = "PythonPath", default = "default_python_path")]
    pub python_path: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_chan_buffer_len: default_chan_buffer_len(),
            log_level: default_log_level(),
            poll_pipeline_changes_freq: default_poll_freq(),
            python_path: default_python_path(),
        }
    }
}

impl GlobalConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or(LogLevel::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_settings() {
        let cfg: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.default_chan_buffer_len, 1000);
        assert_eq!(cfg.poll_pipeline_changes_freq, 1);
        assert_eq!(cfg.log_level(), LogLevel::Info);
    }

    #[test]
    fn log_level_case_insensitive() {
        let cfg: GlobalConfig = toml::from_str(r#"LogLevel = "WARN""#).unwrap();
        assert_eq!(cfg.log_level(), LogLevel::Warn);
    }
}
