use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ensure, GenericError, PipebusResult, StatusCode};

/// Формат вывода логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = GenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(GenericError::new(
                StatusCode::InvalidConfig,
                format!("unknown log format '{other}' (expected pretty, compact or json)"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Настройки логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень для crate `pipebus` (trace/debug/info/warn/error).
    pub level: String,
    pub format: LogFormat,
    /// Дополнительные директивы фильтра, например `"tokio=warn"`.
    pub directives: Vec<String>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            directives: Vec::new(),
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LoggingConfig {
    /// Переопределения из окружения: `PIPEBUS_LOG_LEVEL`, `PIPEBUS_LOG_FORMAT`.
    pub fn apply_env_overrides(&mut self) -> PipebusResult<()> {
        if let Ok(level) = env::var("PIPEBUS_LOG_LEVEL") {
            self.level = level.to_ascii_lowercase();
        }
        if let Ok(format) = env::var("PIPEBUS_LOG_FORMAT") {
            self.format = format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> PipebusResult<()> {
        ensure!(
            LEVELS.contains(&self.level.as_str()),
            StatusCode::InvalidConfig,
            "invalid log level '{}'",
            self.level
        );
        Ok(())
    }

    /// Директива для `EnvFilter`: уровень crate плюс дополнительные директивы.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![format!("pipebus={}", self.level)];
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_default_directive() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.build_filter_directive(), "pipebus=info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_directive_with_extras() {
        let cfg = LoggingConfig {
            level: "debug".to_string(),
            directives: vec!["tokio=warn".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.build_filter_directive(), "pipebus=debug,tokio=warn");
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let cfg = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var("PIPEBUS_LOG_LEVEL", "WARN");
        env::set_var("PIPEBUS_LOG_FORMAT", "json");

        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides().unwrap();

        env::remove_var("PIPEBUS_LOG_LEVEL");
        env::remove_var("PIPEBUS_LOG_FORMAT");

        assert_eq!(cfg.level, "warn");
        assert_eq!(cfg.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_env_override_bad_format() {
        env::set_var("PIPEBUS_LOG_FORMAT", "yaml");
        let mut cfg = LoggingConfig::default();
        let res = cfg.apply_env_overrides();
        env::remove_var("PIPEBUS_LOG_FORMAT");
        assert!(res.is_err());
    }
}
