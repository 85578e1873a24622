use std::path::Path;

use ::config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use super::BrokerConfig;
use crate::{logging::LoggingConfig, GenericError, PipebusResult, ResultExt, StatusCode};

/// Полная конфигурация встраиваемого брокера.
///
/// Источники по возрастанию приоритета: значения по умолчанию, необязательный
/// файл, переменные окружения `PIPEBUS_<SECTION>__<KEY>`
/// (например `PIPEBUS_BROKER__DEFAULT_LIMIT=16`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки только из окружения.
    pub fn load() -> PipebusResult<Self> {
        Self::build(None)
    }

    /// Загружает настройки из файла (toml/json/yaml по расширению) с
    /// переопределением из окружения.
    pub fn load_from(path: impl AsRef<Path>) -> PipebusResult<Self> {
        let path = path.as_ref();
        Self::build(Some(path)).with_context(|| format!("loading {}", path.display()))
    }

    fn build(path: Option<&Path>) -> PipebusResult<Self> {
        let defaults = BrokerConfig::default();

        let mut builder = Config::builder()
            .set_default("broker.auto_create_topics", defaults.auto_create_topics)
            .map_err(invalid)?
            .set_default("broker.default_limit", defaults.default_limit as u64)
            .map_err(invalid)?
            .set_default("broker.default_timeout_ms", defaults.default_timeout_ms)
            .map_err(invalid)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("PIPEBUS")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("broker.topics")
                    .try_parsing(true),
            )
            .build()
            .map_err(invalid)?
            .try_deserialize()
            .map_err(invalid)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PipebusResult<()> {
        self.broker.validate().context("invalid [broker] section")?;
        self.logging
            .validate()
            .context("invalid [logging] section")?;
        Ok(())
    }
}

fn invalid(err: ConfigError) -> GenericError {
    GenericError::new(StatusCode::InvalidConfig, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write, time::Duration};

    use serial_test::serial;

    use super::*;
    use crate::logging::LogFormat;

    fn toml_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.broker, BrokerConfig::default());
        assert_eq!(settings.logging, LoggingConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let file = toml_file(
            r#"
            [broker]
            topics = ["orders", "audit"]
            auto_create_topics = false
            default_limit = 0
            default_timeout_ms = 250

            [logging]
            level = "debug"
            format = "json"
            "#,
        );

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.broker.topics, vec!["orders", "audit"]);
        assert!(!settings.broker.auto_create_topics);
        assert_eq!(settings.broker.default_limit, 0);
        assert_eq!(
            settings.broker.default_timeout(),
            Duration::from_millis(250)
        );
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = toml_file("[broker]\ndefault_limit = 3\n");
        env::set_var("PIPEBUS_BROKER__DEFAULT_LIMIT", "16");
        env::set_var("PIPEBUS_BROKER__TOPICS", "a,b,c");

        let res = Settings::load_from(file.path());

        env::remove_var("PIPEBUS_BROKER__DEFAULT_LIMIT");
        env::remove_var("PIPEBUS_BROKER__TOPICS");

        let settings = res.unwrap();
        assert_eq!(settings.broker.default_limit, 16);
        assert_eq!(settings.broker.topics, vec!["a", "b", "c"]);
    }

    #[test]
    #[serial]
    fn test_duplicate_topics_rejected() {
        let file = toml_file("[broker]\ntopics = [\"x\", \"x\"]\n");
        let err = Settings::load_from(file.path()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
        assert!(err.to_string().contains("duplicate topic 'x'"));
    }

    #[test]
    #[serial]
    fn test_unknown_log_format_rejected() {
        let file = toml_file("[logging]\nformat = \"xml\"\n");
        let err = Settings::load_from(file.path()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_from(dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }
}
