use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ensure, PipebusResult, StatusCode};

/// Ёмкость канала подписчика по умолчанию.
pub const DEFAULT_LIMIT: usize = 5;
/// Таймаут операций по умолчанию, мс.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Параметры брокера.
///
/// Политика автосоздания фиксируется при создании брокера.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Топики, существующие с момента создания брокера.
    pub topics: Vec<String>,
    /// Создавать отсутствующий топик при первой подписке/публикации.
    pub auto_create_topics: bool,
    /// Ёмкость канала для `subscribe_default` (0 означает без ограничения).
    pub default_limit: usize,
    /// Таймаут для `*_default`-операций, мс (0 означает без ограничения).
    pub default_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            auto_create_topics: true,
            default_limit: DEFAULT_LIMIT,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl BrokerConfig {
    pub fn with_topics<I, S>(
        mut self,
        topics: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_create(
        mut self,
        enabled: bool,
    ) -> Self {
        self.auto_create_topics = enabled;
        self
    }

    pub fn with_default_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_default_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Проверяет начальный набор топиков: имена непустые и без повторов.
    pub fn validate(&self) -> PipebusResult<()> {
        let mut seen = HashSet::with_capacity(self.topics.len());
        for topic in &self.topics {
            ensure!(
                !topic.trim().is_empty(),
                StatusCode::InvalidConfig,
                "topic name cannot be empty"
            );
            ensure!(
                seen.insert(topic.as_str()),
                StatusCode::InvalidConfig,
                "duplicate topic '{}' in configuration",
                topic
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library_defaults() {
        let cfg = BrokerConfig::default();
        assert!(cfg.auto_create_topics);
        assert!(cfg.topics.is_empty());
        assert_eq!(cfg.default_limit, 5);
        assert_eq!(cfg.default_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let cfg = BrokerConfig::default()
            .with_topics(["a", "b"])
            .with_auto_create(false)
            .with_default_limit(0)
            .with_default_timeout(Duration::from_millis(250));
        assert_eq!(cfg.topics, vec!["a", "b"]);
        assert!(!cfg.auto_create_topics);
        assert_eq!(cfg.default_limit, 0);
        assert_eq!(cfg.default_timeout_ms, 250);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        assert!(BrokerConfig::default()
            .with_topics(["a", "b"])
            .validate()
            .is_ok());

        let err = BrokerConfig::default()
            .with_topics(["a", "a"])
            .validate()
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
        assert!(err.to_string().contains("duplicate topic 'a'"));

        assert!(BrokerConfig::default()
            .with_topics(["  "])
            .validate()
            .is_err());
    }
}
