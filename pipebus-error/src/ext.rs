use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок брокера (object-safe).
///
/// Даёт единый набор методов поверх любой ошибки pipebus:
/// статус-код, безопасное сообщение для вызывающей стороны,
/// подробное сообщение для логов и теги для метрик.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус ошибки. По умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any) для downcast.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение для внешнего потребителя (host-процесса).
    ///
    /// Внутренние ошибки не раскрываются: вместо них возвращается
    /// `"Internal broker error"`.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "Internal broker error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Теги для метрик: тип ошибки и статус-код.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Короткое имя типа ошибки (без пути модуля).
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, error::Error, fmt};

    use super::*;

    #[derive(Debug)]
    struct OpaqueError(pub &'static str);

    impl fmt::Display for OpaqueError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "opaque: {}", self.0)
        }
    }

    impl Error for OpaqueError {}

    impl ErrorExt for OpaqueError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct MissingTopic(pub &'static str);

    impl fmt::Display for MissingTopic {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "topic '{}' does not exist", self.0)
        }
    }

    impl Error for MissingTopic {}

    impl ErrorExt for MissingTopic {
        fn status_code(&self) -> StatusCode {
            StatusCode::NotFound
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// По умолчанию статус ошибки `Internal`, и её текст скрывается.
    #[test]
    fn test_default_status_is_internal_and_hidden() {
        let e = OpaqueError("secret");
        assert_eq!(e.status_code(), StatusCode::Internal);
        assert_eq!(e.client_message(), "Internal broker error");
    }

    /// Для клиентских кодов `client_message` совпадает с `Display`.
    #[test]
    fn test_client_message_non_internal() {
        let e = MissingTopic("news");
        assert_eq!(e.client_message(), "topic 'news' does not exist");
    }

    #[test]
    fn test_as_any_downcast() {
        let e = MissingTopic("x");
        let down = e.as_any().downcast_ref::<MissingTopic>();
        assert_eq!(down.map(|d| d.0), Some("x"));
    }

    #[test]
    fn test_log_message_matches_debug() {
        let e = MissingTopic("dbg");
        assert_eq!(e.log_message(), format!("{e:?}"));
    }

    /// `metrics_tags` содержит `error_type` и `status_code`.
    #[test]
    fn test_metrics_tags_contains_expected_pairs() {
        let tags = MissingTopic("t").metrics_tags();
        assert!(tags
            .iter()
            .any(|(k, v)| *k == "error_type" && v.ends_with("MissingTopic")));
        assert!(tags
            .iter()
            .any(|(k, v)| *k == "status_code" && v == &StatusCode::NotFound.to_string()));
    }
}
