use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки отдельного канала (pipe) подписчика.
///
/// Локальны для одного подписчика и не прерывают операции брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    /// Канал закрыт, запись невозможна.
    #[error("pipe is closed")]
    Closed,

    /// Ожидание превысило отведённое время.
    #[error("operation exceeded the specified timeout")]
    Timeout,

    /// Канал заполнен (только для неблокирующей записи).
    #[error("pipe is full")]
    Full,

    /// Канал пуст (только для неблокирующего чтения).
    #[error("no values available")]
    Empty,

    /// Канал завершён с терминальной ошибкой.
    #[error("pipe failed: {reason}")]
    Failed { reason: String },
}

/// Неудачная доставка одному подписчику при fan-out публикации.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Идентификатор подписки.
    pub subscriber: u64,
    /// Причина отказа.
    pub error: PipeError,
}

/// Ошибки брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    /// Брокер закрыт: новые подписки, публикации и топики запрещены.
    #[error("pubsub broker is closed")]
    BrokerClosed,

    #[error("topic '{topic}' does not exist")]
    TopicNotFound { topic: String },

    #[error("topic '{topic}' already exists")]
    TopicAlreadyExists { topic: String },

    /// Топик закрыт через `close_topic` и не принимает подписчиков и публикации.
    #[error("topic '{topic}' is closed")]
    TopicClosed { topic: String },

    /// Публикация доставлена не всем подписчикам.
    #[error(
        "partial delivery to topic '{topic}': {delivered} delivered, {} failed",
        .failures.len()
    )]
    PartialDelivery {
        topic: String,
        delivered: usize,
        failures: Vec<DeliveryFailure>,
    },

    /// Ошибка канала, всплывшая через подписку.
    #[error(transparent)]
    Pipe(#[from] PipeError),
}

impl PubSubError {
    /// Таймаут ожидания на канале подписчика.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Pipe(PipeError::Timeout))
    }

    /// Имя топика, к которому относится ошибка (если есть).
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::TopicNotFound { topic }
            | Self::TopicAlreadyExists { topic }
            | Self::TopicClosed { topic }
            | Self::PartialDelivery { topic, .. } => Some(topic),
            _ => None,
        }
    }
}

impl ErrorExt for PipeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed => StatusCode::Closed,
            Self::Timeout => StatusCode::Timeout,
            Self::Full => StatusCode::QueueFull,
            Self::Empty => StatusCode::QueueEmpty,
            Self::Failed { .. } => StatusCode::PipeFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for PubSubError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BrokerClosed => StatusCode::BrokerClosed,
            Self::TopicNotFound { .. } => StatusCode::NotFound,
            Self::TopicAlreadyExists { .. } => StatusCode::AlreadyExists,
            Self::TopicClosed { .. } => StatusCode::TopicClosed,
            Self::PartialDelivery { .. } => StatusCode::PartialDelivery,
            Self::Pipe(err) => err.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::BrokerClosed => "PubSub is closed".to_string(),
            Self::PartialDelivery { failures, .. } => {
                format!("Failed to deliver to {} subscriber(s)", failures.len())
            }
            other => other.to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        if let Some(topic) = self.topic() {
            tags.push(("topic", topic.to_string()));
        }
        if let Self::PartialDelivery {
            delivered,
            failures,
            ..
        } = self
        {
            tags.push(("delivered", delivered.to_string()));
            tags.push(("failed", failures.len().to_string()));
        }

        tags
    }
}
