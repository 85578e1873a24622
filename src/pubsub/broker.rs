use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::join_all;
use tracing::{debug, info, trace, warn};

use super::{
    topic::{SubscriberEntry, TopicRegistry},
    Pipe, Subscription,
};
use crate::{config::BrokerConfig, DeliveryFailure, PipeError, PipebusResult, PubSubError};

/// Снимок счётчиков брокера.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    /// Публикации, прошедшие проверку брокера и топика.
    pub publish_count: u64,
    /// Успешные доставки в каналы подписчиков.
    pub delivered_count: u64,
    /// Неудачные доставки (таймаут, закрытый канал).
    pub failed_deliveries: u64,
}

/// Встраиваемый брокер Pub/Sub.
///
/// Поддерживает:
/// - Ограниченный FIFO-канал на каждого подписчика
/// - Автосоздание топиков при первой подписке или публикации
/// - Fan-out публикацию с отчётом о частичной доставке
/// - Плавное закрытие топика и всего брокера
pub struct Broker<T> {
    registry: Arc<TopicRegistry<T>>,
    config: BrokerConfig,
    next_id: AtomicU64,
    publish_count: AtomicU64,
    delivered_count: AtomicU64,
    failed_deliveries: AtomicU64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T> Broker<T> {
    /// Создаёт брокер по конфигурации. Начальные топики создаются сразу.
    pub fn new(config: BrokerConfig) -> PipebusResult<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// Брокер без начальных топиков с автосозданием, лимитом 5 и
    /// таймаутом 30 с.
    pub fn with_defaults() -> Self {
        Self::from_config(BrokerConfig::default())
    }

    fn from_config(config: BrokerConfig) -> Self {
        let registry = Arc::new(TopicRegistry::new(
            &config.topics,
            config.auto_create_topics,
        ));
        debug!(
            topics = config.topics.len(),
            auto_create = config.auto_create_topics,
            "broker created"
        );
        Self {
            registry,
            config,
            next_id: AtomicU64::new(1),
            publish_count: AtomicU64::new(0),
            delivered_count: AtomicU64::new(0),
            failed_deliveries: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Явно создаёт топик.
    pub fn create_topic(
        &self,
        topic: &str,
    ) -> Result<(), PubSubError> {
        self.registry.create_topic(topic)?;
        debug!(topic, "topic created");
        Ok(())
    }

    /// Подписка на топик.
    ///
    /// Канал ёмкостью `limit` (0 означает без ограничения) регистрируется атомарно
    /// относительно публикаций: всё, что опубликовано после возврата из
    /// `subscribe`, попадёт в подписку. `timeout` становится таймаутом
    /// чтения по умолчанию.
    pub fn subscribe(
        &self,
        topic: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Subscription<T>, PubSubError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pipe = Arc::new(Pipe::new(limit));
        let key = self.registry.add_subscriber(
            topic,
            SubscriberEntry {
                id,
                pipe: pipe.clone(),
            },
        )?;
        debug!(topic, subscriber = id, limit, "subscribed");
        Ok(Subscription::new(
            key,
            id,
            pipe,
            timeout,
            Arc::downgrade(&self.registry),
        ))
    }

    /// Подписка с лимитом и таймаутом из конфигурации.
    pub fn subscribe_default(
        &self,
        topic: &str,
    ) -> Result<Subscription<T>, PubSubError> {
        self.subscribe(
            topic,
            self.config.default_limit,
            self.config.default_timeout(),
        )
    }

    /// Удаляет подписку из топика и закрывает её канал.
    ///
    /// Подписка, которой в топике уже нет, игнорируется.
    pub fn unsubscribe(
        &self,
        topic: &str,
        subscription: &Subscription<T>,
    ) -> Result<(), PubSubError> {
        if let Some(pipe) = self.registry.remove_subscriber(topic, subscription.id())? {
            pipe.close();
            debug!(topic, subscriber = subscription.id(), "unsubscribed");
        }
        Ok(())
    }

    /// Закрывает топик: каналы подписчиков закрываются (буфер дочитывается),
    /// топик удаляется из реестра, а его имя запоминается как закрытое.
    ///
    /// `timeout` ограничивает ожидание заблокированных писателей; его
    /// превышение только логируется.
    pub async fn close_topic(
        &self,
        topic: &str,
        timeout: Duration,
    ) -> Result<(), PubSubError> {
        let pipes = self.registry.close_topic(topic)?;
        info!(topic, subscribers = pipes.len(), "topic closed");
        if !wait_producers(&pipes, timeout).await {
            warn!(
                topic,
                timeout_ms = timeout.as_millis() as u64,
                "producers still blocked after topic close timeout"
            );
        }
        Ok(())
    }

    /// Закрывает брокер и все его топики. Идемпотентно.
    pub async fn close(
        &self,
        timeout: Duration,
    ) {
        let Some(closed) = self.registry.close_all() else {
            return;
        };

        let pipes: Vec<Arc<Pipe<T>>> = closed
            .into_iter()
            .flat_map(|(topic, pipes)| {
                debug!(topic = %topic, subscribers = pipes.len(), "topic closed by broker shutdown");
                pipes
            })
            .collect();
        info!(subscribers = pipes.len(), "broker closed");

        if !wait_producers(&pipes, timeout).await {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "producers still blocked after broker close timeout"
            );
        }
    }

    /// Имена открытых топиков (порядок не определён).
    pub fn topics(&self) -> Vec<String> {
        self.registry.topic_names()
    }

    pub fn has_topic(
        &self,
        topic: &str,
    ) -> bool {
        self.registry.contains(topic)
    }

    /// Количество подписчиков топика; `None`, если топика нет.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> Option<usize> {
        self.registry.subscriber_count(topic)
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            publish_count: self.publish_count.load(Ordering::Relaxed),
            delivered_count: self.delivered_count.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
        }
    }
}

impl<T: Clone> Broker<T> {
    /// Публикует значение всем подписчикам топика.
    ///
    /// Доставка идёт во все каналы одновременно, и вызов ждёт завершения
    /// каждой записи (не дольше `timeout` на канал). Отказ одного канала не
    /// мешает остальным.
    ///
    /// # Возвращает
    /// - `Ok(n)` значение доставлено во все `n` каналов (0, если
    ///   подписчиков нет)
    /// - `Err(PubSubError::PartialDelivery)` часть каналов отказала
    /// - `Err(BrokerClosed | TopicNotFound | TopicClosed)` публикация не
    ///   начиналась
    pub async fn publish(
        &self,
        topic: &str,
        value: T,
        timeout: Duration,
    ) -> Result<usize, PubSubError> {
        let targets = self.registry.targets(topic)?;
        // Отклонённые публикации не считаются.
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        if targets.is_empty() {
            trace!(topic, "publish to topic without subscribers");
            return Ok(0);
        }

        let deliveries = targets.iter().map(|entry| {
            let value = value.clone();
            async move { entry.pipe.enqueue(value, timeout).await }
        });
        let results = join_all(deliveries).await;

        let mut delivered = 0;
        let mut failures = Vec::new();
        let mut closed_ids = Vec::new();
        for (entry, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    delivered += 1;
                    trace!(topic, subscriber = entry.id, "delivered");
                }
                Err(error) => {
                    if error == PipeError::Closed {
                        closed_ids.push(entry.id);
                    }
                    failures.push(DeliveryFailure {
                        subscriber: entry.id,
                        error,
                    });
                }
            }
        }

        self.delivered_count
            .fetch_add(delivered as u64, Ordering::Relaxed);

        if !closed_ids.is_empty() {
            let pruned = self.registry.prune_closed(topic, &closed_ids);
            debug!(topic, pruned, "pruned closed subscriber pipes");
        }

        if failures.is_empty() {
            return Ok(delivered);
        }

        self.failed_deliveries
            .fetch_add(failures.len() as u64, Ordering::Relaxed);
        warn!(
            topic,
            delivered,
            failed = failures.len(),
            "partial delivery"
        );
        Err(PubSubError::PartialDelivery {
            topic: topic.to_string(),
            delivered,
            failures,
        })
    }

    /// Публикация с таймаутом из конфигурации.
    pub async fn publish_default(
        &self,
        topic: &str,
        value: T,
    ) -> Result<usize, PubSubError> {
        self.publish(topic, value, self.config.default_timeout())
            .await
    }
}

impl<T> Default for Broker<T> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<T> Drop for Broker<T> {
    fn drop(&mut self) {
        // Оставшиеся подписки получат конец потока, а не таймаут.
        let _ = self.registry.close_all();
    }
}

/// Ждёт освобождения писателей во всех каналах. Ожидания идут параллельно,
/// поэтому общее время ограничено одним `timeout`.
async fn wait_producers<T>(
    pipes: &[Arc<Pipe<T>>],
    timeout: Duration,
) -> bool {
    join_all(pipes.iter().map(|pipe| pipe.wait_released(timeout)))
        .await
        .into_iter()
        .all(|released| released)
}
