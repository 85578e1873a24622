use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::Stream;
use tracing::debug;

use super::{topic::TopicRegistry, Pipe};
use crate::PubSubError;

/// Подписка на топик: ленивый конечный поток значений поверх канала.
///
/// Каждое чтение ждёт следующего значения не дольше таймаута подписки
/// (его можно переопределить для отдельного вызова). Поток конечен:
/// - конец потока (`None`) возвращается повторно на каждом следующем чтении;
/// - ошибка (таймаут, сбой канала) возвращается ровно один раз, после чего
///   поток завершается и дальше отдаёт только `None`.
///
/// Завершённая или удалённая (`Drop`) подписка закрывает свой канал и
/// снимает себя с топика, чтобы публикации на неё не ждали места.
pub struct Subscription<T> {
    topic: Arc<str>,
    id: u64,
    pipe: Arc<Pipe<T>>,
    timeout: Duration,
    terminated: bool,
    registry: Weak<TopicRegistry<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        topic: Arc<str>,
        id: u64,
        pipe: Arc<Pipe<T>>,
        timeout: Duration,
        registry: Weak<TopicRegistry<T>>,
    ) -> Self {
        Self {
            topic,
            id,
            pipe,
            timeout,
            terminated: false,
            registry,
        }
    }

    /// Имя топика подписки.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Идентификатор подписки внутри брокера.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Таймаут чтения по умолчанию.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ёмкость канала подписки (0 означает без ограничения).
    pub fn limit(&self) -> usize {
        self.pipe.limit()
    }

    /// Сколько значений ждут чтения.
    pub fn pending(&self) -> usize {
        self.pipe.len()
    }

    /// Поток уже вернул конец или ошибку.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Следующее значение с таймаутом подписки.
    ///
    /// # Возвращает
    /// - `Some(Ok(value))` очередное значение
    /// - `Some(Err(err))` таймаут или сбой канала (один раз)
    /// - `None` конец потока
    pub async fn next(&mut self) -> Option<Result<T, PubSubError>> {
        self.next_timeout(self.timeout).await
    }

    /// Следующее значение с явным таймаутом (0 означает без ограничения).
    pub async fn next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<T, PubSubError>> {
        if self.terminated {
            return None;
        }
        match self.pipe.dequeue(timeout).await {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.terminate();
                None
            }
            Err(err) => {
                self.terminate();
                Some(Err(err.into()))
            }
        }
    }

    /// Закрывает канал подписки. Уже полученные значения можно дочитать,
    /// с топика подписка снимается по концу потока.
    pub fn close(&self) {
        self.pipe.close();
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.pipe.close();
        self.detach();
    }

    /// Снимает подписку с топика. Брокер мог быть уже удалён, а топик закрыт.
    fn detach(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Ok(Some(_)) = registry.remove_subscriber(&self.topic, self.id) {
            debug!(topic = %self.topic, subscriber = self.id, "subscription detached");
        }
    }

    /// Превращает подписку в [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<T, PubSubError>> {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.next().await?;
            Some((item, sub))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.pipe.close();
        if !self.terminated {
            self.detach();
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("terminated", &self.terminated)
            .field("pipe", &self.pipe)
            .finish()
    }
}
