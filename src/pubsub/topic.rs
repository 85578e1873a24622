use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::debug;

use super::Pipe;
use crate::PubSubError;

/// Канал одного подписчика внутри топика.
pub(crate) struct SubscriberEntry<T> {
    pub id: u64,
    pub pipe: Arc<Pipe<T>>,
}

impl<T> Clone for SubscriberEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            pipe: self.pipe.clone(),
        }
    }
}

/// Именованный топик и его подписчики.
///
/// Закрытый топик в реестре не хранится: от него остаётся только имя
/// в `RegistryState::closed_topics`.
pub(crate) struct Topic<T> {
    subscribers: Vec<SubscriberEntry<T>>,
}

impl<T> Topic<T> {
    fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Закрывает все каналы топика. Подписчики дочитают уже
    /// буферизованные значения.
    fn close(&mut self) -> Vec<Arc<Pipe<T>>> {
        self.subscribers
            .drain(..)
            .map(|entry| {
                entry.pipe.close();
                entry.pipe
            })
            .collect()
    }
}

/// Реестр топиков брокера.
///
/// Все изменения (создание топика, добавление и удаление подписчиков,
/// закрытие) и флаг закрытия брокера живут под одной блокировкой, поэтому
/// публикация всегда видит согласованный список подписчиков, а две
/// конкурентные подписки на новый топик создают ровно один топик.
pub(crate) struct TopicRegistry<T> {
    state: RwLock<RegistryState<T>>,
    auto_create: bool,
}

struct RegistryState<T> {
    topics: HashMap<Arc<str>, Topic<T>>,
    /// Имена топиков, закрытых через `close_topic`.
    closed_topics: HashSet<Arc<str>>,
    closed: bool,
}

impl<T> RegistryState<T> {
    /// Проверки, общие для подписки и публикации.
    fn check_open(
        &self,
        name: &str,
    ) -> Result<(), PubSubError> {
        if self.closed {
            return Err(PubSubError::BrokerClosed);
        }
        if self.closed_topics.contains(name) {
            return Err(PubSubError::TopicClosed {
                topic: name.to_string(),
            });
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T> TopicRegistry<T> {
    /// Создаёт реестр с начальным набором топиков.
    pub fn new<I, S>(
        topics: I,
        auto_create: bool,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics = topics
            .into_iter()
            .map(|name| (Arc::from(name.as_ref()), Topic::new()))
            .collect();
        Self {
            state: RwLock::new(RegistryState {
                topics,
                closed_topics: HashSet::new(),
                closed: false,
            }),
            auto_create,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Явно создаёт топик. Ранее закрытое имя снова становится доступным.
    pub fn create_topic(
        &self,
        name: &str,
    ) -> Result<(), PubSubError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(PubSubError::BrokerClosed);
        }
        if state.topics.contains_key(name) {
            return Err(PubSubError::TopicAlreadyExists {
                topic: name.to_string(),
            });
        }
        state.closed_topics.remove(name);
        state.topics.insert(Arc::from(name), Topic::new());
        Ok(())
    }

    /// Регистрирует канал подписчика в топике.
    ///
    /// Отсутствующий топик создаётся, только если включено автосоздание.
    /// Возвращает разделяемое имя топика.
    pub fn add_subscriber(
        &self,
        name: &str,
        entry: SubscriberEntry<T>,
    ) -> Result<Arc<str>, PubSubError> {
        let mut state = self.state.write();
        state.check_open(name)?;

        let existing = state.topics.get_key_value(name).map(|(key, _)| key.clone());
        if let Some(key) = existing {
            if let Some(topic) = state.topics.get_mut(name) {
                topic.subscribers.push(entry);
            }
            return Ok(key);
        }

        if !self.auto_create {
            return Err(PubSubError::TopicNotFound {
                topic: name.to_string(),
            });
        }

        let key: Arc<str> = Arc::from(name);
        let mut topic = Topic::new();
        topic.subscribers.push(entry);
        state.topics.insert(key.clone(), topic);
        debug!(topic = name, "topic auto-created on subscribe");
        Ok(key)
    }

    /// Снимок подписчиков топика для публикации.
    ///
    /// Отсутствующий топик при автосоздании создаётся пустым.
    pub fn targets(
        &self,
        name: &str,
    ) -> Result<Vec<SubscriberEntry<T>>, PubSubError> {
        {
            let state = self.state.read();
            state.check_open(name)?;
            if let Some(topic) = state.topics.get(name) {
                return Ok(topic.subscribers.clone());
            }
            if !self.auto_create {
                return Err(PubSubError::TopicNotFound {
                    topic: name.to_string(),
                });
            }
        }

        let mut state = self.state.write();
        // Состояние могло измениться между блокировками.
        state.check_open(name)?;
        if let Some(topic) = state.topics.get(name) {
            return Ok(topic.subscribers.clone());
        }
        state.topics.insert(Arc::from(name), Topic::new());
        debug!(topic = name, "topic auto-created on publish");
        Ok(Vec::new())
    }

    /// Удаляет подписчика из топика и возвращает его канал.
    ///
    /// `Ok(None)`, если такого подписчика в топике нет.
    pub fn remove_subscriber(
        &self,
        name: &str,
        id: u64,
    ) -> Result<Option<Arc<Pipe<T>>>, PubSubError> {
        let mut state = self.state.write();
        let topic = state
            .topics
            .get_mut(name)
            .ok_or_else(|| PubSubError::TopicNotFound {
                topic: name.to_string(),
            })?;

        let position = topic.subscribers.iter().position(|entry| entry.id == id);
        Ok(position.map(|idx| topic.subscribers.remove(idx).pipe))
    }

    /// Убирает из топика закрытые каналы с указанными идентификаторами.
    pub fn prune_closed(
        &self,
        name: &str,
        ids: &[u64],
    ) -> usize {
        let mut state = self.state.write();
        let Some(topic) = state.topics.get_mut(name) else {
            return 0;
        };
        let before = topic.subscribers.len();
        topic
            .subscribers
            .retain(|entry| !(ids.contains(&entry.id) && entry.pipe.is_closed()));
        before - topic.subscribers.len()
    }

    /// Закрывает топик, удаляет его из реестра и запоминает имя как закрытое.
    pub fn close_topic(
        &self,
        name: &str,
    ) -> Result<Vec<Arc<Pipe<T>>>, PubSubError> {
        let mut state = self.state.write();
        let (key, mut topic) =
            state
                .topics
                .remove_entry(name)
                .ok_or_else(|| PubSubError::TopicNotFound {
                    topic: name.to_string(),
                })?;
        let pipes = topic.close();
        state.closed_topics.insert(key);
        Ok(pipes)
    }

    /// Закрывает брокер: все топики закрываются и удаляются.
    ///
    /// `None`, если брокер уже был закрыт.
    pub fn close_all(&self) -> Option<Vec<(Arc<str>, Vec<Arc<Pipe<T>>>)>> {
        let mut state = self.state.write();
        if state.closed {
            return None;
        }
        state.closed = true;
        state.closed_topics.clear();
        let closed = state
            .topics
            .drain()
            .map(|(name, mut topic)| {
                let pipes = topic.close();
                (name, pipes)
            })
            .collect();
        Some(closed)
    }

    /// Имена всех открытых топиков (порядок не определён).
    pub fn topic_names(&self) -> Vec<String> {
        self.state
            .read()
            .topics
            .keys()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.state.read().topics.contains_key(name)
    }

    pub fn subscriber_count(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.state
            .read()
            .topics
            .get(name)
            .map(|topic| topic.subscribers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> SubscriberEntry<u32> {
        SubscriberEntry {
            id,
            pipe: Arc::new(Pipe::new(4)),
        }
    }

    #[test]
    fn test_initial_topics() {
        let registry = TopicRegistry::<u32>::new(["a", "b"], false);
        let mut names = registry.topic_names();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.subscriber_count("a"), Some(0));
    }

    #[test]
    fn test_add_subscriber_without_auto_create() {
        let registry = TopicRegistry::<u32>::new(Vec::<String>::new(), false);
        let err = registry.add_subscriber("missing", entry(1)).err();
        assert_eq!(
            err,
            Some(PubSubError::TopicNotFound {
                topic: "missing".to_string()
            })
        );
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_add_subscriber_auto_creates_once() {
        let registry = TopicRegistry::<u32>::new(Vec::<String>::new(), true);
        let k1 = registry.add_subscriber("news", entry(1)).unwrap();
        let k2 = registry.add_subscriber("news", entry(2)).unwrap();
        assert!(Arc::ptr_eq(&k1, &k2));
        assert_eq!(registry.subscriber_count("news"), Some(2));
    }

    #[test]
    fn test_targets_auto_create_empty_topic() {
        let registry = TopicRegistry::<u32>::new(Vec::<String>::new(), true);
        assert!(registry.targets("fresh").unwrap().is_empty());
        assert!(registry.contains("fresh"));
    }

    #[test]
    fn test_create_topic_duplicate() {
        let registry = TopicRegistry::<u32>::new(["a"], false);
        assert!(matches!(
            registry.create_topic("a"),
            Err(PubSubError::TopicAlreadyExists { .. })
        ));
        registry.create_topic("b").unwrap();
        assert!(registry.contains("b"));
    }

    #[test]
    fn test_remove_subscriber() {
        let registry = TopicRegistry::<u32>::new(["a"], false);
        registry.add_subscriber("a", entry(1)).unwrap();
        assert!(registry.remove_subscriber("a", 1).unwrap().is_some());
        assert!(registry.remove_subscriber("a", 1).unwrap().is_none());
        assert!(registry.remove_subscriber("zzz", 1).is_err());
    }

    #[test]
    fn test_close_topic_leaves_tombstone() {
        let registry = TopicRegistry::<u32>::new(Vec::<String>::new(), true);
        let sub = entry(1);
        let pipe = sub.pipe.clone();
        registry.add_subscriber("t", sub).unwrap();

        let pipes = registry.close_topic("t").unwrap();
        assert_eq!(pipes.len(), 1);
        assert!(pipe.is_closed());
        assert!(!registry.contains("t"));

        assert!(matches!(
            registry.add_subscriber("t", entry(2)),
            Err(PubSubError::TopicClosed { .. })
        ));
        assert!(matches!(
            registry.targets("t"),
            Err(PubSubError::TopicClosed { .. })
        ));
        assert!(matches!(
            registry.close_topic("t"),
            Err(PubSubError::TopicNotFound { .. })
        ));

        // Явное создание снова открывает имя.
        registry.create_topic("t").unwrap();
        registry.add_subscriber("t", entry(3)).unwrap();
    }

    #[test]
    fn test_prune_only_closed() {
        let registry = TopicRegistry::<u32>::new(["a"], false);
        let closed = entry(1);
        closed.pipe.close();
        registry.add_subscriber("a", closed).unwrap();
        registry.add_subscriber("a", entry(2)).unwrap();

        assert_eq!(registry.prune_closed("a", &[1, 2]), 1);
        assert_eq!(registry.subscriber_count("a"), Some(1));
    }

    #[test]
    fn test_close_all_is_idempotent() {
        let registry = TopicRegistry::<u32>::new(["a", "b"], true);
        registry.add_subscriber("a", entry(1)).unwrap();

        let closed = registry.close_all().unwrap();
        assert_eq!(closed.len(), 2);
        assert!(registry.is_closed());
        assert!(registry.close_all().is_none());
        assert_eq!(
            registry.add_subscriber("a", entry(2)).err(),
            Some(PubSubError::BrokerClosed)
        );
        assert!(registry.topic_names().is_empty());
    }
}
