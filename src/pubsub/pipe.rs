use std::{collections::VecDeque, fmt, future::Future, time::Duration};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::PipeError;

/// Ограниченная FIFO-очередь одного подписчика.
///
/// Запись (`enqueue`) ждёт свободного места, чтение (`dequeue`) ждёт значения.
/// Оба ожидания прерываются таймаутом или закрытием канала. После `close`
/// запись запрещена, а уже буферизованные значения дочитываются до конца,
/// после чего чтение возвращает `Ok(None)` (конец потока).
///
/// Нулевой таймаут означает ожидание без ограничения по времени,
/// нулевой `limit` означает неограниченный буфер.
pub struct Pipe<T> {
    state: Mutex<PipeState<T>>,
    limit: usize,
    /// Появилось значение или канал закрыт.
    readable: Notify,
    /// Освободилось место или канал закрыт.
    writable: Notify,
    /// Заблокированный писатель покинул канал.
    released: Notify,
}

struct PipeState<T> {
    buffer: VecDeque<T>,
    closed: bool,
    /// Терминальная ошибка: выставляется один раз и больше не меняется.
    error: Option<String>,
    /// Сколько писателей сейчас ждут места в буфере.
    blocked_producers: usize,
}

/// Учёт писателя, ожидающего места. Снимается при любом выходе из
/// `enqueue`, в том числе при отмене future по таймауту.
struct ProducerSlot<'a, T> {
    pipe: &'a Pipe<T>,
}

impl<T> Drop for ProducerSlot<'_, T> {
    fn drop(&mut self) {
        let mut state = self.pipe.state.lock();
        state.blocked_producers -= 1;
        if state.blocked_producers == 0 {
            drop(state);
            self.pipe.released.notify_waiters();
        }
    }
}

/// Выполняет ожидание канала с таймаутом. `Duration::ZERO` означает без ограничения.
pub(crate) async fn with_timeout<F, R>(
    timeout: Duration,
    fut: F,
) -> Result<R, PipeError>
where
    F: Future<Output = Result<R, PipeError>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| PipeError::Timeout)?
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T> Pipe<T> {
    /// Создаёт канал ёмкостью `limit` (0 означает без ограничения).
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(PipeState {
                buffer: VecDeque::new(),
                closed: false,
                error: None,
                blocked_producers: 0,
            }),
            limit,
            readable: Notify::new(),
            writable: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Приводит знаковый лимит к ёмкости канала: отрицательные значения
    /// означают неограниченный буфер.
    pub fn limit_from_signed(limit: i64) -> usize {
        usize::try_from(limit).unwrap_or(0)
    }

    /// Ёмкость канала (0 означает без ограничения).
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_bounded(&self) -> bool {
        self.limit != 0
    }

    /// Количество значений, ожидающих чтения.
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Терминальная ошибка канала, если она была выставлена через `fail`.
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    fn has_room(
        &self,
        state: &PipeState<T>,
    ) -> bool {
        self.limit == 0 || state.buffer.len() < self.limit
    }

    /// Кладёт значение в канал, ожидая свободного места.
    ///
    /// # Возвращает
    /// - `Ok(())` если значение принято
    /// - `Err(PipeError::Closed)` если канал закрыт (до или во время ожидания)
    /// - `Err(PipeError::Timeout)` если место не освободилось за `timeout`
    pub async fn enqueue(
        &self,
        value: T,
        timeout: Duration,
    ) -> Result<(), PipeError> {
        with_timeout(timeout, self.enqueue_wait(value)).await
    }

    async fn enqueue_wait(
        &self,
        value: T,
    ) -> Result<(), PipeError> {
        let mut slot: Option<ProducerSlot<'_, T>> = None;
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PipeError::Closed);
                }
                if self.has_room(&state) {
                    state.buffer.push_back(value);
                    drop(state);
                    self.readable.notify_one();
                    return Ok(());
                }
                if slot.is_none() {
                    state.blocked_producers += 1;
                    slot = Some(ProducerSlot { pipe: self });
                }
            }

            notified.await;
        }
    }

    /// Неблокирующая запись: при заполненном буфере возвращает
    /// `PipeError::Full`, значение при этом не теряется молча.
    pub fn try_enqueue(
        &self,
        value: T,
    ) -> Result<(), PipeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PipeError::Closed);
        }
        if !self.has_room(&state) {
            return Err(PipeError::Full);
        }
        state.buffer.push_back(value);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Забирает следующее значение, ожидая его появления.
    ///
    /// # Возвращает
    /// - `Ok(Some(value))` очередное значение в порядке записи
    /// - `Ok(None)` канал закрыт и буфер пуст (конец потока)
    /// - `Err(PipeError::Timeout)` значение не появилось за `timeout`
    /// - `Err(PipeError::Failed)` канал завершён с ошибкой
    pub async fn dequeue(
        &self,
        timeout: Duration,
    ) -> Result<Option<T>, PipeError> {
        with_timeout(timeout, self.dequeue_wait()).await
    }

    async fn dequeue_wait(&self) -> Result<Option<T>, PipeError> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.take() {
                return result;
            }

            notified.await;
        }
    }

    /// Неблокирующее чтение: `PipeError::Empty`, если канал открыт и пуст.
    pub fn try_dequeue(&self) -> Result<Option<T>, PipeError> {
        self.take().unwrap_or(Err(PipeError::Empty))
    }

    /// Один шаг чтения. `None`, если значения нет и канал открыт.
    fn take(&self) -> Option<Result<Option<T>, PipeError>> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.error {
            return Some(Err(PipeError::Failed {
                reason: reason.clone(),
            }));
        }
        if let Some(value) = state.buffer.pop_front() {
            drop(state);
            self.writable.notify_one();
            return Some(Ok(Some(value)));
        }
        if state.closed {
            return Some(Ok(None));
        }
        None
    }

    /// Закрывает канал. Идемпотентно.
    ///
    /// Заблокированные писатели получают `PipeError::Closed`, читатели
    /// дочитывают буфер и затем получают конец потока.
    ///
    /// Возвращает `true`, если канал был закрыт именно этим вызовом.
    pub fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.wake_all();
        true
    }

    /// Немедленное закрытие: буфер отбрасывается, читатели сразу
    /// получают конец потока.
    pub fn close_now(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            let discarded = state.buffer.len();
            state.buffer.clear();
            discarded
        };
        self.wake_all();
        discarded
    }

    /// Завершает канал с терминальной ошибкой.
    ///
    /// Первая ошибка сохраняется, последующие вызовы её не перезаписывают.
    /// Буфер отбрасывается, каждое чтение возвращает `PipeError::Failed`.
    pub fn fail(
        &self,
        reason: impl Into<String>,
    ) {
        {
            let mut state = self.state.lock();
            if state.error.is_none() {
                state.error = Some(reason.into());
            }
            state.closed = true;
            state.buffer.clear();
        }
        self.wake_all();
    }

    fn wake_all(&self) {
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Ждёт, пока все заблокированные писатели покинут канал.
    ///
    /// Используется после `close`: возвращает `true`, если за `timeout`
    /// (0 означает без ограничения) в канале не осталось ожидающих писателей.
    pub async fn wait_released(
        &self,
        timeout: Duration,
    ) -> bool {
        let wait = async {
            loop {
                let notified = self.released.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.state.lock().blocked_producers == 0 {
                    return Ok::<(), PipeError>(());
                }

                notified.await;
            }
        };
        with_timeout(timeout, wait).await.is_ok()
    }
}

impl<T> fmt::Debug for Pipe<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Pipe")
            .field("limit", &self.limit)
            .field("len", &state.buffer.len())
            .field("closed", &state.closed)
            .field("error", &state.error)
            .field("blocked_producers", &state.blocked_producers)
            .finish()
    }
}
