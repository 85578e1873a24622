//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Встраиваемый брокер для внутрипроцессной доставки значений по топикам:
//!
//! - `pipe`: ограниченный FIFO-канал одного подписчика с блокирующими
//!   операциями и таймаутами.
//! - `topic` (приватный): реестр топиков и их подписчиков.
//! - `broker`: публикация, подписка, отписка и закрытие топиков/брокера.
//! - `subscriber`: подписка как ленивый конечный поток значений.
//!
//! Публичный API переэкспортирует:
//! - `broker::*`
//! - `pipe::Pipe`
//! - `subscriber::*`

pub mod broker;
pub mod pipe;
pub mod subscriber;
mod topic;

pub use broker::*;
pub use pipe::Pipe;
pub use subscriber::*;
