//! Конфигурация брокера и загрузка настроек.
//!
//! - `broker`: параметры брокера (`BrokerConfig`): начальные топики,
//!   политика автосоздания, лимит и таймаут подписки по умолчанию.
//! - `settings`: полный набор настроек (`Settings`), загружаемый через
//!   crate `config` из файла и переменных окружения `PIPEBUS_*`.

pub mod broker;
pub mod settings;

pub use broker::BrokerConfig;
pub use settings::Settings;
