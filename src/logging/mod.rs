pub mod config;
mod filters;
mod formatter;

pub use config::{LogFormat, LoggingConfig};
pub use filters::build_filter_from_config;
pub use formatter::build_formatter_from_config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{GenericError, PipebusResult, ResultExt, StatusCode};

/// Устанавливает глобальный subscriber `tracing` по конфигурации.
///
/// Библиотека сама ничего не инициализирует: вызывать из приложения один
/// раз. Повторный вызов возвращает ошибку с кодом [`StatusCode::LoggingInit`].
pub fn init_logging(mut config: LoggingConfig) -> PipebusResult<()> {
    config.apply_env_overrides()?;
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let layer = formatter::build_formatter_from_config(&config, std::io::stdout);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| GenericError::new(StatusCode::LoggingInit, e.to_string()))
        .context("global tracing subscriber already set")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = %config.format,
        "Logging system initialized"
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_writer {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::fmt::MakeWriter;

    /// Буферный writer для проверки вывода в тестах.
    #[derive(Clone, Default)]
    pub(crate) struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl VecMakeWriter {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    pub(crate) struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    impl io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
