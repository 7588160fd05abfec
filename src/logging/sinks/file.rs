use std::fs;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{fmt, layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::config::{LogFormat, LoggingConfig, LoggingError};

/// Неблокирующий файловый слой с ежедневной ротацией.
///
/// Guard должен жить, пока нужны логи: при его drop буфер сбрасывается.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(&config.log_dir)?;

    let appender = daily(&config.log_dir, &config.filename);
    let (writer, guard) = non_blocking(appender);

    let layer: Box<dyn LayerTrait<S> + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .event_format(fmt::format().json())
                .with_ansi(false)
                .with_writer(writer),
        ),
        _ => Box::new(fmt::layer().with_ansi(false).with_writer(writer)),
    };

    Ok((layer, guard))
}
