//! Конфигурация брокера.
//!
//! Порядок источников: значения по умолчанию → TOML-файл (если указан) →
//! переменные окружения `ZUMQ_*` → флаги командной строки.

mod settings;

pub use settings::*;
