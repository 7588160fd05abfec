//! Очереди адресов брокера.
//!
//! - `message`: непрозрачная единица полезной нагрузки.
//! - `bounded`: ограниченная FIFO-очередь с неблокирующей вставкой и
//!   асинхронным (selectable) извлечением.
//! - `exchange`: реестр `адрес → очередь`.

pub mod bounded;
pub mod exchange;
pub mod message;

pub use bounded::*;
pub use exchange::*;
pub use message::*;
