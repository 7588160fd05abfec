//! Сетевой модуль брокера.
//!
//! - `banner`: баннер при старте.
//! - `connection`: обслуживание одного соединения (запуск обработчиков
//!   линков).
//! - `server`: [`Broker`] и цикл приёма TCP-соединений.
//! - `wire`: построчный протокол поверх TCP.

pub mod banner;
pub mod connection;
pub mod server;
pub mod wire;

pub use connection::serve_connection;
pub use server::Broker;
