//! Клиент построчного протокола: [`Producer`] и [`Consumer`].

pub mod connection;
pub mod core;

pub use self::core::*;

pub use connection::*;
