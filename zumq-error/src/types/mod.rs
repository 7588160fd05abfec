pub mod client;
pub mod link;
pub mod protocol;
pub mod queue;

// Публичный экспорт всех типов ошибок из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use client::*;
pub use link::*;
pub use protocol::*;
pub use queue::*;
