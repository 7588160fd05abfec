//! Построчный TCP-протокол брокера.
//!
//! ```text
//! ATTACH <handle> <sender|receiver> <address>
//! ATTACHED <handle>
//! FLOW <handle> <credit>
//! TRANSFER <handle> <delivery-id> <payload>
//! DISPOSITION <handle> <delivery-id> <accepted|rejected|released>
//! DETACH <handle> [reason]
//! ERROR <text>
//! ```
//!
//! Роль в `ATTACH` указывается с точки зрения клиента.

pub mod frame;
pub mod transport;

pub use frame::{Frame, LinkRole};
pub use transport::{
    WireConnection, WireIncomingReceiver, WireIncomingSender, WireReceiverLink, WireSenderLink,
    MAX_FRAME_LEN,
};
