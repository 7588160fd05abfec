//! Отслеживание доставок и повторная постановка в очередь.
//!
//! - `tag`: ключ доставки в рабочем наборе (`DeliveryTag`) и запись
//!   `InFlightDelivery`.
//! - `outcome`: результат передачи (`Outcome`, `DeliveryOutcome`).
//! - `tracker`: единственная задача-владелец рабочего набора.

pub mod outcome;
pub mod tag;
pub mod tracker;

pub use outcome::*;
pub use tag::*;
pub use tracker::*;
