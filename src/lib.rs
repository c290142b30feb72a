//! tg-notify: Tiered event reminders and queued broadcast dispatch for a
//! Telegram registration bot, with Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
