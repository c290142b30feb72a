//! Infrastructure adapters. Implement outbound ports.
//!
//! Telegram Bot API, SQLite. Map errors to DomainError.

pub mod persistence;
pub mod telegram;
