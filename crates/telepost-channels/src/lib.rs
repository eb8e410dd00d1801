//! # Telepost Channels
//! Delivery port implementations. Currently Telegram only.

pub mod telegram;

pub use telegram::TelegramPort;
